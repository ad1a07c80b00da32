//! Lock-free single-producer single-consumer ring buffer
//!
//! Moves bulk sample data between a control thread and the audio callback
//! without locks or allocation. Elements have a fixed size in bytes and the
//! capacity (in elements) must be a power of two, so cursor wrap-around is a
//! mask instead of a modulo.
//!
//! Both cursors are monotonically increasing counters. Exactly one thread may
//! write and exactly one thread may read at any time; the buffer does not
//! check this. Ring-buffer actions use one element per frame, i.e.
//! `element_size == channels * size_of::<f32>()`.
//!
//! ```ignore
//! let rb = Arc::new(RingBuffer::new(4 * 2, 1024)?);   // stereo f32 frames
//! let handle = mixer.record_ringbuffer(rb.clone(), &[1, 2], StartTime::Immediate)?;
//!
//! let mut frames = vec![0.0f32; 2 * 256];
//! let n = rb.read_frames(&mut frames);
//! ```

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{MixerError, MixerResult};

/// Fixed-capacity circular byte buffer for one writer and one reader
pub struct RingBuffer {
    storage: Box<[UnsafeCell<u8>]>,
    element_size: usize,
    capacity: usize,
    mask: usize,
    write_index: AtomicUsize,
    read_index: AtomicUsize,
    closed: AtomicBool,
}

// SAFETY: The writer only touches bytes in the free region
// [write_index, read_index + capacity) and the reader only touches the filled
// region [read_index, write_index). Cursor updates are published with
// Release and observed with Acquire, so the regions never overlap.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a ring buffer of `capacity` elements of `element_size` bytes
    ///
    /// Fails with [`MixerError::InvalidCapacity`] if `capacity` is not a power
    /// of two, `element_size` is zero, or the total size overflows `usize`.
    pub fn new(element_size: usize, capacity: usize) -> MixerResult<Self> {
        let bytes = element_size
            .checked_mul(capacity)
            .filter(|_| capacity.is_power_of_two() && element_size > 0)
            .ok_or(MixerError::InvalidCapacity { capacity })?;
        let storage = (0..bytes)
            .map(|_| UnsafeCell::new(0u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            storage,
            element_size,
            capacity,
            mask: capacity - 1,
            write_index: AtomicUsize::new(0),
            read_index: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Create a ring buffer holding `frames` frames of `channels` f32 samples
    pub fn for_frames(channels: usize, frames: usize) -> MixerResult<Self> {
        let element_size = channels
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or(MixerError::InvalidCapacity { capacity: frames })?;
        Self::new(element_size, frames)
    }

    /// Size of one element in bytes
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Capacity in elements
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements available for reading
    #[inline]
    pub fn available_to_read(&self) -> usize {
        let w = self.write_index.load(Ordering::Acquire);
        let r = self.read_index.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    /// Number of elements that can be written
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.capacity - self.available_to_read()
    }

    /// Write whole elements from `data`, returns the number written
    ///
    /// Trailing bytes that don't form a whole element are ignored.
    pub fn write(&self, data: &[u8]) -> usize {
        let wanted = data.len() / self.element_size;
        let mut offset = 0;
        self.write_with(wanted, |region| {
            region.copy_from_slice(&data[offset..offset + region.len()]);
            offset += region.len();
        })
    }

    /// Read whole elements into `dest`, returns the number read
    pub fn read(&self, dest: &mut [u8]) -> usize {
        let wanted = dest.len() / self.element_size;
        let mut offset = 0;
        self.read_with(wanted, |region| {
            dest[offset..offset + region.len()].copy_from_slice(region);
            offset += region.len();
        })
    }

    /// Write interleaved f32 frames, returns the number of elements written
    pub fn write_frames(&self, frames: &[f32]) -> usize {
        self.write(bytemuck::cast_slice(frames))
    }

    /// Read interleaved f32 frames, returns the number of elements read
    pub fn read_frames(&self, frames: &mut [f32]) -> usize {
        self.read(bytemuck::cast_slice_mut(frames))
    }

    /// Fill up to `max_elements` elements in place
    ///
    /// `fill` is called once per contiguous free region (at most twice, when
    /// the region wraps) with a byte slice whose length is a multiple of the
    /// element size. All offered bytes are committed afterwards.
    ///
    /// Writer side only.
    pub fn write_with<F>(&self, max_elements: usize, mut fill: F) -> usize
    where
        F: FnMut(&mut [u8]),
    {
        let w = self.write_index.load(Ordering::Relaxed);
        let r = self.read_index.load(Ordering::Acquire);
        let free = self.capacity - w.wrapping_sub(r);
        let count = max_elements.min(free);
        if count == 0 {
            return 0;
        }

        let start = w & self.mask;
        let first = (self.capacity - start).min(count);
        let second = count - first;

        // SAFETY: Only the writer touches [w, w + count), which lies inside the
        // free region, and the reader never reads past write_index.
        unsafe {
            fill(self.region_mut(start, first));
            if second > 0 {
                fill(self.region_mut(0, second));
            }
        }

        self.write_index
            .store(w.wrapping_add(count), Ordering::Release);
        count
    }

    /// Consume up to `max_elements` elements in place
    ///
    /// Reader side only. The counterpart of [`RingBuffer::write_with`].
    pub fn read_with<F>(&self, max_elements: usize, mut drain: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let r = self.read_index.load(Ordering::Relaxed);
        let w = self.write_index.load(Ordering::Acquire);
        let count = max_elements.min(w.wrapping_sub(r));
        if count == 0 {
            return 0;
        }

        let start = r & self.mask;
        let first = (self.capacity - start).min(count);
        let second = count - first;

        // SAFETY: [r, r + count) was published by the writer (Acquire above)
        // and the writer won't touch it until read_index moves past it.
        unsafe {
            drain(self.region_mut(start, first));
            if second > 0 {
                drain(self.region_mut(0, second));
            }
        }

        self.read_index
            .store(r.wrapping_add(count), Ordering::Release);
        count
    }

    /// Reset the buffer to empty
    ///
    /// Must only be called while the buffer is NOT being read or written.
    /// This is not checked.
    pub fn flush(&self) {
        self.write_index.store(0, Ordering::Release);
        self.read_index.store(0, Ordering::Release);
    }

    /// Mark the stream of frames as finished
    ///
    /// Ends the ring-buffer action using this buffer: a playing action stops
    /// once the remaining frames are drained, a recording action stops at the
    /// next block.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`RingBuffer::close`] has been called
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mutable view of `elements` elements starting at element `start`
    ///
    /// # Safety
    /// The caller must own the region per the SPSC protocol.
    #[allow(clippy::mut_from_ref)]
    unsafe fn region_mut(&self, start: usize, elements: usize) -> &mut [u8] {
        let base = UnsafeCell::raw_get(self.storage.as_ptr());
        std::slice::from_raw_parts_mut(
            base.add(start * self.element_size),
            elements * self.element_size,
        )
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("element_size", &self.element_size)
            .field("capacity", &self.capacity)
            .field("available_to_read", &self.available_to_read())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_non_power_of_two_rejected() {
        for capacity in [0, 3, 6, 100, 1000] {
            assert_eq!(
                RingBuffer::new(4, capacity).unwrap_err(),
                MixerError::InvalidCapacity { capacity }
            );
        }
        assert!(RingBuffer::new(0, 8).is_err());
        assert!(RingBuffer::new(4, 1).is_ok());
        assert!(RingBuffer::new(4, 1024).is_ok());
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let capacity = 1 << (usize::BITS - 2);
        assert_eq!(
            RingBuffer::new(8, capacity).unwrap_err(),
            MixerError::InvalidCapacity { capacity }
        );
        assert_eq!(
            RingBuffer::for_frames(usize::MAX, 16).unwrap_err(),
            MixerError::InvalidCapacity { capacity: 16 }
        );
    }

    #[test]
    fn test_partial_write_when_nearly_full() {
        let rb = RingBuffer::new(4, 8).unwrap();
        let data = [0u8; 4 * 5];

        assert_eq!(rb.write(&data), 5);
        assert_eq!(rb.write(&data), 3);
        assert_eq!(rb.available_to_read(), 8);
        assert_eq!(rb.available_to_write(), 0);
        assert_eq!(rb.write(&data), 0);
    }

    #[test]
    fn test_never_writes_partial_element() {
        let rb = RingBuffer::new(4, 8).unwrap();
        // 10 bytes = 2 whole elements + 2 stray bytes
        assert_eq!(rb.write(&[1u8; 10]), 2);
        assert_eq!(rb.available_to_read(), 2);

        let mut out = [0u8; 7];
        assert_eq!(rb.read(&mut out), 1);
        assert_eq!(&out[..4], &[1, 1, 1, 1]);
        assert_eq!(&out[4..], &[0, 0, 0]);
    }

    #[test]
    fn test_available_sum_is_capacity() {
        let rb = RingBuffer::new(2, 16).unwrap();
        let mut out = [0u8; 2 * 16];
        let pattern = [(3, 1), (9, 4), (7, 13), (16, 2), (0, 5), (11, 11)];

        for (writes, reads) in pattern {
            rb.write(&vec![7u8; writes * 2]);
            assert_eq!(rb.available_to_read() + rb.available_to_write(), 16);
            rb.read(&mut out[..reads * 2]);
            assert_eq!(rb.available_to_read() + rb.available_to_write(), 16);
        }
    }

    #[test]
    fn test_wrap_around_preserves_order() {
        let rb = RingBuffer::for_frames(1, 8).unwrap();

        let first: Vec<f32> = (0..6).map(|i| i as f32).collect();
        assert_eq!(rb.write_frames(&first), 6);

        let mut out = vec![0.0f32; 4];
        assert_eq!(rb.read_frames(&mut out), 4);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0]);

        // Crosses the end of storage
        let second: Vec<f32> = (100..106).map(|i| i as f32).collect();
        assert_eq!(rb.write_frames(&second), 6);

        let mut all = vec![0.0f32; 8];
        assert_eq!(rb.read_frames(&mut all), 8);
        assert_eq!(all, vec![4.0, 5.0, 100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
    }

    #[test]
    fn test_write_with_offers_two_regions_on_wrap() {
        let rb = RingBuffer::new(1, 4).unwrap();
        rb.write(&[0, 0, 0]);
        rb.read(&mut [0u8; 3]);

        let mut regions = Vec::new();
        let n = rb.write_with(4, |region| {
            regions.push(region.len());
            region.fill(9);
        });
        assert_eq!(n, 4);
        assert_eq!(regions, vec![1, 3]);

        let mut out = [0u8; 4];
        rb.read(&mut out);
        assert_eq!(out, [9, 9, 9, 9]);
    }

    #[test]
    fn test_flush_and_close() {
        let rb = RingBuffer::new(4, 8).unwrap();
        rb.write(&[0u8; 16]);
        assert_eq!(rb.available_to_read(), 4);

        rb.flush();
        assert_eq!(rb.available_to_read(), 0);
        assert_eq!(rb.available_to_write(), 8);

        assert!(!rb.is_closed());
        rb.close();
        assert!(rb.is_closed());
    }

    #[test]
    fn test_empty_read() {
        let rb = RingBuffer::new(4, 16).unwrap();
        let mut out = [0u8; 32];
        assert_eq!(rb.read(&mut out), 0);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        const TOTAL: usize = 100_000;
        let rb = Arc::new(RingBuffer::for_frames(1, 64).unwrap());

        let producer = {
            let rb = Arc::clone(&rb);
            std::thread::spawn(move || {
                let mut next = 0usize;
                while next < TOTAL {
                    let chunk: Vec<f32> =
                        (next..(next + 17).min(TOTAL)).map(|i| i as f32).collect();
                    let written = rb.write_frames(&chunk);
                    next += written;
                    if written == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut expected = 0usize;
        let mut buf = vec![0.0f32; 23];
        while expected < TOTAL {
            let n = rb.read_frames(&mut buf);
            for sample in &buf[..n] {
                assert_eq!(*sample, expected as f32);
                expected += 1;
            }
            if n == 0 {
                std::thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(rb.available_to_read(), 0);
    }
}
