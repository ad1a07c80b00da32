//! Lock-free action queue between control threads and the audio callback
//!
//! Two fixed-capacity channels, both allocated once at startup:
//!
//! ```text
//! ┌──────────────────┐   push()    ┌──────────────────────┐   pop()   ┌──────────────────┐
//! │ Control threads  │────────────►│  Inbound ArrayQueue  │──────────►│  Audio callback  │
//! │ (any number)     │             │  (lock-free MPSC)    │           │  (active set)    │
//! └──────────────────┘             └──────────────────────┘           └────────┬─────────┘
//!          ▲                                                                   │ push()
//!          │ pop() under a control-side mutex   ┌──────────────────────┐       │
//!          └────────────────────────────────────│  Completions (rtrb)  │◄──────┘
//!                                               │  (wait-free SPSC)    │
//!                                               └──────────────────────┘
//! ```
//!
//! The audio thread never takes a lock: the only mutexes guard the
//! completion consumer and the pending-id set, and both are touched by
//! control threads only.
//!
//! # Admission
//!
//! An action counts as in flight from `submit` until `poll_completed`
//! reports it. At most `max_active` play/record actions and another
//! `max_active` cancels are in flight at once, so the callback's active set
//! (sized for both) can always take everything in the inbound channel, and
//! the completion channel (at least that large) never overflows. Cancels
//! have their own budget so a set of far-future actions can always be
//! cancelled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use basedrop::{Handle, Owned};
use crossbeam::queue::ArrayQueue;

use super::gc::gc_handle;
use crate::action::{Action, ActionId, ActionType, Completion};
use crate::config::MixerConfig;
use crate::error::{check_power_of_two, MixerError, MixerResult};

/// An action in transit; dropping it never frees memory on the calling thread
pub(crate) type ActionBox = Owned<Action>;

/// Control-thread side of the action queue
pub struct ActionQueue {
    inbound: Arc<ArrayQueue<ActionBox>>,
    completed: Mutex<rtrb::Consumer<ActionBox>>,
    /// Submitted ids not yet reported by `poll_completed`
    pending: Mutex<InFlight>,
    max_active: usize,
    next_id: AtomicU64,
    gc: Handle,
}

/// Ids in flight, split by admission budget
#[derive(Default)]
struct InFlight {
    actions: HashSet<ActionId>,
    cancels: HashSet<ActionId>,
}

impl InFlight {
    fn budget(&mut self, action_type: ActionType) -> &mut HashSet<ActionId> {
        match action_type {
            ActionType::Cancel => &mut self.cancels,
            _ => &mut self.actions,
        }
    }

    fn contains(&self, id: &ActionId) -> bool {
        self.actions.contains(id) || self.cancels.contains(id)
    }

    fn remove(&mut self, id: &ActionId) {
        if !self.actions.remove(id) {
            self.cancels.remove(id);
        }
    }

    fn len(&self) -> usize {
        self.actions.len() + self.cancels.len()
    }
}

/// Audio-thread side of the action queue
pub(crate) struct RealtimeQueue {
    inbound: Arc<ArrayQueue<ActionBox>>,
    completed: rtrb::Producer<ActionBox>,
}

/// Create both ends of the action queue
///
/// Fails with [`MixerError::InvalidCapacity`] unless both configured
/// capacities are powers of two.
pub(crate) fn action_queue(config: &MixerConfig) -> MixerResult<(ActionQueue, RealtimeQueue)> {
    check_power_of_two(config.queue_capacity)?;
    check_power_of_two(config.completion_capacity)?;

    let inbound = Arc::new(ArrayQueue::new(config.queue_capacity));
    let (producer, consumer) = rtrb::RingBuffer::new(config.completion_capacity);

    log::debug!(
        "Action queue created: {} inbound slots, {} completion slots",
        config.queue_capacity,
        config.completion_capacity
    );

    Ok((
        ActionQueue {
            inbound: Arc::clone(&inbound),
            completed: Mutex::new(consumer),
            pending: Mutex::new(InFlight::default()),
            max_active: config.max_active,
            next_id: AtomicU64::new(1),
            gc: gc_handle(),
        },
        RealtimeQueue {
            inbound,
            completed: producer,
        },
    ))
}

impl ActionQueue {
    /// Assign an id and push onto the inbound channel (non-blocking)
    ///
    /// Fails with [`MixerError::QueueFull`] when the inbound channel is full
    /// or when `max_active` actions of the same budget are already in flight.
    pub fn submit(&self, mut action: Action) -> MixerResult<ActionId> {
        // Held across the push so concurrent submitters can't overshoot the budget
        let mut pending = self.pending();
        let in_flight = pending.budget(action.action_type());
        if in_flight.len() >= self.max_active {
            log::warn!(
                "{} actions in flight, rejecting {:?}",
                in_flight.len(),
                action.action_type()
            );
            return Err(MixerError::QueueFull {
                capacity: self.max_active,
            });
        }

        let id = ActionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        action.id = id;
        // Registered before the push so a fast completion can't race ahead of it
        in_flight.insert(id);

        let boxed = Owned::new(&self.gc, action);
        if self.inbound.push(boxed).is_err() {
            pending.remove(&id);
            log::warn!(
                "Action queue full ({} slots), rejecting {}",
                self.inbound.capacity(),
                id
            );
            return Err(MixerError::QueueFull {
                capacity: self.inbound.capacity(),
            });
        }

        Ok(id)
    }

    /// Drain all retired actions (non-blocking)
    pub fn poll_completed(&self) -> Vec<Completion> {
        let mut consumer = self
            .completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut completions = Vec::with_capacity(consumer.slots());
        while let Ok(mut action) = consumer.pop() {
            completions.push(Completion::from_action(&mut action));
        }
        drop(consumer);

        if !completions.is_empty() {
            let mut pending = self.pending();
            for completion in &completions {
                pending.remove(&completion.id);
            }
        }

        completions
    }

    /// Ids submitted but not yet reported as completed, in submission order
    pub fn pending_actions(&self) -> Vec<ActionId> {
        let pending = self.pending();
        let mut ids: Vec<ActionId> = pending
            .actions
            .iter()
            .chain(&pending.cancels)
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of actions submitted but not yet reported as completed
    pub fn in_flight(&self) -> usize {
        self.pending().len()
    }

    pub fn is_pending(&self, id: ActionId) -> bool {
        self.pending().contains(&id)
    }

    /// Number of actions waiting in the inbound channel
    pub fn queued(&self) -> usize {
        self.inbound.len()
    }

    pub fn capacity(&self) -> usize {
        self.inbound.capacity()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RealtimeQueue {
    /// Next submitted action, if any (lock-free)
    #[inline]
    pub(crate) fn pop(&self) -> Option<ActionBox> {
        self.inbound.pop()
    }

    #[inline]
    pub(crate) fn has_submissions(&self) -> bool {
        !self.inbound.is_empty()
    }

    /// Hand a retired action back to the control side (wait-free)
    ///
    /// Returns the action if the completion channel is full.
    #[inline]
    pub(crate) fn complete(&mut self, action: ActionBox) -> Result<(), ActionBox> {
        self.completed.push(action).map_err(|e| match e {
            rtrb::PushError::Full(action) => action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionState, StartTime};

    fn config(queue_capacity: usize, completion_capacity: usize) -> MixerConfig {
        MixerConfig {
            queue_capacity,
            completion_capacity,
            ..MixerConfig::default()
        }
    }

    #[test]
    fn test_capacities_must_be_power_of_two() {
        assert!(matches!(
            action_queue(&config(100, 64)),
            Err(MixerError::InvalidCapacity { capacity: 100 })
        ));
        assert!(matches!(
            action_queue(&config(64, 48)),
            Err(MixerError::InvalidCapacity { capacity: 48 })
        ));
        assert!(action_queue(&config(64, 64)).is_ok());
    }

    #[test]
    fn test_queue_full_rejects_and_forgets_id() {
        let (queue, _rt) = action_queue(&config(2, 2)).unwrap();
        let a = queue
            .submit(Action::cancel(ActionId(99), StartTime::Immediate))
            .unwrap();
        let b = queue
            .submit(Action::cancel(ActionId(99), StartTime::Immediate))
            .unwrap();
        assert!(a < b);

        let err = queue
            .submit(Action::cancel(ActionId(99), StartTime::Immediate))
            .unwrap_err();
        assert_eq!(err, MixerError::QueueFull { capacity: 2 });
        assert_eq!(queue.pending_actions(), vec![a, b]);
        assert_eq!(queue.queued(), 2);
    }

    #[test]
    fn test_in_flight_budgets_are_separate() {
        let (queue, mut rt) = action_queue(&MixerConfig {
            max_active: 1,
            ..config(8, 2)
        })
        .unwrap();
        let play = queue
            .submit(Action::play_buffer(vec![0.0; 4], &[1], StartTime::At(1_000)))
            .unwrap();
        assert_eq!(
            queue.submit(Action::record_buffer(4, &[1], StartTime::Immediate)),
            Err(MixerError::QueueFull { capacity: 1 })
        );
        let cancel = queue
            .submit(Action::cancel(play, StartTime::Immediate))
            .unwrap();
        assert!(queue
            .submit(Action::cancel(play, StartTime::Immediate))
            .is_err());
        assert_eq!(queue.pending_actions(), vec![play, cancel]);
        assert_eq!(queue.in_flight(), 2);

        // Slots come back only once the completion has been polled
        let mut action = rt.pop().unwrap();
        action.state = ActionState::Cancelled;
        assert!(rt.complete(action).is_ok());
        assert!(queue
            .submit(Action::record_buffer(4, &[1], StartTime::Immediate))
            .is_err());
        assert_eq!(queue.poll_completed().len(), 1);
        assert!(queue
            .submit(Action::record_buffer(4, &[1], StartTime::Immediate))
            .is_ok());
    }

    #[test]
    fn test_completion_round_trip() {
        let (queue, mut rt) = action_queue(&config(4, 4)).unwrap();
        let id = queue
            .submit(Action::cancel(ActionId(7), StartTime::Immediate))
            .unwrap();
        assert!(queue.is_pending(id));

        let mut action = rt.pop().unwrap();
        assert!(rt.pop().is_none());
        action.state = ActionState::Finished;
        assert!(rt.complete(action).is_ok());

        let completions = queue.poll_completed();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].id, id);
        assert_eq!(completions[0].state, ActionState::Finished);
        assert!(!queue.is_pending(id));
        assert!(queue.poll_completed().is_empty());
    }

    #[test]
    fn test_full_completion_channel_returns_action() {
        let (queue, mut rt) = action_queue(&config(4, 1)).unwrap();
        queue
            .submit(Action::cancel(ActionId(1), StartTime::Immediate))
            .unwrap();
        queue
            .submit(Action::cancel(ActionId(2), StartTime::Immediate))
            .unwrap();

        let first = rt.pop().unwrap();
        let second = rt.pop().unwrap();
        assert!(rt.complete(first).is_ok());
        assert!(rt.complete(second).is_err());
    }

    #[test]
    fn test_submit_from_many_threads() {
        let (queue, rt) = action_queue(&config(256, 4)).unwrap();
        let queue = Arc::new(queue);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        queue
                            .submit(Action::cancel(ActionId(0), StartTime::Immediate))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = HashSet::new();
        while let Some(action) = rt.pop() {
            assert!(seen.insert(action.id));
        }
        assert_eq!(seen.len(), 200);
    }
}
