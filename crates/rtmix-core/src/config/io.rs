//! YAML loading and saving for any serde configuration type

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file
///
/// A missing file yields `T::default()`. An unreadable or unparsable file is
/// logged and also yields the default, so a broken config never prevents
/// the engine from starting.
///
/// ```ignore
/// let config: RtmixConfig = load_config(Path::new("rtmix.yaml"));
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MixerConfig, RtmixConfig};

    #[test]
    fn test_missing_file_gives_defaults() {
        let config: RtmixConfig = load_config(Path::new("/nonexistent/rtmix/rtmix.yaml"));
        assert_eq!(config, RtmixConfig::default());
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtmix.yaml");
        std::fs::write(&path, "mixer: [this is not a map").unwrap();

        let config: RtmixConfig = load_config(&path);
        assert_eq!(config, RtmixConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rtmix.yaml");

        let mut config = RtmixConfig::default();
        config.mixer = MixerConfig {
            input_channels: 1,
            output_channels: 4,
            queue_capacity: 128,
            ..MixerConfig::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: RtmixConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtmix.yaml");
        std::fs::write(&path, "mixer:\n  output_channels: 6\n").unwrap();

        let config: RtmixConfig = load_config(&path);
        assert_eq!(config.mixer.output_channels, 6);
        assert_eq!(config.mixer.queue_capacity, MixerConfig::default().queue_capacity);
    }
}
