//! Runtime settings shared by the helpers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::imaging::DEFAULT_MAX_SIZE;
use crate::precision::{AutocastScope, Precision, platform_appropriate_autocast};
use crate::utils::{Device, get_cache_dir, get_device, parse_device};

/// Runtime configuration, usually loaded from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Precision mode for inference
    pub precision: Precision,

    /// Explicit device such as `cpu` or `cuda:1`; auto-detected when unset
    pub device: Option<String>,

    /// Weights cache directory; resolved from the environment when unset
    pub cache_dir: Option<PathBuf>,

    /// Directory to dump intermediate images to
    pub image_log_dir: Option<PathBuf>,

    /// Upper bound on input image width
    pub max_width: u32,

    /// Upper bound on input image height
    pub max_height: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            precision: Precision::Autocast,
            device: None,
            cache_dir: None,
            image_log_dir: None,
            max_width: DEFAULT_MAX_SIZE,
            max_height: DEFAULT_MAX_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds that could never fit a 64 pixel side
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_width < crate::imaging::SIZE_MULTIPLE
            || self.max_height < crate::imaging::SIZE_MULTIPLE
        {
            return Err(crate::ImaginairyError::ConfigError(format!(
                "max_width/max_height must be at least {}, got {}x{}",
                crate::imaging::SIZE_MULTIPLE,
                self.max_width,
                self.max_height
            )));
        }
        Ok(())
    }

    /// Configured device, or the best available one
    pub fn device(&self) -> crate::Result<Device> {
        match &self.device {
            Some(requested) => parse_device(requested),
            None => get_device(),
        }
    }

    /// Configured cache directory, or the environment default
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(get_cache_dir)
    }

    /// Enter the precision scope this configuration asks for on `device`
    pub fn autocast(&self, device: &Device) -> AutocastScope {
        platform_appropriate_autocast(self.precision, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.precision, Precision::Autocast);
        assert_eq!((config.max_width, config.max_height), (512, 512));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(
            &path,
            r#"{"precision": "full", "device": "cpu", "cache_dir": "/tmp/weights", "max_width": 768}"#,
        )
        .unwrap();

        let config = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(config.precision, Precision::Full);
        assert_eq!(config.max_width, 768);
        assert_eq!(config.max_height, 512);
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/weights"));
        assert!(config.device().unwrap().is_cpu());
        assert!(!config.autocast(&Device::Cpu).is_enabled());
    }

    #[test]
    fn test_from_file_rejects_tiny_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, r#"{"max_height": 32}"#).unwrap();

        assert!(matches!(
            RuntimeConfig::from_file(&path),
            Err(crate::ImaginairyError::ConfigError(_))
        ));
    }

    #[test]
    fn test_unknown_precision_rejected() {
        let err = serde_json::from_str::<RuntimeConfig>(r#"{"precision": "half"}"#);
        assert!(err.is_err());
    }
}
