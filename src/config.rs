use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tch::nn;

use crate::error::{Error, Result};
use crate::shape::FeatureShape;

pub const DEFAULT_NUM_CLASSES: i64 = 102;
pub const DEFAULT_INPUT_SIZE: i64 = 256;
pub const INPUT_CHANNELS: i64 = 3;

/// Batch-norm constants. Kept explicit since they come from two different frameworks
/// and still need parity checks against a reference checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchNormSettings {
    pub eps: f64,
    pub momentum: f64,
}

impl BatchNormSettings {
    /// eps found in the tensorflow Inception-ResNet-v2 weights.
    pub fn stem() -> BatchNormSettings {
        BatchNormSettings {
            eps: 1e-3,
            momentum: 0.1,
        }
    }

    pub fn branch() -> BatchNormSettings {
        BatchNormSettings {
            eps: 1e-5,
            momentum: 0.1,
        }
    }

    pub(crate) fn to_tch(self) -> nn::BatchNormConfig {
        nn::BatchNormConfig {
            eps: self.eps,
            momentum: self.momentum,
            ..Default::default()
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.eps > 0.0) {
            return Err(Error::Configuration(format!(
                "{}.eps must be positive, got {}",
                name, self.eps
            )));
        }
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(Error::Configuration(format!(
                "{}.momentum must be within [0, 1], got {}",
                name, self.momentum
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub num_classes: i64,
    /// Side of the square input image.
    pub input_size: i64,
    /// Used by the plain conv-bn-relu units.
    pub stem_batch_norm: BatchNormSettings,
    /// Used by the depthwise-separable, standard and dilated paths.
    pub branch_batch_norm: BatchNormSettings,
    pub basic_conv_bias: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            num_classes: DEFAULT_NUM_CLASSES,
            input_size: DEFAULT_INPUT_SIZE,
            stem_batch_norm: BatchNormSettings::stem(),
            branch_batch_norm: BatchNormSettings::branch(),
            basic_conv_bias: false,
        }
    }
}

impl NetworkConfig {
    pub fn with_num_classes(num_classes: i64) -> NetworkConfig {
        NetworkConfig {
            num_classes,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<NetworkConfig> {
        let config: NetworkConfig =
            serde_json::from_str(json).context("Network config is not valid json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<NetworkConfig> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Could not open network config {}", path.display()))?;
        let config: NetworkConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Network config {} is not valid json", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_classes <= 0 {
            return Err(Error::Configuration(format!(
                "num_classes must be positive, got {}",
                self.num_classes
            )));
        }
        if self.input_size <= 0 {
            return Err(Error::Configuration(format!(
                "input_size must be positive, got {}",
                self.input_size
            )));
        }
        self.stem_batch_norm.validate("stem_batch_norm")?;
        self.branch_batch_norm.validate("branch_batch_norm")?;
        Ok(())
    }

    pub fn input_shape(&self, batch: i64) -> FeatureShape {
        FeatureShape::new(batch, INPUT_CHANNELS, self.input_size, self.input_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_reference_constants() {
        let config = NetworkConfig::default();
        assert_eq!(config.num_classes, 102);
        assert_eq!(config.input_size, 256);
        assert_eq!(config.stem_batch_norm.eps, 1e-3);
        assert_eq!(config.stem_batch_norm.momentum, 0.1);
        assert_eq!(config.branch_batch_norm.eps, 1e-5);
        assert!(!config.basic_conv_bias);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = NetworkConfig::from_json_str(r#"{"num_classes": 10}"#).unwrap();
        assert_eq!(config.num_classes, 10);
        assert_eq!(config.input_size, 256);
        assert_eq!(config.stem_batch_norm, BatchNormSettings::stem());
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for num_classes in &[0, -3] {
            match NetworkConfig::with_num_classes(*num_classes).validate() {
                Err(Error::Configuration(msg)) => assert!(msg.contains("num_classes")),
                other => panic!("unexpected {:?}", other),
            }
        }
        let config = NetworkConfig {
            branch_batch_norm: BatchNormSettings {
                eps: 1e-5,
                momentum: 1.5,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(NetworkConfig::from_json_str(r#"{"num_classes": 0}"#).is_err());
        assert!(NetworkConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("mixinresnet_config_{}.json", std::process::id()));
        let config = NetworkConfig {
            num_classes: 7,
            basic_conv_bias: true,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        let loaded = NetworkConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(NetworkConfig::from_json_file(&path).is_err());
    }
}
