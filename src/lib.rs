//! Mix-InResNet image classifier.
//!
//! Inception-ResNet-v2 where every plain convolution of the stem is a mixed
//! separable/standard/dilated unit and every branch convolution is depthwise-separable.
//! Only the forward graph and the parameter shapes live here; data loading,
//! training and checkpointing belong to the caller.
//!
//! ```no_run
//! use mixinresnet::{Mode, Network, NetworkConfig};
//! use tch::{nn, Device, Kind, Tensor};
//!
//! let vs = nn::VarStore::new(Device::Cpu);
//! let net = Network::new(&vs.root(), &NetworkConfig::default())?;
//! let images = Tensor::ones([2, 3, 256, 256], (Kind::Float, Device::Cpu));
//! let logits = net.forward(&images, Mode::Eval)?;
//! assert_eq!(logits.size(), vec![2, 102]);
//! # Ok::<(), mixinresnet::Error>(())
//! ```
use lazy_static::*;
use tch::Device;

pub mod config;
pub mod error;
pub mod layers;
pub mod network;
pub mod shape;

pub use config::{BatchNormSettings, NetworkConfig};
pub use error::{Error, Result};
pub use layers::{Layer, Mode};
pub use network::{Network, Stage, StageShape};
pub use shape::FeatureShape;

lazy_static! {
    pub static ref DEVICE: Device = {
        if tch::Cuda::is_available() {
            log::info!("Using GPU");
            Device::Cuda(0)
        } else {
            log::info!("Using CPU");
            Device::Cpu
        }
    };
}
