use tch::{nn, Tensor};

use crate::config::BatchNormSettings;
use crate::error::Result;
use crate::shape::{concat_shape, Conv2dGeometry, FeatureShape, PoolGeometry};

mod branch;
mod mixed;
mod units;

pub use branch::{Branch, Concat, Projected, Step};
pub use mixed::MixedConv;
pub use units::{BasicConv, Pool, PoolKind, SeparableConv};

/// Whether batch-norm uses (and updates) batch statistics or its running statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        self == Mode::Train
    }
}

pub trait Layer {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor>;

    /// Shape produced for `input`, computed from the layer geometry alone.
    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape>;
}

fn conv(
    p: nn::Path,
    c_in: i64,
    c_out: i64,
    geometry: Conv2dGeometry,
    groups: i64,
    bias: bool,
) -> nn::Conv2D {
    let config = nn::ConvConfigND::<[i64; 2]> {
        stride: [geometry.stride, geometry.stride],
        padding: geometry.padding,
        dilation: [geometry.dilation, geometry.dilation],
        groups,
        bias,
        ..Default::default()
    };
    nn::conv(p, c_in, c_out, geometry.kernel, config)
}

fn batch_norm(p: nn::Path, channels: i64, settings: &BatchNormSettings) -> nn::BatchNorm {
    nn::batch_norm2d(p, channels, settings.to_tch())
}

/// Channel-wise concatenation of branch outputs, in the given order.
fn cat_checked(parts: &[Tensor], layer: &'static str) -> Result<Tensor> {
    let shapes = parts
        .iter()
        .map(|t| FeatureShape::of(t, layer))
        .collect::<Result<Vec<_>>>()?;
    concat_shape(&shapes, layer)?;
    Ok(Tensor::f_cat(parts, 1)?)
}
