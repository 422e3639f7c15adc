//! Static shape bookkeeping.
//!
//! Every layer can report the shape it produces for a given input shape without
//! running any data through it. Spatial sizes follow the usual floor arithmetic:
//! `out = floor((in + 2p - d(k - 1) - 1) / s) + 1`.
use std::fmt;

use tch::Tensor;

use crate::error::{shape_mismatch, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureShape {
    pub batch: i64,
    pub channels: i64,
    pub height: i64,
    pub width: i64,
}

impl FeatureShape {
    pub fn new(batch: i64, channels: i64, height: i64, width: i64) -> FeatureShape {
        FeatureShape {
            batch,
            channels,
            height,
            width,
        }
    }

    pub fn of(xs: &Tensor, layer: &'static str) -> Result<FeatureShape> {
        match xs.size().as_slice() {
            &[batch, channels, height, width] => Ok(FeatureShape::new(batch, channels, height, width)),
            other => Err(shape_mismatch(
                layer,
                format!("expected a 4-D feature map, got {:?}", other),
            )),
        }
    }

    pub fn with_channels(self, channels: i64) -> FeatureShape {
        FeatureShape { channels, ..self }
    }

    /// Same batch and spatial extent, channels may differ.
    pub fn same_grid(&self, other: &FeatureShape) -> bool {
        self.batch == other.batch && self.height == other.height && self.width == other.width
    }

    pub fn expect_channels(&self, channels: i64, layer: &'static str) -> Result<()> {
        if self.channels != channels {
            return Err(shape_mismatch(
                layer,
                format!("expected {} input channels, got {}", channels, self.channels),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.batch, self.channels, self.height, self.width
        )
    }
}

/// Output length of a strided, padded, dilated window along one axis.
pub fn window_output_len(
    input: i64,
    kernel: i64,
    stride: i64,
    padding: i64,
    dilation: i64,
) -> Option<i64> {
    let span = input + 2 * padding - dilation * (kernel - 1) - 1;
    if span < 0 || stride <= 0 {
        return None;
    }
    Some(span / stride + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dGeometry {
    pub kernel: [i64; 2],
    pub stride: i64,
    pub padding: [i64; 2],
    pub dilation: i64,
}

impl Conv2dGeometry {
    pub fn square(kernel: i64) -> Conv2dGeometry {
        Conv2dGeometry {
            kernel: [kernel, kernel],
            stride: 1,
            padding: [0, 0],
            dilation: 1,
        }
    }

    /// Rectangular kernel such as 1x7 or 3x1.
    pub fn rect(kernel: [i64; 2], padding: [i64; 2]) -> Conv2dGeometry {
        Conv2dGeometry {
            kernel,
            stride: 1,
            padding,
            dilation: 1,
        }
    }

    pub fn stride(self, stride: i64) -> Conv2dGeometry {
        Conv2dGeometry { stride, ..self }
    }

    pub fn padding(self, padding: i64) -> Conv2dGeometry {
        Conv2dGeometry {
            padding: [padding, padding],
            ..self
        }
    }

    pub fn dilation(self, dilation: i64) -> Conv2dGeometry {
        Conv2dGeometry { dilation, ..self }
    }

    /// Spatial geometry of the 1x1 stride-1 projections.
    pub fn pointwise() -> Conv2dGeometry {
        Conv2dGeometry::square(1)
    }

    pub fn output_hw(&self, height: i64, width: i64, layer: &'static str) -> Result<(i64, i64)> {
        let h = window_output_len(height, self.kernel[0], self.stride, self.padding[0], self.dilation);
        let w = window_output_len(width, self.kernel[1], self.stride, self.padding[1], self.dilation);
        match (h, w) {
            (Some(h), Some(w)) => Ok((h, w)),
            _ => Err(shape_mismatch(
                layer,
                format!(
                    "{}x{} input is too small for kernel {:?}, stride {}, padding {:?}, dilation {}",
                    height, width, self.kernel, self.stride, self.padding, self.dilation
                ),
            )),
        }
    }

    pub fn output_shape(
        &self,
        input: FeatureShape,
        out_channels: i64,
        layer: &'static str,
    ) -> Result<FeatureShape> {
        let (height, width) = self.output_hw(input.height, input.width, layer)?;
        Ok(FeatureShape::new(input.batch, out_channels, height, width))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    pub kernel: i64,
    pub stride: i64,
    pub padding: i64,
}

impl PoolGeometry {
    pub fn new(kernel: i64, stride: i64, padding: i64) -> PoolGeometry {
        PoolGeometry {
            kernel,
            stride,
            padding,
        }
    }

    pub fn output_shape(&self, input: FeatureShape, layer: &'static str) -> Result<FeatureShape> {
        let as_conv = Conv2dGeometry::square(self.kernel)
            .stride(self.stride)
            .padding(self.padding);
        as_conv.output_shape(input, input.channels, layer)
    }
}

/// Shape of a channel-wise concatenation. All parts must share batch and spatial size.
pub fn concat_shape(parts: &[FeatureShape], layer: &'static str) -> Result<FeatureShape> {
    let first = match parts.first() {
        Some(first) => *first,
        None => return Err(shape_mismatch(layer, "nothing to concatenate")),
    };
    let mut channels = 0;
    for part in parts {
        if !part.same_grid(&first) {
            return Err(shape_mismatch(
                layer,
                format!("cannot concatenate {} with {}", first, part),
            ));
        }
        channels += part.channels;
    }
    Ok(first.with_channels(channels))
}
