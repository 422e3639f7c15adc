use super::*;

/// conv -> batch-norm -> relu.
#[derive(Debug)]
pub struct BasicConv {
    conv: nn::Conv2D,
    bn: nn::BatchNorm,
    geometry: Conv2dGeometry,
    c_in: i64,
    c_out: i64,
}

impl BasicConv {
    pub fn new(
        p: nn::Path,
        c_in: i64,
        c_out: i64,
        geometry: Conv2dGeometry,
        bn: &BatchNormSettings,
        bias: bool,
    ) -> BasicConv {
        BasicConv {
            conv: conv(&p / "conv", c_in, c_out, geometry, 1, bias),
            bn: batch_norm(&p / "bn", c_out, bn),
            geometry,
            c_in,
            c_out,
        }
    }
}

impl Layer for BasicConv {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        self.output_shape(FeatureShape::of(xs, "basic_conv")?)?;
        Ok(xs
            .apply(&self.conv)
            .apply_t(&self.bn, mode.is_train())
            .relu())
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        input.expect_channels(self.c_in, "basic_conv")?;
        self.geometry.output_shape(input, self.c_out, "basic_conv")
    }
}

/// Per-channel spatial conv followed by a 1x1 channel mixing conv, each normalized and activated.
#[derive(Debug)]
pub struct SeparableConv {
    depthwise: nn::Conv2D,
    depthwise_bn: nn::BatchNorm,
    pointwise: nn::Conv2D,
    pointwise_bn: nn::BatchNorm,
    geometry: Conv2dGeometry,
    c_in: i64,
    c_out: i64,
}

impl SeparableConv {
    pub fn new(
        p: nn::Path,
        c_in: i64,
        c_out: i64,
        geometry: Conv2dGeometry,
        bn: &BatchNormSettings,
    ) -> SeparableConv {
        let depthwise = &p / "depthwise";
        let pointwise = &p / "pointwise";
        SeparableConv {
            depthwise: conv(&depthwise / 0, c_in, c_in, geometry, c_in, true),
            depthwise_bn: batch_norm(&depthwise / 1, c_in, bn),
            pointwise: conv(&pointwise / 0, c_in, c_out, Conv2dGeometry::pointwise(), 1, true),
            pointwise_bn: batch_norm(&pointwise / 1, c_out, bn),
            geometry,
            c_in,
            c_out,
        }
    }

    pub fn out_channels(&self) -> i64 {
        self.c_out
    }
}

impl Layer for SeparableConv {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        self.output_shape(FeatureShape::of(xs, "separable_conv")?)?;
        let train = mode.is_train();
        Ok(xs
            .apply(&self.depthwise)
            .apply_t(&self.depthwise_bn, train)
            .relu()
            .apply(&self.pointwise)
            .apply_t(&self.pointwise_bn, train)
            .relu())
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        input.expect_channels(self.c_in, "separable_conv")?;
        self.geometry.output_shape(input, self.c_out, "separable_conv")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    /// Padding is excluded from the average.
    Avg,
}

#[derive(Debug, Clone, Copy)]
pub struct Pool {
    kind: PoolKind,
    geometry: PoolGeometry,
}

impl Pool {
    pub fn max(kernel: i64, stride: i64) -> Pool {
        Pool {
            kind: PoolKind::Max,
            geometry: PoolGeometry::new(kernel, stride, 0),
        }
    }

    pub fn avg(kernel: i64, stride: i64, padding: i64) -> Pool {
        Pool {
            kind: PoolKind::Avg,
            geometry: PoolGeometry::new(kernel, stride, padding),
        }
    }
}

impl Layer for Pool {
    fn forward(&self, xs: &Tensor, _mode: Mode) -> Result<Tensor> {
        self.output_shape(FeatureShape::of(xs, "pool")?)?;
        let PoolGeometry {
            kernel,
            stride,
            padding,
        } = self.geometry;
        let ys = match self.kind {
            PoolKind::Max => xs.max_pool2d(
                [kernel, kernel],
                [stride, stride],
                [padding, padding],
                [1, 1],
                false,
            ),
            PoolKind::Avg => xs.avg_pool2d(
                [kernel, kernel],
                [stride, stride],
                [padding, padding],
                false,
                false,
                None::<i64>,
            ),
        };
        Ok(ys)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.geometry.output_shape(input, "pool")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tch::{Device, Kind};

    #[test]
    fn basic_conv_follows_conv_arithmetic() {
        let vs = nn::VarStore::new(Device::Cpu);
        let unit = BasicConv::new(
            vs.root() / "unit",
            4,
            6,
            Conv2dGeometry::square(3).stride(2),
            &BatchNormSettings::stem(),
            false,
        );
        let xs = Tensor::rand([2, 4, 11, 11], (Kind::Float, Device::Cpu));
        let ys = unit.forward(&xs, Mode::Eval).unwrap();
        assert_eq!(ys.size(), vec![2, 6, 5, 5]);
        assert_eq!(
            unit.output_shape(FeatureShape::new(2, 4, 11, 11)).unwrap(),
            FeatureShape::new(2, 6, 5, 5)
        );
        // relu output
        assert!(ys.min().double_value(&[]) >= 0.0);
    }

    #[test]
    fn basic_conv_leaves_input_untouched() {
        let vs = nn::VarStore::new(Device::Cpu);
        let unit = BasicConv::new(
            vs.root(),
            2,
            2,
            Conv2dGeometry::pointwise(),
            &BatchNormSettings::stem(),
            false,
        );
        let xs = Tensor::from_slice(&[-1.0f32, 2.0, -3.0, 4.0]).view([1, 2, 1, 2]);
        let before = xs.copy();
        let _ = unit.forward(&xs, Mode::Eval).unwrap();
        assert!(xs.equal(&before));
    }

    #[test]
    fn separable_conv_uses_one_filter_per_channel() {
        let vs = nn::VarStore::new(Device::Cpu);
        let unit = SeparableConv::new(
            vs.root() / "sep",
            8,
            16,
            Conv2dGeometry::square(3).padding(1),
            &BatchNormSettings::branch(),
        );
        let variables = vs.variables();
        assert_eq!(variables["sep.depthwise.0.weight"].size(), vec![8, 1, 3, 3]);
        assert_eq!(variables["sep.pointwise.0.weight"].size(), vec![16, 8, 1, 1]);
        let xs = Tensor::rand([1, 8, 9, 9], (Kind::Float, Device::Cpu));
        assert_eq!(unit.forward(&xs, Mode::Train).unwrap().size(), vec![1, 16, 9, 9]);
    }

    #[test]
    fn wrong_channel_count_is_rejected_before_running() {
        let vs = nn::VarStore::new(Device::Cpu);
        let unit = SeparableConv::new(
            vs.root(),
            8,
            16,
            Conv2dGeometry::pointwise(),
            &BatchNormSettings::branch(),
        );
        let xs = Tensor::rand([1, 7, 4, 4], (Kind::Float, Device::Cpu));
        match unit.forward(&xs, Mode::Eval) {
            Err(Error::ShapeMismatch { layer, .. }) => assert_eq!(layer, "separable_conv"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn avg_pool_excludes_padding() {
        let pool = Pool::avg(3, 1, 1);
        let xs = Tensor::ones([1, 1, 3, 3], (Kind::Float, Device::Cpu));
        let ys = pool.forward(&xs, Mode::Eval).unwrap();
        assert_eq!(ys.size(), vec![1, 1, 3, 3]);
        // corners only see 4 real values, still all ones
        assert_eq!(ys.double_value(&[0, 0, 0, 0]), 1.0);
    }

    #[test]
    fn max_pool_halves_resolution() {
        let pool = Pool::max(3, 2);
        let xs = Tensor::rand([1, 5, 31, 31], (Kind::Float, Device::Cpu));
        assert_eq!(pool.forward(&xs, Mode::Eval).unwrap().size(), vec![1, 5, 15, 15]);
    }
}
