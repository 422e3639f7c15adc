use super::*;
use crate::error::Error;

const DILATION: i64 = 2;

/// Separable, standard and dilated paths over the same input, concatenated
/// and fused back to `c_out` channels by a 1x1 conv.
///
/// Padding is derived from the kernel so that all three paths land on the same
/// spatial size: `k / 2` for the undilated paths, `DILATION * (k / 2)` for the dilated one.
#[derive(Debug)]
pub struct MixedConv {
    separable: SeparableConv,
    standard: nn::Conv2D,
    standard_bn: nn::BatchNorm,
    dilated: nn::Conv2D,
    dilated_bn: nn::BatchNorm,
    pointwise: nn::Conv2D,
    plain_geometry: Conv2dGeometry,
    dilated_geometry: Conv2dGeometry,
    c_in: i64,
    c_out: i64,
}

impl MixedConv {
    pub fn new(
        p: nn::Path,
        c_in: i64,
        c_out: i64,
        kernel: i64,
        stride: i64,
        bn: &BatchNormSettings,
    ) -> Result<MixedConv> {
        if kernel <= 0 || kernel % 2 == 0 {
            return Err(Error::Configuration(format!(
                "mixed conv needs an odd kernel size, got {}",
                kernel
            )));
        }
        let half = kernel / 2;
        let plain_geometry = Conv2dGeometry::square(kernel).stride(stride).padding(half);
        let dilated_geometry = Conv2dGeometry::square(kernel)
            .stride(stride)
            .padding(DILATION * half)
            .dilation(DILATION);
        let standard = &p / "standard_conv";
        let dilated = &p / "dilated_conv";
        Ok(MixedConv {
            separable: SeparableConv::new(&p / "depthwise_separable", c_in, c_out, plain_geometry, bn),
            standard: conv(&standard / 0, c_in, c_out, plain_geometry, 1, true),
            standard_bn: batch_norm(&standard / 1, c_out, bn),
            dilated: conv(&dilated / 0, c_in, c_out, dilated_geometry, 1, true),
            dilated_bn: batch_norm(&dilated / 1, c_out, bn),
            pointwise: conv(&p / "pointwise", 3 * c_out, c_out, Conv2dGeometry::pointwise(), 1, true),
            plain_geometry,
            dilated_geometry,
            c_in,
            c_out,
        })
    }

    /// Output shapes of the separable, standard and dilated paths, in concatenation order.
    pub fn branch_shapes(&self, input: FeatureShape) -> Result<[FeatureShape; 3]> {
        input.expect_channels(self.c_in, "mixed_conv")?;
        Ok([
            self.separable.output_shape(input)?,
            self.plain_geometry.output_shape(input, self.c_out, "mixed_conv")?,
            self.dilated_geometry.output_shape(input, self.c_out, "mixed_conv")?,
        ])
    }
}

impl Layer for MixedConv {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        self.output_shape(FeatureShape::of(xs, "mixed_conv")?)?;
        let train = mode.is_train();
        let separable = self.separable.forward(xs, mode)?;
        let standard = xs.apply(&self.standard).apply_t(&self.standard_bn, train).relu();
        let dilated = xs.apply(&self.dilated).apply_t(&self.dilated_bn, train).relu();
        let fused = cat_checked(&[separable, standard, dilated], "mixed_conv")?;
        Ok(fused.apply(&self.pointwise))
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        let branches = self.branch_shapes(input)?;
        let concat = concat_shape(&branches, "mixed_conv")?;
        Ok(concat.with_channels(self.c_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn mixed(c_in: i64, c_out: i64, kernel: i64, stride: i64) -> (nn::VarStore, Result<MixedConv>) {
        let vs = nn::VarStore::new(Device::Cpu);
        let unit = MixedConv::new(vs.root() / "mixed", c_in, c_out, kernel, stride, &BatchNormSettings::branch());
        (vs, unit)
    }

    #[test]
    fn branches_agree_on_spatial_size() {
        for &kernel in &[1, 3, 5, 7] {
            for &stride in &[1, 2] {
                let (_vs, unit) = mixed(3, 8, kernel, stride);
                let unit = unit.unwrap();
                for &side in &[7, 31, 63, 256] {
                    let [a, b, c] = unit.branch_shapes(FeatureShape::new(1, 3, side, side)).unwrap();
                    assert_eq!(a, b, "kernel {} stride {} side {}", kernel, stride, side);
                    assert_eq!(b, c, "kernel {} stride {} side {}", kernel, stride, side);
                    assert_eq!(a.channels, 8);
                }
            }
        }
    }

    #[test]
    fn stem_stride_two_halves_the_image() {
        let (_vs, unit) = mixed(3, 32, 3, 2);
        let unit = unit.unwrap();
        assert_eq!(
            unit.output_shape(FeatureShape::new(2, 3, 256, 256)).unwrap(),
            FeatureShape::new(2, 32, 128, 128)
        );
    }

    #[test]
    fn forward_fuses_back_to_target_channels() {
        let (vs, unit) = mixed(4, 6, 3, 1);
        let unit = unit.unwrap();
        let variables = vs.variables();
        assert_eq!(variables["mixed.pointwise.weight"].size(), vec![6, 18, 1, 1]);
        assert_eq!(variables["mixed.dilated_conv.0.weight"].size(), vec![6, 4, 3, 3]);
        let xs = Tensor::rand([2, 4, 10, 10], (Kind::Float, Device::Cpu));
        let ys = unit.forward(&xs, Mode::Eval).unwrap();
        assert_eq!(ys.size(), vec![2, 6, 10, 10]);
    }

    #[test]
    fn even_kernel_is_a_configuration_error() {
        let (_vs, unit) = mixed(3, 8, 4, 1);
        assert!(matches!(unit, Err(Error::Configuration(_))));
    }
}
