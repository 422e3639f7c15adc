use super::*;

/// Global average pool over the whole remaining extent, flatten, linear projection to logits.
/// No softmax, the loss is computed by the caller.
#[derive(Debug)]
pub struct Classifier {
    linear: nn::Linear,
    c_in: i64,
    num_classes: i64,
}

impl Classifier {
    pub fn new(p: nn::Path, c_in: i64, num_classes: i64) -> Classifier {
        Classifier {
            linear: nn::linear(p, c_in, num_classes, Default::default()),
            c_in,
            num_classes,
        }
    }

    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        self.output_shape(FeatureShape::of(features, "classifier")?)?;
        Ok(features
            .adaptive_avg_pool2d([1, 1])
            .flatten(1, -1)
            .apply(&self.linear))
    }

    /// (batch, num_classes)
    pub fn output_shape(&self, features: FeatureShape) -> Result<(i64, i64)> {
        features.expect_channels(self.c_in, "classifier")?;
        if features.height <= 0 || features.width <= 0 {
            return Err(shape_mismatch("classifier", format!("empty feature map {}", features)));
        }
        Ok((features.batch, self.num_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn pools_the_full_extent() {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = Classifier::new(vs.root() / "last_linear", 4, 3);
        let features = Tensor::rand([2, 4, 7, 7], (Kind::Float, Device::Cpu));
        let logits = head.forward(&features).unwrap();
        assert_eq!(logits.size(), vec![2, 3]);

        let variables = vs.variables();
        let weight = &variables["last_linear.weight"];
        let bias = &variables["last_linear.bias"];
        assert_eq!(weight.size(), vec![3, 4]);
        let ones = Tensor::ones([49, 1], (Kind::Float, Device::Cpu));
        let pooled = (features.view([2, 4, 49]).matmul(&ones) / 49.0).view([2, 4]);
        let expected = pooled.matmul(&weight.tr()) + bias;
        assert!(logits.allclose(&expected, 1e-5, 1e-6, false));
    }

    #[test]
    fn rejects_wrong_feature_channels() {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = Classifier::new(vs.root(), 1536, 10);
        assert!(head.output_shape(FeatureShape::new(1, 2080, 7, 7)).is_err());
        assert_eq!(head.output_shape(FeatureShape::new(5, 1536, 7, 7)).unwrap(), (5, 10));
    }
}
