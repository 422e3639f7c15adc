use super::*;

pub const BLOCK35_SCALE: f64 = 0.17;
pub const BLOCK17_SCALE: f64 = 0.10;
pub const BLOCK8_SCALE: f64 = 0.20;
/// The last Block8 keeps the full delta and skips the activation.
pub const TERMINAL_BLOCK8_SCALE: f64 = 1.0;

pub const BLOCK35_REPEATS: usize = 10;
pub const BLOCK17_REPEATS: usize = 20;
pub const BLOCK8_REPEATS: usize = 9;

/// `relu(x + scale * delta(x))`, or without the relu when `activation` is false.
///
/// `scale` is a fixed constant, not a learned parameter.
#[derive(Debug)]
pub struct Residual<D = Projected> {
    delta: D,
    scale: f64,
    activation: bool,
}

impl<D: Layer> Residual<D> {
    pub fn from_parts(delta: D, scale: f64, activation: bool) -> Residual<D> {
        Residual {
            delta,
            scale,
            activation,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn has_activation(&self) -> bool {
        self.activation
    }
}

impl<D: Layer> Layer for Residual<D> {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        let delta = self.delta.forward(xs, mode)?;
        expect_same_shape(xs, &delta)?;
        let ys = xs + delta * self.scale;
        Ok(if self.activation { ys.relu() } else { ys })
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        let delta = self.delta.output_shape(input)?;
        if delta != input {
            return Err(shape_mismatch(
                "residual",
                format!("delta {} cannot be added to input {}", delta, input),
            ));
        }
        Ok(input)
    }
}

fn expect_same_shape(xs: &Tensor, delta: &Tensor) -> Result<()> {
    let (input, delta) = (xs.size(), delta.size());
    if input != delta {
        return Err(shape_mismatch(
            "residual",
            format!("delta {:?} cannot be added to input {:?}", delta, input),
        ));
    }
    Ok(())
}

pub fn block35(p: nn::Path, bn: &BatchNormSettings, scale: f64) -> Residual {
    let branches = vec![
        Branch::separable(&p / "branch0", &[(320, 32, pw())], bn),
        Branch::separable(
            &p / "branch1",
            &[(320, 32, pw()), (32, 32, Conv2dGeometry::square(3).padding(1))],
            bn,
        ),
        Branch::separable(
            &p / "branch2",
            &[
                (320, 32, pw()),
                (32, 48, Conv2dGeometry::square(3).padding(1)),
                (48, 64, Conv2dGeometry::square(3).padding(1)),
            ],
            bn,
        ),
    ];
    let delta = Projected::new(p, Concat::new("block35", branches), 128, 320);
    Residual::from_parts(delta, scale, true)
}

pub fn block17(p: nn::Path, bn: &BatchNormSettings, scale: f64) -> Residual {
    let branches = vec![
        Branch::separable(&p / "branch0", &[(1088, 192, pw())], bn),
        Branch::separable(
            &p / "branch1",
            &[
                (1088, 128, pw()),
                (128, 160, Conv2dGeometry::rect([1, 7], [0, 3])),
                (160, 192, Conv2dGeometry::rect([7, 1], [3, 0])),
            ],
            bn,
        ),
    ];
    let delta = Projected::new(p, Concat::new("block17", branches), 384, 1088);
    Residual::from_parts(delta, scale, true)
}

pub fn block8(p: nn::Path, bn: &BatchNormSettings, scale: f64, activation: bool) -> Residual {
    let branches = vec![
        Branch::separable(&p / "branch0", &[(2080, 192, pw())], bn),
        Branch::separable(
            &p / "branch1",
            &[
                (2080, 192, pw()),
                (192, 224, Conv2dGeometry::rect([1, 3], [0, 1])),
                (224, 256, Conv2dGeometry::rect([3, 1], [1, 0])),
            ],
            bn,
        ),
    ];
    let delta = Projected::new(p, Concat::new("block8", branches), 448, 2080);
    Residual::from_parts(delta, scale, activation)
}

/// `count` residual blocks indexed `p.0 .. p.{count - 1}`.
pub fn repeat<F>(p: &nn::Path, count: usize, mut build: F) -> Vec<Residual>
where
    F: FnMut(nn::Path) -> Residual,
{
    (0..count).map(|i| build(p / i)).collect()
}
