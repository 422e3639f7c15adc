use super::*;

#[derive(Debug)]
pub enum Step {
    Separable(SeparableConv),
    Pool(Pool),
}

impl Layer for Step {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        match self {
            Step::Separable(unit) => unit.forward(xs, mode),
            Step::Pool(pool) => pool.forward(xs, mode),
        }
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        match self {
            Step::Separable(unit) => unit.output_shape(input),
            Step::Pool(pool) => pool.output_shape(input),
        }
    }
}

/// A chain of steps applied in order.
#[derive(Debug)]
pub struct Branch {
    steps: Vec<Step>,
}

impl Branch {
    pub fn new(steps: Vec<Step>) -> Branch {
        Branch { steps }
    }

    pub fn pool(pool: Pool) -> Branch {
        Branch::new(vec![Step::Pool(pool)])
    }

    /// Separable convs given as `(c_in, c_out, geometry)`. A single unit lives directly
    /// under `p`, longer chains are indexed `p.0`, `p.1`, ...
    pub fn separable(
        p: nn::Path,
        chain: &[(i64, i64, Conv2dGeometry)],
        bn: &BatchNormSettings,
    ) -> Branch {
        Branch::separable_from(p, 0, chain, bn, Vec::new())
    }

    /// Same as `separable` but behind an average pool, which takes index 0.
    pub fn pooled_separable(
        p: nn::Path,
        pool: Pool,
        chain: &[(i64, i64, Conv2dGeometry)],
        bn: &BatchNormSettings,
    ) -> Branch {
        Branch::separable_from(p, 1, chain, bn, vec![Step::Pool(pool)])
    }

    fn separable_from(
        p: nn::Path,
        first_index: usize,
        chain: &[(i64, i64, Conv2dGeometry)],
        bn: &BatchNormSettings,
        mut steps: Vec<Step>,
    ) -> Branch {
        if let (0, &[(c_in, c_out, geometry)]) = (first_index, chain) {
            steps.push(Step::Separable(SeparableConv::new(p, c_in, c_out, geometry, bn)));
            return Branch::new(steps);
        }
        for (i, &(c_in, c_out, geometry)) in chain.iter().enumerate() {
            let unit = SeparableConv::new(&p / (first_index + i), c_in, c_out, geometry, bn);
            steps.push(Step::Separable(unit));
        }
        Branch::new(steps)
    }
}

impl Layer for Branch {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        let mut steps = self.steps.iter();
        let mut ys = match steps.next() {
            Some(step) => step.forward(xs, mode)?,
            None => return Ok(xs.shallow_clone()),
        };
        for step in steps {
            ys = step.forward(&ys, mode)?;
        }
        Ok(ys)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.steps
            .iter()
            .try_fold(input, |shape, step| step.output_shape(shape))
    }
}

/// Independent branches over the same input, concatenated channel-wise in declaration order.
#[derive(Debug)]
pub struct Concat {
    name: &'static str,
    branches: Vec<Branch>,
}

impl Concat {
    pub fn new(name: &'static str, branches: Vec<Branch>) -> Concat {
        Concat { name, branches }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Layer for Concat {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        let outputs = self
            .branches
            .iter()
            .map(|branch| branch.forward(xs, mode))
            .collect::<Result<Vec<_>>>()?;
        cat_checked(&outputs, self.name)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        let shapes = self
            .branches
            .iter()
            .map(|branch| branch.output_shape(input))
            .collect::<Result<Vec<_>>>()?;
        concat_shape(&shapes, self.name)
    }
}

/// Concatenated branches projected by a 1x1 conv (with bias) to `c_out` channels.
#[derive(Debug)]
pub struct Projected {
    concat: Concat,
    projection: nn::Conv2D,
    c_mid: i64,
    c_out: i64,
}

impl Projected {
    pub fn new(p: nn::Path, concat: Concat, c_mid: i64, c_out: i64) -> Projected {
        Projected {
            concat,
            projection: conv(&p / "conv2d", c_mid, c_out, Conv2dGeometry::pointwise(), 1, true),
            c_mid,
            c_out,
        }
    }
}

impl Layer for Projected {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        let mid = self.concat.forward(xs, mode)?;
        FeatureShape::of(&mid, self.concat.name)?.expect_channels(self.c_mid, self.concat.name)?;
        Ok(mid.apply(&self.projection))
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        let mid = self.concat.output_shape(input)?;
        mid.expect_channels(self.c_mid, self.concat.name)?;
        Ok(mid.with_channels(self.c_out))
    }
}
