use std::fmt;

use tch::{nn, Tensor};

use crate::config::{BatchNormSettings, NetworkConfig, INPUT_CHANNELS};
use crate::error::{shape_mismatch, Error, Result};
use crate::layers::{BasicConv, Branch, Concat, Layer, MixedConv, Mode, Pool, Projected};
use crate::shape::{Conv2dGeometry, FeatureShape};
use crate::DEVICE;

mod fusion;
mod head;
mod residual;
mod stem;

pub use fusion::{mixed_5b, mixed_6a, mixed_7a};
pub use head::Classifier;
pub use residual::{
    block17, block35, block8, repeat, Residual, BLOCK17_REPEATS, BLOCK17_SCALE, BLOCK35_REPEATS,
    BLOCK35_SCALE, BLOCK8_REPEATS, BLOCK8_SCALE, TERMINAL_BLOCK8_SCALE,
};
pub use stem::stem;

pub const FEATURE_CHANNELS: i64 = 1536;

fn pw() -> Conv2dGeometry {
    Conv2dGeometry::pointwise()
}

#[derive(Debug)]
pub enum Stage {
    Mixed(MixedConv),
    Basic(BasicConv),
    Pool(Pool),
    Fusion(Concat),
    Residual(Residual),
}

impl Layer for Stage {
    fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        match self {
            Stage::Mixed(unit) => unit.forward(xs, mode),
            Stage::Basic(unit) => unit.forward(xs, mode),
            Stage::Pool(pool) => pool.forward(xs, mode),
            Stage::Fusion(block) => block.forward(xs, mode),
            Stage::Residual(block) => block.forward(xs, mode),
        }
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        match self {
            Stage::Mixed(unit) => unit.output_shape(input),
            Stage::Basic(unit) => unit.output_shape(input),
            Stage::Pool(pool) => pool.output_shape(input),
            Stage::Fusion(block) => block.output_shape(input),
            Stage::Residual(block) => block.output_shape(input),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageShape {
    pub name: String,
    pub shape: FeatureShape,
}

impl fmt::Display for StageShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:<12} {}", self.name, self.shape)
    }
}

/// Mix-InResNet: the Inception-ResNet-v2 layout where plain convolutions are
/// replaced by mixed separable/standard/dilated units.
#[derive(Debug)]
pub struct Network {
    stages: Vec<(String, Stage)>,
    classifier: Classifier,
    config: NetworkConfig,
}

impl Network {
    pub fn new(p: &nn::Path, config: &NetworkConfig) -> Result<Network> {
        config.validate()?;
        let branch_bn = &config.branch_batch_norm;

        let mut stages = stem(p, config)?;
        stages.push(("mixed_5b".to_string(), Stage::Fusion(mixed_5b(p / "mixed_5b", branch_bn))));
        push_repeated(
            &mut stages,
            "repeat",
            repeat(&(p / "repeat"), BLOCK35_REPEATS, |p| block35(p, branch_bn, BLOCK35_SCALE)),
        );
        stages.push(("mixed_6a".to_string(), Stage::Fusion(mixed_6a(p / "mixed_6a", branch_bn))));
        push_repeated(
            &mut stages,
            "repeat_1",
            repeat(&(p / "repeat_1"), BLOCK17_REPEATS, |p| block17(p, branch_bn, BLOCK17_SCALE)),
        );
        stages.push(("mixed_7a".to_string(), Stage::Fusion(mixed_7a(p / "mixed_7a", branch_bn))));
        push_repeated(
            &mut stages,
            "repeat_2",
            repeat(&(p / "repeat_2"), BLOCK8_REPEATS, |p| block8(p, branch_bn, BLOCK8_SCALE, true)),
        );
        stages.push((
            "block8".to_string(),
            Stage::Residual(block8(p / "block8", branch_bn, TERMINAL_BLOCK8_SCALE, false)),
        ));
        stages.push((
            "conv2d_7b".to_string(),
            Stage::Basic(BasicConv::new(
                p / "conv2d_7b",
                2080,
                FEATURE_CHANNELS,
                pw(),
                &config.stem_batch_norm,
                config.basic_conv_bias,
            )),
        ));

        let network = Network {
            stages,
            classifier: Classifier::new(p / "last_linear", FEATURE_CHANNELS, config.num_classes),
            config: config.clone(),
        };
        network.check_input_size()?;
        Ok(network)
    }

    /// Builds the network in a fresh var store on `DEVICE`.
    pub fn on_default_device(config: &NetworkConfig) -> Result<(nn::VarStore, Network)> {
        let vs = nn::VarStore::new(*DEVICE);
        let network = Network::new(&vs.root(), config)?;
        Ok((vs, network))
    }

    fn check_input_size(&self) -> Result<()> {
        let input = self.config.input_shape(1);
        let summary = self.summary(input).map_err(|e| {
            Error::Configuration(format!(
                "input size {} does not fit the architecture: {}",
                self.config.input_size, e
            ))
        })?;
        for stage in &summary {
            log::debug!("{}", stage);
        }
        let features = self.feature_shape(input)?;
        let (_, classes) = self.logits_shape(input)?;
        log::info!(
            "Built network with {} stages, features {}, {} classes",
            summary.len(),
            features,
            classes
        );
        Ok(())
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn stages(&self) -> impl Iterator<Item = (&str, &Stage)> {
        self.stages.iter().map(|(name, stage)| (name.as_str(), stage))
    }

    /// Output shape of every stage, in execution order.
    pub fn summary(&self, input: FeatureShape) -> Result<Vec<StageShape>> {
        input.expect_channels(INPUT_CHANNELS, "input")?;
        let mut shape = input;
        let mut summary = Vec::with_capacity(self.stages.len());
        for (name, stage) in &self.stages {
            shape = stage.output_shape(shape)?;
            summary.push(StageShape {
                name: name.clone(),
                shape,
            });
        }
        Ok(summary)
    }

    pub fn feature_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        let summary = self.summary(input)?;
        summary
            .last()
            .map(|stage| stage.shape)
            .ok_or_else(|| shape_mismatch("network", "no stages"))
    }

    pub fn logits_shape(&self, input: FeatureShape) -> Result<(i64, i64)> {
        self.classifier.output_shape(self.feature_shape(input)?)
    }

    /// Backbone feature map, (batch, 1536, h, w).
    pub fn features(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        self.feature_shape(FeatureShape::of(xs, "input")?)?;
        let mut ys = xs.shallow_clone();
        for (_, stage) in &self.stages {
            ys = stage.forward(&ys, mode)?;
        }
        Ok(ys)
    }

    pub fn logits(&self, features: &Tensor) -> Result<Tensor> {
        self.classifier.forward(features)
    }

    /// Un-normalized class scores, (batch, num_classes).
    pub fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        let features = self.features(xs, mode)?;
        self.logits(&features)
    }

    pub fn parameter_count(vs: &nn::VarStore) -> usize {
        vs.trainable_variables().iter().map(|t| t.numel()).sum()
    }
}

fn push_repeated(stages: &mut Vec<(String, Stage)>, name: &str, blocks: Vec<Residual>) {
    for (i, block) in blocks.into_iter().enumerate() {
        stages.push((format!("{}.{}", name, i), Stage::Residual(block)));
    }
}
