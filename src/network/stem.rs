use super::*;

/// 3 x 256 x 256 image -> 192 x 31 x 31 feature map.
pub fn stem(p: &nn::Path, config: &NetworkConfig) -> Result<Vec<(String, Stage)>> {
    let branch_bn = &config.branch_batch_norm;
    let stem_bn = &config.stem_batch_norm;
    let mixed = |name: &str, c_in: i64, c_out: i64, stride: i64| -> Result<(String, Stage)> {
        let unit = MixedConv::new(p / name, c_in, c_out, 3, stride, branch_bn)?;
        Ok((name.to_string(), Stage::Mixed(unit)))
    };
    Ok(vec![
        mixed("conv2d_1a", INPUT_CHANNELS, 32, 2)?,
        mixed("conv2d_2a", 32, 32, 1)?,
        mixed("conv2d_2b", 32, 64, 1)?,
        ("maxpool_3a".to_string(), Stage::Pool(Pool::max(3, 2))),
        (
            "conv2d_3b".to_string(),
            Stage::Basic(BasicConv::new(
                p / "conv2d_3b",
                64,
                80,
                Conv2dGeometry::pointwise(),
                stem_bn,
                config.basic_conv_bias,
            )),
        ),
        mixed("conv2d_4a", 80, 192, 1)?,
        ("maxpool_5a".to_string(), Stage::Pool(Pool::max(3, 2))),
    ])
}
