use super::*;

fn reduce() -> Conv2dGeometry {
    Conv2dGeometry::square(3).stride(2)
}

/// 192 -> 96 + 64 + 96 + 64 = 320 channels, same resolution.
pub fn mixed_5b(p: nn::Path, bn: &BatchNormSettings) -> Concat {
    Concat::new(
        "mixed_5b",
        vec![
            Branch::separable(&p / "branch0", &[(192, 96, pw())], bn),
            Branch::separable(
                &p / "branch1",
                &[(192, 48, pw()), (48, 64, Conv2dGeometry::square(5).padding(2))],
                bn,
            ),
            Branch::separable(
                &p / "branch2",
                &[
                    (192, 64, pw()),
                    (64, 96, Conv2dGeometry::square(3).padding(1)),
                    (96, 96, Conv2dGeometry::square(3).padding(1)),
                ],
                bn,
            ),
            Branch::pooled_separable(&p / "branch3", Pool::avg(3, 1, 1), &[(192, 64, pw())], bn),
        ],
    )
}

/// 320 -> 384 + 384 + 320 = 1088 channels, half resolution.
pub fn mixed_6a(p: nn::Path, bn: &BatchNormSettings) -> Concat {
    Concat::new(
        "mixed_6a",
        vec![
            Branch::separable(&p / "branch0", &[(320, 384, reduce())], bn),
            Branch::separable(
                &p / "branch1",
                &[
                    (320, 256, pw()),
                    (256, 256, Conv2dGeometry::square(3).padding(1)),
                    (256, 384, reduce()),
                ],
                bn,
            ),
            Branch::pool(Pool::max(3, 2)),
        ],
    )
}

/// 1088 -> 384 + 288 + 320 + 1088 = 2080 channels, half resolution.
pub fn mixed_7a(p: nn::Path, bn: &BatchNormSettings) -> Concat {
    Concat::new(
        "mixed_7a",
        vec![
            Branch::separable(&p / "branch0", &[(1088, 256, pw()), (256, 384, reduce())], bn),
            Branch::separable(&p / "branch1", &[(1088, 256, pw()), (256, 288, reduce())], bn),
            Branch::separable(
                &p / "branch2",
                &[
                    (1088, 256, pw()),
                    (256, 288, Conv2dGeometry::square(3).padding(1)),
                    (288, 320, reduce()),
                ],
                bn,
            ),
            Branch::pool(Pool::max(3, 2)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn channel_counts_match_next_stage() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let bn = BatchNormSettings::branch();
        let cases = [
            (mixed_5b(&root / "m5b", &bn), FeatureShape::new(1, 192, 31, 31), FeatureShape::new(1, 320, 31, 31)),
            (mixed_6a(&root / "m6a", &bn), FeatureShape::new(1, 320, 31, 31), FeatureShape::new(1, 1088, 15, 15)),
            (mixed_7a(&root / "m7a", &bn), FeatureShape::new(1, 1088, 15, 15), FeatureShape::new(1, 2080, 7, 7)),
        ];
        for (block, input, expected) in cases.iter() {
            assert_eq!(block.output_shape(*input).unwrap(), *expected, "{}", block.name());
        }
    }

    #[test]
    fn mixed_5b_runs_on_real_data() {
        let vs = nn::VarStore::new(Device::Cpu);
        let block = mixed_5b(vs.root(), &BatchNormSettings::branch());
        let xs = Tensor::rand([2, 192, 9, 9], (Kind::Float, Device::Cpu));
        let ys = tch::no_grad(|| block.forward(&xs, Mode::Train)).unwrap();
        assert_eq!(ys.size(), vec![2, 320, 9, 9]);
    }

    #[test]
    fn mixed_6a_passes_pooled_input_through_last() {
        let vs = nn::VarStore::new(Device::Cpu);
        let block = mixed_6a(vs.root(), &BatchNormSettings::branch());
        let xs = Tensor::rand([1, 320, 7, 7], (Kind::Float, Device::Cpu));
        let ys = tch::no_grad(|| block.forward(&xs, Mode::Eval)).unwrap();
        assert_eq!(ys.size(), vec![1, 1088, 3, 3]);
        let pooled = xs.max_pool2d([3, 3], [2, 2], [0, 0], [1, 1], false);
        assert!(ys.narrow(1, 768, 320).equal(&pooled));
    }
}
