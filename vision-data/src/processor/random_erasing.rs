//! Random erasing on normalized image tensors.

use super::*;
use crate::common::*;

/// The values written into an erased region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EraseMode {
    /// Fill with zeros.
    Const,
    /// Fill each channel with one normal random value.
    Rand,
    /// Fill each element with a normal random value.
    Pixel,
}

impl Default for EraseMode {
    fn default() -> Self {
        Self::Pixel
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomErasingInit {
    pub prob: R64,
    pub mode: EraseMode,
    /// The maximum number of erased regions per image.
    pub count: usize,
    pub min_area: R64,
    pub max_area: R64,
    pub min_aspect: R64,
}

impl RandomErasingInit {
    pub fn build(self) -> Result<RandomErasing> {
        let Self {
            prob,
            mode,
            count,
            min_area,
            max_area,
            min_aspect,
        } = self;

        if !(0.0..=1.0).contains(&prob.raw()) {
            return Err(Error::Configuration(format!(
                "erasing probability must be in range [0, 1], but get {}",
                prob
            )));
        }
        if count == 0 {
            return Err(Error::Configuration(
                "erasing count must be positive".into(),
            ));
        }
        if !(min_area > 0.0 && min_area <= max_area && max_area <= 1.0) {
            return Err(Error::Configuration(
                "erasing area must satisfy 0 < min <= max <= 1".into(),
            ));
        }
        if min_aspect <= 0.0 {
            return Err(Error::Configuration(
                "erasing aspect must be positive".into(),
            ));
        }

        let log_aspect = min_aspect.raw().ln().abs();
        let normal = Normal::new(0.0, 1.0).map_err(|err| Error::Configuration(err.to_string()))?;

        Ok(RandomErasing {
            prob: prob.raw(),
            normal,
            mode,
            count,
            area: (min_area.raw(), max_area.raw()),
            log_aspect: (-log_aspect, log_aspect),
        })
    }
}

impl Default for RandomErasingInit {
    fn default() -> Self {
        Self {
            prob: r64(0.5),
            mode: EraseMode::default(),
            count: 1,
            min_area: r64(0.02),
            max_area: r64(1.0 / 3.0),
            min_aspect: r64(0.3),
        }
    }
}

/// Overwrite random rectangles of a tensor.
#[derive(Debug, Clone)]
pub struct RandomErasing {
    prob: f64,
    normal: Normal<f32>,
    mode: EraseMode,
    count: usize,
    area: (f64, f64),
    log_aspect: (f64, f64),
}

impl RandomErasing {
    fn erase(&self, tensor: &mut Tensor, count: usize, rng: &mut dyn RngCore) {
        let (channels, height, width) = tensor.dim();
        let area = (height * width) as f64;
        let normal = self.normal;

        for _ in 0..10 {
            let target_area =
                rng.gen_range(self.area.0..=self.area.1) * area / count as f64;
            let aspect = rng.gen_range(self.log_aspect.0..=self.log_aspect.1).exp();
            let h = (target_area * aspect).sqrt().round() as usize;
            let w = (target_area / aspect).sqrt().round() as usize;

            if 0 < h && h < height && 0 < w && w < width {
                let top = rng.gen_range(0..=(height - h));
                let left = rng.gen_range(0..=(width - w));
                let mut region = tensor.slice_mut(s![.., top..(top + h), left..(left + w)]);

                match self.mode {
                    EraseMode::Const => region.fill(0.0),
                    EraseMode::Rand => {
                        for c in 0..channels {
                            let value = normal.sample(rng);
                            region.index_axis_mut(Axis(0), c).fill(value);
                        }
                    }
                    EraseMode::Pixel => region.map_inplace(|value| *value = normal.sample(rng)),
                }
                break;
            }
        }
    }
}

impl TensorOp for RandomErasing {
    fn apply(&self, mut tensor: Tensor, rng: &mut dyn RngCore) -> Tensor {
        if !rng.gen_bool(self.prob) {
            return tensor;
        }
        let count = rng.gen_range(1..=self.count);
        for _ in 0..count {
            self.erase(&mut tensor, count, rng);
        }
        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_erasing_test() {
        let mut rng = StdRng::seed_from_u64(6);
        let erasing = RandomErasingInit {
            prob: r64(1.0),
            mode: EraseMode::Const,
            ..Default::default()
        }
        .build()
        .unwrap();

        let output = erasing.apply(Tensor::ones((3, 32, 32)), &mut rng);
        let erased = output.iter().filter(|&&value| value == 0.0).count();
        assert!(erased > 0);
        assert_eq!(erased % 3, 0);

        let never = RandomErasingInit {
            prob: r64(0.0),
            ..Default::default()
        }
        .build()
        .unwrap();
        let output = never.apply(Tensor::ones((3, 8, 8)), &mut rng);
        assert!(output.iter().all(|&value| value == 1.0));
    }

    #[test]
    fn random_erasing_init_test() {
        let result = RandomErasingInit {
            count: 0,
            ..Default::default()
        }
        .build();
        assert!(result.is_err());

        assert_eq!("pixel".parse::<EraseMode>().unwrap(), EraseMode::Pixel);
    }
}
