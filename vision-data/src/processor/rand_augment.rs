//! The RandAugment policy on decoded images.
//!
//! The policy is configured by a string like `rand-m9-n2-mstd0.5-inc1`:
//!
//! * `m` - the magnitude in `[0, mmax]`.
//! * `n` - the number of operations applied per image.
//! * `mstd` - the standard deviation of magnitude noise. `inf` samples the
//!   magnitude uniformly from `[0, m]`.
//! * `mmax` - the upper bound of the magnitude, defaults to 10.
//! * `inc` - if set to 1, use the variants whose strength increases with the magnitude.

use super::{color_jitter::*, *};
use crate::common::*;
use rand_distr::StandardNormal;

const LEVEL_DENOM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
pub enum AugmentOp {
    AutoContrast,
    Equalize,
    Invert,
    Rotate,
    Posterize,
    Solarize,
    SolarizeAdd,
    Color,
    Contrast,
    Brightness,
    Sharpness,
    ShearX,
    ShearY,
    TranslateX,
    TranslateY,
}

pub const RAND_AUGMENT_OPS: &[AugmentOp] = &[
    AugmentOp::AutoContrast,
    AugmentOp::Equalize,
    AugmentOp::Invert,
    AugmentOp::Rotate,
    AugmentOp::Posterize,
    AugmentOp::Solarize,
    AugmentOp::SolarizeAdd,
    AugmentOp::Color,
    AugmentOp::Contrast,
    AugmentOp::Brightness,
    AugmentOp::Sharpness,
    AugmentOp::ShearX,
    AugmentOp::ShearY,
    AugmentOp::TranslateX,
    AugmentOp::TranslateY,
];

#[derive(Debug, Clone, PartialEq)]
pub struct RandAugmentInit {
    pub magnitude: f64,
    pub num_layers: usize,
    pub magnitude_std: f64,
    pub magnitude_max: f64,
    pub increasing: bool,
    /// The probability to apply each chosen operation.
    pub prob: f64,
    /// The color of pixels uncovered by geometric operations.
    pub fill: [u8; 3],
}

impl Default for RandAugmentInit {
    fn default() -> Self {
        Self {
            magnitude: 10.0,
            num_layers: 2,
            magnitude_std: 0.0,
            magnitude_max: LEVEL_DENOM,
            increasing: false,
            prob: 0.5,
            fill: [128; 3],
        }
    }
}

impl FromStr for RandAugmentInit {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = |reason: String| {
            Error::Configuration(format!("invalid auto augment policy '{}': {}", text, reason))
        };
        let parse_f64 = |value: &str| {
            value
                .parse::<f64>()
                .map_err(|err| invalid(format!("bad number '{}': {}", value, err)))
        };

        let mut parts = text.split('-');
        match parts.next() {
            Some("rand") => {}
            _ => return Err(invalid("only the 'rand' policy is supported".into())),
        }

        let mut init = Self::default();

        for part in parts {
            if let Some(value) = part.strip_prefix("mstd") {
                init.magnitude_std = parse_f64(value)?;
            } else if let Some(value) = part.strip_prefix("mmax") {
                init.magnitude_max = parse_f64(value)?;
            } else if let Some(value) = part.strip_prefix("inc") {
                init.increasing = parse_f64(value)? != 0.0;
            } else if let Some(value) = part.strip_prefix('m') {
                init.magnitude = parse_f64(value)?;
            } else if let Some(value) = part.strip_prefix('n') {
                init.num_layers = value
                    .parse()
                    .map_err(|err| invalid(format!("bad number '{}': {}", value, err)))?;
            } else {
                return Err(invalid(format!("unknown section '{}'", part)));
            }
        }

        Ok(init)
    }
}

impl RandAugmentInit {
    pub fn build(self) -> Result<RandAugment> {
        let Self {
            magnitude,
            num_layers,
            magnitude_std,
            magnitude_max,
            increasing,
            prob,
            fill,
        } = self;

        if !(magnitude_max.is_finite() && magnitude_max > 0.0) {
            return Err(Error::Configuration(
                "auto augment mmax must be positive".into(),
            ));
        }
        if !(0.0..=magnitude_max).contains(&magnitude) {
            return Err(Error::Configuration(format!(
                "auto augment magnitude must be in range [0, {}]",
                magnitude_max
            )));
        }
        if magnitude_std.is_nan() || magnitude_std < 0.0 {
            return Err(Error::Configuration(
                "auto augment mstd must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&prob) {
            return Err(Error::Configuration(
                "auto augment probability must be in range [0, 1]".into(),
            ));
        }

        Ok(RandAugment {
            magnitude,
            num_layers,
            magnitude_std,
            magnitude_max,
            increasing,
            prob,
            fill: Rgb(fill),
        })
    }
}

/// Apply randomly chosen operations of random magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct RandAugment {
    magnitude: f64,
    num_layers: usize,
    magnitude_std: f64,
    magnitude_max: f64,
    increasing: bool,
    prob: f64,
    fill: Rgb<u8>,
}

impl RandAugment {
    fn sample_magnitude(&self, rng: &mut dyn RngCore) -> f64 {
        let magnitude = if self.magnitude_std.is_infinite() {
            rng.gen_range(0.0..=self.magnitude)
        } else if self.magnitude_std > 0.0 {
            let noise: f64 = rng.sample(StandardNormal);
            self.magnitude + noise * self.magnitude_std
        } else {
            self.magnitude
        };
        magnitude.clamp(0.0, self.magnitude_max)
    }

    /// Apply a single operation at the level in `[0, 1]`.
    ///
    /// Levels outside the range, reached when `mmax` exceeds 10, are clamped.
    pub fn apply_op(
        &self,
        op: AugmentOp,
        image: RgbImage,
        level: f64,
        rng: &mut dyn RngCore,
    ) -> RgbImage {
        let level = level.clamp(0.0, 1.0);
        let mut signed = |value: f64| if rng.gen::<bool>() { -value } else { value };
        let enhance = |level: f64, sign: f64| {
            if self.increasing {
                1.0 + sign * level * 0.9
            } else {
                level * 1.8 + 0.1
            }
        };

        match op {
            AugmentOp::AutoContrast => auto_contrast(image),
            AugmentOp::Equalize => equalize(image),
            AugmentOp::Invert => map_values(image, |value| 255 - value),
            AugmentOp::Rotate => {
                let degrees = signed(level * 30.0);
                rotate(&image, degrees, self.fill)
            }
            AugmentOp::Posterize => {
                let bits = (level * 4.0) as u32;
                let bits = if self.increasing { 4 - bits } else { bits };
                posterize(image, bits)
            }
            AugmentOp::Solarize => {
                let threshold = (level * 256.0) as u16;
                let threshold = if self.increasing {
                    256 - threshold
                } else {
                    threshold
                };
                map_values(image, |value| {
                    if value as u16 >= threshold {
                        255 - value
                    } else {
                        value
                    }
                })
            }
            AugmentOp::SolarizeAdd => {
                let add = (level * 110.0) as u8;
                map_values(image, |value| {
                    if value < 128 {
                        value.saturating_add(add)
                    } else {
                        value
                    }
                })
            }
            AugmentOp::Color => {
                let factor = enhance(level, signed(1.0)) as f32;
                let mut image = image;
                blend_with(&mut image, factor, |rgb| [luma(rgb); 3]);
                image
            }
            AugmentOp::Contrast => {
                let factor = enhance(level, signed(1.0)) as f32;
                let mut image = image;
                let mean = mean_luma(&image);
                blend_with(&mut image, factor, |_| [mean; 3]);
                image
            }
            AugmentOp::Brightness => {
                let factor = enhance(level, signed(1.0)) as f32;
                let mut image = image;
                blend_with(&mut image, factor, |_| [0.0; 3]);
                image
            }
            AugmentOp::Sharpness => {
                let factor = enhance(level, signed(1.0)) as f32;
                sharpness(image, factor)
            }
            AugmentOp::ShearX => {
                let shear = signed(level * 0.3);
                affine(&image, [1.0, shear, 0.0, 0.0, 1.0, 0.0], self.fill)
            }
            AugmentOp::ShearY => {
                let shear = signed(level * 0.3);
                affine(&image, [1.0, 0.0, 0.0, shear, 1.0, 0.0], self.fill)
            }
            AugmentOp::TranslateX => {
                let pixels = signed(level * 0.45) * image.width() as f64;
                affine(&image, [1.0, 0.0, pixels, 0.0, 1.0, 0.0], self.fill)
            }
            AugmentOp::TranslateY => {
                let pixels = signed(level * 0.45) * image.height() as f64;
                affine(&image, [1.0, 0.0, 0.0, 0.0, 1.0, pixels], self.fill)
            }
        }
    }
}

impl ImageOp for RandAugment {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        (0..self.num_layers).fold(image, |image, _| {
            let op = RAND_AUGMENT_OPS[rng.gen_range(0..RAND_AUGMENT_OPS.len())];
            if self.prob < 1.0 && rng.gen::<f64>() > self.prob {
                return image;
            }
            let level = self.sample_magnitude(rng) / LEVEL_DENOM;
            self.apply_op(op, image, level, rng)
        })
    }
}

fn map_values<F>(mut image: RgbImage, f: F) -> RgbImage
where
    F: Fn(u8) -> u8,
{
    image
        .pixels_mut()
        .for_each(|pixel| pixel.0 = pixel.0.map(&f));
    image
}

fn posterize(image: RgbImage, bits: u32) -> RgbImage {
    if bits >= 8 {
        return image;
    }
    let mask = !((1u16 << (8 - bits)) - 1) as u8;
    map_values(image, |value| value & mask)
}

/// Stretch each channel to cover the full value range.
fn auto_contrast(mut image: RgbImage) -> RgbImage {
    for c in 0..3 {
        let (lo, hi) = image
            .pixels()
            .map(|pixel| pixel[c])
            .minmax()
            .into_option()
            .unwrap_or((0, 255));
        if hi <= lo {
            continue;
        }
        let scale = 255.0 / (hi - lo) as f32;
        image.pixels_mut().for_each(|pixel| {
            pixel[c] = ((pixel[c] - lo) as f32 * scale).round().min(255.0) as u8;
        });
    }
    image
}

/// Histogram equalization per channel.
fn equalize(mut image: RgbImage) -> RgbImage {
    for c in 0..3 {
        let mut histogram = [0usize; 256];
        image.pixels().for_each(|pixel| histogram[pixel[c] as usize] += 1);

        let nonzero: Vec<_> = histogram.iter().copied().filter(|&n| n > 0).collect();
        let last = match nonzero.last() {
            Some(&last) if nonzero.len() > 1 => last,
            _ => continue,
        };
        let step = (nonzero.iter().sum::<usize>() - last) / 255;
        if step == 0 {
            continue;
        }

        let mut lut = [0u8; 256];
        let mut n = step / 2;
        for (value, count) in histogram.iter().enumerate() {
            lut[value] = (n / step).min(255) as u8;
            n += count;
        }
        image
            .pixels_mut()
            .for_each(|pixel| pixel[c] = lut[pixel[c] as usize]);
    }
    image
}

/// Blend with a smoothed copy; borders keep their original pixels.
fn sharpness(image: RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return image;
    }

    let kernel = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0].map(|w: f32| w / 13.0);
    let smooth: RgbImage = imageops::filter3x3(&image, &kernel);

    RgbImage::from_fn(width, height, |x, y| {
        let pixel = *image.get_pixel(x, y);
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            return pixel;
        }
        let degenerate = smooth.get_pixel(x, y);
        let mut blended = [0u8; 3];
        for c in 0..3 {
            let value =
                factor * pixel[c] as f32 + (1.0 - factor) * degenerate[c] as f32;
            blended[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(blended)
    })
}

/// Rotate counter-clockwise around the image center.
fn rotate(image: &RgbImage, degrees: f64, fill: Rgb<u8>) -> RgbImage {
    let (width, height) = image.dimensions();
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let (sin, cos) = (-degrees.to_radians()).sin_cos();

    let a = cos;
    let b = sin;
    let d = -sin;
    let e = cos;
    let c = cx - a * cx - b * cy;
    let f = cy - d * cx - e * cy;
    affine(image, [a, b, c, d, e, f], fill)
}

/// Resample with the inverse affine map `(x, y) -> (ax + by + c, dx + ey + f)`
/// using the nearest source pixel.
fn affine(image: &RgbImage, matrix: [f64; 6], fill: Rgb<u8>) -> RgbImage {
    let (width, height) = image.dimensions();
    let [a, b, c, d, e, f] = matrix;

    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as f64 + 0.5, y as f64 + 0.5);
        let src_x = (a * x + b * y + c).floor();
        let src_y = (d * x + e * y + f).floor();

        if (0.0..width as f64).contains(&src_x) && (0.0..height as f64).contains(&src_y) {
            *image.get_pixel(src_x as u32, src_y as u32)
        } else {
            fill
        }
    })
}
