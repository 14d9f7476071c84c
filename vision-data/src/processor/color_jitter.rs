//! The random color distortion algorithm.

use super::*;
use crate::common::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorJitterInit {
    pub brightness: Option<R64>,
    pub contrast: Option<R64>,
    pub saturation: Option<R64>,
}

impl ColorJitterInit {
    /// Jitter brightness, contrast and saturation by the same strength.
    pub fn uniform(strength: R64) -> Self {
        Self {
            brightness: Some(strength),
            contrast: Some(strength),
            saturation: Some(strength),
        }
    }

    pub fn build(self) -> Result<ColorJitter> {
        let Self {
            brightness,
            contrast,
            saturation,
        } = self;

        let to_range = |name: &str, strength: Option<R64>| -> Result<_> {
            strength
                .filter(|strength| *strength != 0.0)
                .map(|strength| {
                    if strength < 0.0 {
                        return Err(Error::Configuration(format!(
                            "{} jitter must be non-negative",
                            name
                        )));
                    }
                    let strength = strength.raw() as f32;
                    Ok(((1.0 - strength).max(0.0), 1.0 + strength))
                })
                .transpose()
        };

        Ok(ColorJitter {
            brightness: to_range("brightness", brightness)?,
            contrast: to_range("contrast", contrast)?,
            saturation: to_range("saturation", saturation)?,
        })
    }
}

/// Scale brightness, contrast and saturation by random factors in random order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorJitter {
    brightness: Option<(f32, f32)>,
    contrast: Option<(f32, f32)>,
    saturation: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Copy)]
enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
}

impl ColorJitter {
    fn adjust(image: &mut RgbImage, adjustment: Adjustment, factor: f32) {
        match adjustment {
            Adjustment::Brightness => blend_with(image, factor, |_| [0.0; 3]),
            Adjustment::Contrast => {
                let mean = mean_luma(image);
                blend_with(image, factor, |_| [mean; 3]);
            }
            Adjustment::Saturation => blend_with(image, factor, |rgb| [luma(rgb); 3]),
        }
    }
}

impl ImageOp for ColorJitter {
    fn apply(&self, mut image: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        let mut adjustments = [
            (Adjustment::Brightness, self.brightness),
            (Adjustment::Contrast, self.contrast),
            (Adjustment::Saturation, self.saturation),
        ];
        adjustments.shuffle(rng);

        for (adjustment, range) in adjustments {
            if let Some((lower, upper)) = range {
                let factor = rng.gen_range(lower..=upper);
                Self::adjust(&mut image, adjustment, factor);
            }
        }

        image
    }
}

/// The ITU-R 601-2 luma of a pixel.
pub(crate) fn luma(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

pub(crate) fn mean_luma(image: &RgbImage) -> f32 {
    let count = (image.width() * image.height()).max(1) as f32;
    let sum: f32 = image
        .pixels()
        .map(|pixel| luma(pixel.0.map(|value| value as f32)))
        .sum();
    sum / count
}

/// Blend each pixel with a degenerate counterpart: `factor * pixel + (1 - factor) * other`.
pub(crate) fn blend_with<F>(image: &mut RgbImage, factor: f32, degenerate: F)
where
    F: Fn([f32; 3]) -> [f32; 3],
{
    image.pixels_mut().for_each(|pixel| {
        let rgb = pixel.0.map(|value| value as f32);
        let other = degenerate(rgb);
        let mut blended = [0u8; 3];
        for c in 0..3 {
            let value = factor * rgb[c] + (1.0 - factor) * other[c];
            blended[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        pixel.0 = blended;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_jitter_test() {
        let jitter = ColorJitterInit::uniform(r64(0.4)).build().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let image = RgbImage::from_pixel(4, 4, Rgb([100, 150, 200]));
        let output = jitter.apply(image, &mut rng);
        assert_eq!(output.dimensions(), (4, 4));

        let identity = ColorJitterInit::uniform(r64(0.0)).build().unwrap();
        let image = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        assert_eq!(identity.apply(image.clone(), &mut rng), image);

        assert!(ColorJitterInit::uniform(r64(-0.1)).build().is_err());
    }

    #[test]
    fn saturation_test() {
        let mut image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        ColorJitter::adjust(&mut image, Adjustment::Saturation, 0.0);
        let value = image.get_pixel(0, 0).0;
        assert_eq!(value[0], value[1]);
        assert_eq!(value[1], value[2]);
        assert_eq!(value[0], 76);
    }
}
