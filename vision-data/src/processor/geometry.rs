//! Resizing, cropping and flipping on decoded images.

use super::*;
use crate::common::*;

/// The resampling filter used by resizing steps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
    /// Pick bilinear or bicubic per image.
    Random,
}

impl Interpolation {
    pub fn filter(self, rng: &mut dyn RngCore) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
            Self::Random => {
                if rng.gen::<bool>() {
                    FilterType::Triangle
                } else {
                    FilterType::CatmullRom
                }
            }
        }
    }
}

impl Default for Interpolation {
    fn default() -> Self {
        Self::Bilinear
    }
}

/// The output size of [Resize].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeTarget {
    /// Warp to the exact size regardless of the aspect ratio.
    Exact { height: u32, width: u32 },
    /// Scale the shorter side to the size and keep the aspect ratio.
    ShorterSide(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resize {
    pub target: ResizeTarget,
    pub interpolation: Interpolation,
}

impl Resize {
    pub fn exact(height: u32, width: u32, interpolation: Interpolation) -> Self {
        Self {
            target: ResizeTarget::Exact { height, width },
            interpolation,
        }
    }

    pub fn shorter_side(size: u32, interpolation: Interpolation) -> Self {
        Self {
            target: ResizeTarget::ShorterSide(size),
            interpolation,
        }
    }

    /// Compute the `(width, height)` of the output image.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.target {
            ResizeTarget::Exact { height, width } => (width, height),
            ResizeTarget::ShorterSide(size) => {
                let scale = |long: u32, short: u32| {
                    ((size as u64 * long as u64 / short.max(1) as u64) as u32).max(1)
                };
                if width <= height {
                    (size, scale(height, width))
                } else {
                    (scale(width, height), size)
                }
            }
        }
    }
}

impl ImageOp for Resize {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = self.output_size(width, height);
        if (new_width, new_height) == (width, height) {
            return image;
        }
        imageops::resize(
            &image,
            new_width,
            new_height,
            self.interpolation.filter(rng),
        )
    }
}

/// Crop the square center region, padding with zeros if the image is smaller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CenterCrop {
    pub size: u32,
}

impl CenterCrop {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl ImageOp for CenterCrop {
    fn apply(&self, image: RgbImage, _rng: &mut dyn RngCore) -> RgbImage {
        let size = self.size;
        let (width, height) = image.dimensions();

        let image = if width < size || height < size {
            let pad_w = size.saturating_sub(width);
            let pad_h = size.saturating_sub(height);
            pad(&image, pad_w / 2, pad_h / 2, (pad_w + 1) / 2, (pad_h + 1) / 2)
        } else {
            image
        };

        let (width, height) = image.dimensions();
        let left = ((width - size) as f64 / 2.0).round() as u32;
        let top = ((height - size) as f64 / 2.0).round() as u32;
        imageops::crop_imm(&image, left, top, size, size).to_image()
    }
}

/// Crop a random square region after padding each border.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomCrop {
    pub size: u32,
    pub padding: u32,
}

impl RandomCrop {
    pub fn new(size: u32, padding: u32) -> Self {
        Self { size, padding }
    }
}

impl ImageOp for RandomCrop {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        let Self { size, padding } = *self;
        let (width, height) = image.dimensions();

        let extra_w = (size).saturating_sub(width + padding * 2);
        let extra_h = (size).saturating_sub(height + padding * 2);
        let image = if padding > 0 || extra_w > 0 || extra_h > 0 {
            pad(
                &image,
                padding,
                padding,
                padding + extra_w,
                padding + extra_h,
            )
        } else {
            image
        };

        let (width, height) = image.dimensions();
        let left = rng.gen_range(0..=(width - size));
        let top = rng.gen_range(0..=(height - size));
        imageops::crop_imm(&image, left, top, size, size).to_image()
    }
}

/// Mirror the image left to right with a probability.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomHorizontalFlip {
    prob: f64,
}

impl RandomHorizontalFlip {
    pub fn new(prob: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(Error::Configuration(format!(
                "flip probability must be in range [0, 1], but get {}",
                prob
            )));
        }
        Ok(Self { prob })
    }
}

impl ImageOp for RandomHorizontalFlip {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen_bool(self.prob) {
            imageops::flip_horizontal(&image)
        } else {
            image
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomResizedCropInit {
    pub size: u32,
    /// The range of the cropped area relative to the image area.
    pub scale: (f64, f64),
    /// The range of the cropped aspect ratio.
    pub ratio: (f64, f64),
    pub interpolation: Interpolation,
}

impl RandomResizedCropInit {
    pub fn build(self) -> Result<RandomResizedCrop> {
        let Self {
            size,
            scale,
            ratio,
            interpolation,
        } = self;

        let ensure = |cond: bool, msg: &str| -> Result<()> {
            if cond {
                Ok(())
            } else {
                Err(Error::Configuration(msg.to_owned()))
            }
        };
        ensure(size > 0, "crop size must be positive")?;
        ensure(
            scale.0 > 0.0 && scale.0 <= scale.1,
            "crop scale must satisfy 0 < min <= max",
        )?;
        ensure(
            ratio.0 > 0.0 && ratio.0 <= ratio.1,
            "crop ratio must satisfy 0 < min <= max",
        )?;

        Ok(RandomResizedCrop {
            size,
            scale,
            log_ratio: (ratio.0.ln(), ratio.1.ln()),
            interpolation,
        })
    }
}

impl Default for RandomResizedCropInit {
    fn default() -> Self {
        Self {
            size: 224,
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
            interpolation: Interpolation::default(),
        }
    }
}

/// Crop a region of random area and aspect ratio, then resize it to a square.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomResizedCrop {
    size: u32,
    scale: (f64, f64),
    log_ratio: (f64, f64),
    interpolation: Interpolation,
}

impl RandomResizedCrop {
    /// Sample the `(left, top, width, height)` crop region.
    pub fn sample_region(&self, width: u32, height: u32, rng: &mut dyn RngCore) -> [u32; 4] {
        let area = (width * height) as f64;

        for _ in 0..10 {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            let aspect = rng.gen_range(self.log_ratio.0..=self.log_ratio.1).exp();
            let crop_w = (target_area * aspect).sqrt().round() as u32;
            let crop_h = (target_area / aspect).sqrt().round() as u32;

            if 0 < crop_w && crop_w <= width && 0 < crop_h && crop_h <= height {
                let left = rng.gen_range(0..=(width - crop_w));
                let top = rng.gen_range(0..=(height - crop_h));
                return [left, top, crop_w, crop_h];
            }
        }

        // fall back to the central crop
        let in_ratio = width as f64 / height as f64;
        let (min_ratio, max_ratio) = (self.log_ratio.0.exp(), self.log_ratio.1.exp());
        let (crop_w, crop_h) = if in_ratio < min_ratio {
            (width, ((width as f64 / min_ratio).round() as u32).clamp(1, height))
        } else if in_ratio > max_ratio {
            (((height as f64 * max_ratio).round() as u32).clamp(1, width), height)
        } else {
            (width, height)
        };
        [(width - crop_w) / 2, (height - crop_h) / 2, crop_w, crop_h]
    }
}

impl ImageOp for RandomResizedCrop {
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        let (width, height) = image.dimensions();
        let [left, top, crop_w, crop_h] = self.sample_region(width, height, rng);
        let cropped = imageops::crop_imm(&image, left, top, crop_w, crop_h).to_image();
        imageops::resize(
            &cropped,
            self.size,
            self.size,
            self.interpolation.filter(rng),
        )
    }
}

/// Pad the image borders with zeros.
pub fn pad(image: &RgbImage, left: u32, top: u32, right: u32, bottom: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(width + left + right, height + top + bottom);
    imageops::replace(&mut canvas, image, left as i64, top as i64);
    canvas
}
