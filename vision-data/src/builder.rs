//! Build datasets and preprocessing pipelines from configuration.

use crate::{
    common::*,
    config::{Config, DatasetKind, TransformConfig},
    dataset::{
        CephImageParser, Cifar100Dataset, ImageCephDataset, ImageFolderDataset,
        RandomAccessDataset, CIFAR100_NUM_CLASSES,
    },
    processor::{
        CenterCrop, ColorJitterInit, Interpolation, Normalize, RandAugmentInit, RandomCrop,
        RandomErasingInit, RandomHorizontalFlip, RandomResizedCropInit, Resize, Transform,
    },
};

pub const IMAGENET_DEFAULT_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_DEFAULT_STD: [f32; 3] = [0.229, 0.224, 0.225];
pub const IMAGENET_INCEPTION_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const IMAGENET_INCEPTION_STD: [f32; 3] = [0.5, 0.5, 0.5];

const IMNET_NUM_CLASSES: usize = 1000;
const DEFAULT_CROP_PCT: f64 = 224.0 / 256.0;

/// Build the dataset selected by the configuration.
///
/// It returns the dataset along with its number of classes.
pub fn build_dataset(
    is_train: bool,
    config: &Config,
) -> Result<(Box<dyn RandomAccessDataset>, usize)> {
    let transform = build_transform(is_train, &config.transform)?;
    build_dataset_with_transform(is_train, config, transform)
}

/// Build the selected dataset with a transform already built from the
/// configuration.
pub fn build_dataset_with_transform(
    is_train: bool,
    config: &Config,
    transform: Transform,
) -> Result<(Box<dyn RandomAccessDataset>, usize)> {
    info!("transform = \n{}", transform);

    let (dataset, num_classes): (Box<dyn RandomAccessDataset>, usize) =
        match &config.dataset.kind {
            DatasetKind::Cifar { data_path } => {
                let dataset = Cifar100Dataset::open(data_path, is_train, Some(transform))?;
                (Box::new(dataset), CIFAR100_NUM_CLASSES)
            }
            DatasetKind::Imnet { data_path } => {
                info!("reading from data path '{}'", data_path.display());
                let root = data_path.join(if is_train { "train" } else { "val" });
                let dataset = ImageFolderDataset::open(root, Some(transform))?;
                (Box::new(dataset), IMNET_NUM_CLASSES)
            }
            DatasetKind::ImageFolder {
                data_path,
                eval_data_path,
                nb_classes,
            } => {
                let root = if is_train { data_path } else { eval_data_path };
                let dataset = ImageFolderDataset::open(root, Some(transform))?;
                let nb_classes = nb_classes.get();

                if dataset.classes().len() != nb_classes {
                    return Err(Error::Configuration(format!(
                        "expect {} classes, but found {} class directories in '{}'",
                        nb_classes,
                        dataset.classes().len(),
                        root.display()
                    )));
                }
                (Box::new(dataset), nb_classes)
            }
            DatasetKind::Ceph22k {
                data_path,
                annotation_root,
                backend,
                max_retries,
            } => {
                let parser =
                    CephImageParser::new(data_path.as_str(), annotation_root, backend.clone())?
                        .with_max_retries(*max_retries);
                let num_classes = parser.class_to_idx().len();
                let dataset = ImageCephDataset::with_parser(parser, Some(transform));
                (Box::new(dataset), num_classes)
            }
        };

    info!("number of classes = {}", num_classes);

    Ok((dataset, num_classes))
}

/// Build the preprocessing pipeline for training or evaluation.
pub fn build_transform(is_train: bool, config: &TransformConfig) -> Result<Transform> {
    let TransformConfig {
        input_size,
        color_jitter,
        ref auto_augment,
        train_interpolation,
        reprob,
        remode,
        recount,
        crop_pct,
        imagenet_default_mean_and_std,
    } = *config;

    if input_size == 0 {
        return Err(Error::Configuration(
            "input_size must be positive".into(),
        ));
    }
    let size = input_size as u32;
    let resize_im = input_size > 32;
    let (mean, std) = if imagenet_default_mean_and_std {
        (IMAGENET_DEFAULT_MEAN, IMAGENET_DEFAULT_STD)
    } else {
        (IMAGENET_INCEPTION_MEAN, IMAGENET_INCEPTION_STD)
    };
    let normalize = Normalize::new(mean, std)?;

    if is_train {
        let mut transform = if resize_im {
            let crop = RandomResizedCropInit {
                size,
                interpolation: train_interpolation,
                ..Default::default()
            }
            .build()?;
            Transform::new().image_op(crop)
        } else {
            Transform::new().image_op(RandomCrop::new(size, 4))
        };
        transform = transform.image_op(RandomHorizontalFlip::new(0.5)?);

        match (auto_augment, color_jitter) {
            (Some(policy), _) => {
                let fill = mean.map(|value| (value * 255.0).round() as u8);
                let rand_augment = RandAugmentInit {
                    fill,
                    ..policy.parse::<RandAugmentInit>()?
                }
                .build()?;
                transform = transform.image_op(rand_augment);
            }
            (None, Some(strength)) if strength > 0.0 => {
                transform = transform.image_op(ColorJitterInit::uniform(strength).build()?);
            }
            (None, _) => {}
        }

        transform = transform.tensor_op(normalize);

        if reprob > 0.0 {
            let erasing = RandomErasingInit {
                prob: reprob,
                mode: remode,
                count: recount,
                ..Default::default()
            }
            .build()?;
            transform = transform.tensor_op(erasing);
        }

        return Ok(transform);
    }

    let mut transform = Transform::new();

    if resize_im {
        if input_size >= 384 {
            transform = transform.image_op(Resize::exact(size, size, Interpolation::Bicubic));
            info!("warping {} size input images", input_size);
        } else {
            let crop_pct = crop_pct.map(|pct| pct.raw()).unwrap_or(DEFAULT_CROP_PCT);
            if crop_pct <= 0.0 {
                return Err(Error::Configuration("crop_pct must be positive".into()));
            }
            let resize = (input_size as f64 / crop_pct) as u32;
            transform = transform
                .image_op(Resize::shorter_side(resize, Interpolation::Bicubic))
                .image_op(CenterCrop::new(size));
        }
    }

    Ok(transform.tensor_op(normalize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_transform_test() {
        let config = TransformConfig::default();
        let transform = build_transform(true, &config).unwrap();
        let steps = transform.steps();

        assert_eq!(steps.len(), 6);
        assert!(steps[0].starts_with("RandomResizedCrop"));
        assert!(steps[1].starts_with("RandomHorizontalFlip"));
        assert!(steps[2].starts_with("RandAugment"));
        assert_eq!(steps[3], "ToTensor");
        assert!(steps[4].starts_with("Normalize"));
        assert!(steps[5].starts_with("RandomErasing"));

        let mut rng = StdRng::seed_from_u64(1);
        let image = RgbImage::from_pixel(300, 250, Rgb([90, 120, 200]));
        let tensor = transform.forward_with_rng(image, &mut rng);
        assert_eq!(tensor.shape(), &[3, 224, 224]);
    }

    #[test]
    fn small_train_transform_test() {
        let config = TransformConfig {
            input_size: 32,
            auto_augment: None,
            reprob: r64(0.0),
            ..Default::default()
        };
        let transform = build_transform(true, &config).unwrap();
        let steps = transform.steps();

        assert_eq!(steps.len(), 5);
        assert!(steps[0].starts_with("RandomCrop"));
        assert!(steps[2].starts_with("ColorJitter"));

        let mut rng = StdRng::seed_from_u64(2);
        let tensor = transform.forward_with_rng(RgbImage::new(32, 32), &mut rng);
        assert_eq!(tensor.shape(), &[3, 32, 32]);
    }

    #[test]
    fn eval_transform_test() {
        let config = TransformConfig::default();
        let transform = build_transform(false, &config).unwrap();
        let steps = transform.steps();
        assert_eq!(steps.len(), 4);
        assert!(steps[0].contains("ShorterSide(256)"));
        assert!(steps[1].starts_with("CenterCrop"));

        let image = RgbImage::from_pixel(320, 280, Rgb([255, 255, 255]));
        let tensor = transform.forward(image);
        assert_eq!(tensor.shape(), &[3, 224, 224]);
        approx::assert_abs_diff_eq!(tensor[[0, 0, 0]], (1.0 - 0.485) / 0.229, epsilon = 1e-4);

        let config = TransformConfig {
            input_size: 384,
            imagenet_default_mean_and_std: false,
            ..Default::default()
        };
        let transform = build_transform(false, &config).unwrap();
        let steps = transform.steps();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].contains("Exact"));

        let tensor = transform.forward(RgbImage::from_pixel(500, 300, Rgb([0, 0, 0])));
        assert_eq!(tensor.shape(), &[3, 384, 384]);
        approx::assert_abs_diff_eq!(tensor[[2, 10, 10]], -1.0, epsilon = 1e-6);

        let config = TransformConfig {
            input_size: 32,
            ..Default::default()
        };
        let steps = build_transform(false, &config).unwrap().steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], "ToTensor");
    }

    #[test]
    fn invalid_transform_test() {
        let config = TransformConfig {
            auto_augment: Some("augmix-m5".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_transform(true, &config),
            Err(Error::Configuration(_))
        ));

        let config = TransformConfig {
            input_size: 0,
            ..Default::default()
        };
        assert!(build_transform(false, &config).is_err());
    }
}
