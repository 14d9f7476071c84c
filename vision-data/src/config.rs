//! Dataset and preprocessing configuration format.

use crate::{
    common::*,
    dataset::DEFAULT_MAX_RETRIES,
    processor::{EraseMode, Interpolation},
    storage::BackendConfig,
};

pub use dataset::*;
pub use transform::*;

/// The main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let config = json5::from_str(&text).map_err(|err| Error::malformed(path, err))?;
        Ok(config)
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The dataset configuration.
        pub kind: DatasetKind,
    }

    /// Variants of dataset and options.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum DatasetKind {
        /// CIFAR-100 in the binary version.
        Cifar { data_path: PathBuf },
        /// ImageNet-1k laid out as `train/` and `val/` image folders.
        Imnet { data_path: PathBuf },
        /// Generic image folders for training and evaluation.
        ImageFolder {
            data_path: PathBuf,
            eval_data_path: PathBuf,
            nb_classes: NonZeroUsize,
        },
        /// ImageNet-22k on a remote object store.
        Ceph22k {
            /// The storage root that manifest paths are joined onto.
            data_path: String,
            /// The directory containing `class_to_idx.json` and `label.txt`.
            annotation_root: PathBuf,
            #[serde(default)]
            backend: BackendConfig,
            #[serde(default = "default_max_retries")]
            max_retries: usize,
        },
    }

    impl DatasetKind {
        pub fn name(&self) -> &'static str {
            match self {
                Self::Cifar { .. } => "Cifar",
                Self::Imnet { .. } => "Imnet",
                Self::ImageFolder { .. } => "ImageFolder",
                Self::Ceph22k { .. } => "Ceph22k",
            }
        }
    }

    fn default_max_retries() -> usize {
        DEFAULT_MAX_RETRIES
    }
}

mod transform {
    use super::*;

    /// Data preprocessing options.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TransformConfig {
        /// The image size fed to the model.
        #[serde(default = "default_input_size")]
        pub input_size: usize,
        /// The color jitter strength, used when `auto_augment` is not set.
        #[serde(default = "default_color_jitter")]
        pub color_jitter: Option<R64>,
        /// The RandAugment policy, e.g. `rand-m9-mstd0.5-inc1`.
        #[serde(default = "default_auto_augment")]
        pub auto_augment: Option<String>,
        #[serde(default = "default_train_interpolation")]
        pub train_interpolation: Interpolation,
        /// The random erasing probability.
        #[serde(default = "default_reprob")]
        pub reprob: R64,
        #[serde(default)]
        pub remode: EraseMode,
        #[serde(default = "default_recount")]
        pub recount: usize,
        /// The center crop ratio on evaluation. Defaults to 224/256.
        pub crop_pct: Option<R64>,
        /// Normalize with the ImageNet mean and std rather than 0.5.
        #[serde(default = "default_true")]
        pub imagenet_default_mean_and_std: bool,
    }

    impl Default for TransformConfig {
        fn default() -> Self {
            Self {
                input_size: default_input_size(),
                color_jitter: default_color_jitter(),
                auto_augment: default_auto_augment(),
                train_interpolation: default_train_interpolation(),
                reprob: default_reprob(),
                remode: EraseMode::default(),
                recount: default_recount(),
                crop_pct: None,
                imagenet_default_mean_and_std: true,
            }
        }
    }

    fn default_input_size() -> usize {
        224
    }

    fn default_color_jitter() -> Option<R64> {
        Some(r64(0.4))
    }

    fn default_auto_augment() -> Option<String> {
        Some("rand-m9-mstd0.5-inc1".into())
    }

    fn default_train_interpolation() -> Interpolation {
        Interpolation::Bicubic
    }

    fn default_reprob() -> R64 {
        r64(0.25)
    }

    fn default_recount() -> usize {
        1
    }

    fn default_true() -> bool {
        true
    }
}
