pub use crate::error::{Error, Result};
pub use derivative::Derivative;
pub use image::{
    imageops::{self, FilterType},
    DynamicImage, ImageError, Rgb, RgbImage,
};
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::{iproduct, Itertools as _};
pub use ndarray::{s, Array3, ArrayViewMut2, Axis};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, RngCore};
pub use rand_distr::Normal;
pub use serde::{Deserialize, Deserializer, Serialize, Serializer};
pub use std::{
    borrow::Cow,
    fmt::{self, Debug, Display},
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
pub use strum::{AsRefStr, EnumString};
pub use tracing::{debug, info, warn};

/// The image tensor in channel-height-width layout.
pub type Tensor = Array3<f32>;
