//! Dataset processing toolkit.

mod ceph;
mod cifar;
mod dataset;
mod image_folder;
mod record;
mod utils;

pub use ceph::*;
pub use cifar::*;
pub use dataset::*;
pub use image_folder::*;
pub use record::*;
pub use utils::*;
