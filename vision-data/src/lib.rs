//! Dataset construction and image preprocessing for vision model training.

pub mod builder;
mod common;
pub mod config;
pub mod dataset;
pub mod error;
pub mod processor;
pub mod storage;

pub use builder::{build_dataset, build_dataset_with_transform, build_transform};
pub use error::{Error, Result};
