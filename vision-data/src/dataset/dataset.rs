use super::*;
use crate::common::*;

/// The generic dataset trait.
pub trait GenericDataset
where
    Self: Debug + Send,
{
    /// The number of color channels of the dataset.
    fn input_channels(&self) -> usize {
        3
    }

    /// The number of classes of the dataset.
    fn num_classes(&self) -> usize;
}

/// The dataset that can be random accessed.
pub trait RandomAccessDataset
where
    Self: GenericDataset,
{
    /// Get number of records in the dataset.
    fn num_records(&self) -> usize;

    /// Get the nth record in the dataset.
    fn nth(&mut self, index: usize) -> Result<DataRecord>;

    /// Get the file name of the nth record if the dataset is backed by files.
    fn filename(&self, index: usize) -> Option<String> {
        let _ = index;
        None
    }
}
