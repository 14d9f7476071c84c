//! The CIFAR-100 dataset in its binary version.
//!
//! The files can be downloaded from <https://www.cs.toronto.edu/~kriz/cifar.html>.

use super::*;
use crate::{
    common::*,
    processor::{to_tensor, Transform},
};

const WIDTH: usize = 32;
const HEIGHT: usize = 32;
const CHANNELS: usize = 3;
const PIXEL_BYTES: usize = WIDTH * HEIGHT * CHANNELS;
/// The coarse label, the fine label and the planar pixels.
const RECORD_BYTES: usize = 2 + PIXEL_BYTES;

pub const CIFAR100_NUM_CLASSES: usize = 100;

/// The CIFAR-100 dataset loaded into memory.
#[derive(Debug)]
pub struct Cifar100Dataset {
    path: PathBuf,
    data: Vec<u8>,
    transform: Option<Transform>,
}

impl Cifar100Dataset {
    /// Load `train.bin` or `test.bin` from the directory.
    ///
    /// The `cifar-100-binary` directory extracted from the archive is
    /// also accepted inside `dir`.
    pub fn open(dir: impl AsRef<Path>, train: bool, transform: Option<Transform>) -> Result<Self> {
        let dir = dir.as_ref();
        let file_name = if train { "train.bin" } else { "test.bin" };

        let path = [dir.join(file_name), dir.join("cifar-100-binary").join(file_name)]
            .into_iter()
            .find(|path| path.is_file())
            .unwrap_or_else(|| dir.join(file_name));
        let data = fs::read(&path).map_err(|err| Error::io(&path, err))?;

        if data.len() % RECORD_BYTES != 0 {
            return Err(Error::malformed(
                &path,
                format!(
                    "the file size {} is not a multiple of the record size {}",
                    data.len(),
                    RECORD_BYTES
                ),
            ));
        }

        let dataset = Self {
            path,
            data,
            transform,
        };

        if let Some(label) = (0..dataset.len())
            .map(|index| dataset.record(index)[1])
            .find(|&label| label as usize >= CIFAR100_NUM_CLASSES)
        {
            return Err(Error::malformed(
                &dataset.path,
                format!("fine label {} is out of range", label),
            ));
        }

        debug!(
            "loaded {} CIFAR-100 records from '{}'",
            dataset.len(),
            dataset.path.display()
        );

        Ok(dataset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len() / RECORD_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn record(&self, index: usize) -> &[u8] {
        let offset = index * RECORD_BYTES;
        &self.data[offset..(offset + RECORD_BYTES)]
    }

    /// The decoded image and the fine label at the index.
    pub fn get(&self, index: usize) -> Result<(RgbImage, usize)> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }

        let record = self.record(index);
        let fine_label = record[1] as usize;
        let pixels = &record[2..];

        let image = RgbImage::from_fn(WIDTH as u32, HEIGHT as u32, |x, y| {
            let offset = y as usize * WIDTH + x as usize;
            let [r, g, b] = [0, 1, 2].map(|c| pixels[c * WIDTH * HEIGHT + offset]);
            Rgb([r, g, b])
        });

        Ok((image, fine_label))
    }

    /// The coarse label at the index.
    pub fn coarse_label(&self, index: usize) -> Result<usize> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(self.record(index)[0] as usize)
    }
}

impl GenericDataset for Cifar100Dataset {
    fn num_classes(&self) -> usize {
        CIFAR100_NUM_CLASSES
    }
}

impl RandomAccessDataset for Cifar100Dataset {
    fn num_records(&self) -> usize {
        self.len()
    }

    fn nth(&mut self, index: usize) -> Result<DataRecord> {
        let (image, label) = self.get(index)?;
        let image = match &self.transform {
            Some(transform) => transform.forward(image),
            None => to_tensor(&image),
        };
        Ok(DataRecord {
            image,
            target: label as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(coarse: u8, fine: u8, red: u8) -> Vec<u8> {
        let mut bytes = vec![coarse, fine];
        bytes.extend(std::iter::repeat(red).take(WIDTH * HEIGHT));
        bytes.extend(std::iter::repeat(0).take(WIDTH * HEIGHT));
        bytes.extend(std::iter::repeat(255).take(WIDTH * HEIGHT));
        bytes
    }

    #[test]
    fn cifar100_test() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = [record(1, 7, 10), record(2, 42, 20)].concat();
        fs::write(dir.path().join("test.bin"), &data).unwrap();

        let mut dataset = Cifar100Dataset::open(dir.path(), false, None).unwrap();
        assert_eq!(dataset.num_records(), 2);
        assert_eq!(dataset.num_classes(), 100);
        assert_eq!(dataset.coarse_label(1).unwrap(), 2);

        let (image, label) = dataset.get(1).unwrap();
        assert_eq!(label, 42);
        assert_eq!(image.dimensions(), (32, 32));
        assert_eq!(image.get_pixel(5, 9), &Rgb([20, 0, 255]));

        let record = dataset.nth(0).unwrap();
        assert_eq!(record.target, 7);
        assert_eq!(record.image.shape(), &[3, 32, 32]);
        assert!(matches!(
            dataset.nth(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));

        assert!(matches!(
            Cifar100Dataset::open(dir.path(), true, None),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn cifar100_archive_dir_test() {
        let dir = tempfile::tempdir().unwrap();
        let sub_dir = dir.path().join("cifar-100-binary");
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("train.bin"), record(0, 99, 0)).unwrap();

        let dataset = Cifar100Dataset::open(dir.path(), true, None).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn cifar100_malformed_test() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("train.bin"), [0u8; 100]).unwrap();
        assert!(matches!(
            Cifar100Dataset::open(dir.path(), true, None),
            Err(Error::Malformed { .. })
        ));

        fs::write(dir.path().join("train.bin"), record(0, 100, 0)).unwrap();
        assert!(matches!(
            Cifar100Dataset::open(dir.path(), true, None),
            Err(Error::Malformed { .. })
        ));
    }
}
