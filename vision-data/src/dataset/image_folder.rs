//! The dataset of images sorted into one directory per class.

use super::*;
use crate::{
    common::*,
    processor::{to_tensor, Transform},
};

/// File extensions recognized as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// The dataset laid out as `root/<class_name>/**/<image>`.
///
/// Class indices follow the sorted order of class directory names.
#[derive(Debug)]
pub struct ImageFolderDataset {
    root: PathBuf,
    classes: IndexSet<String>,
    samples: Vec<(PathBuf, usize)>,
    transform: Option<Transform>,
}

impl ImageFolderDataset {
    pub fn open(root: impl AsRef<Path>, transform: Option<Transform>) -> Result<Self> {
        let root = root.as_ref();

        let class_dirs: Vec<(String, PathBuf)> = fs::read_dir(root)
            .map_err(|err| Error::io(root, err))?
            .map(|entry| -> Result<_> {
                let path = entry.map_err(|err| Error::io(root, err))?.path();
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.to_owned());
                Ok(name.filter(|_| path.is_dir()).map(|name| (name, path)))
            })
            .filter_map(|result| result.transpose())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .collect();

        if class_dirs.is_empty() {
            return Err(Error::Configuration(format!(
                "no class directories found in '{}'",
                root.display()
            )));
        }

        let samples: Vec<(PathBuf, usize)> = class_dirs
            .iter()
            .enumerate()
            .map(|(class_index, (name, dir))| {
                let mut files = vec![];
                collect_images(dir, &mut files)?;

                if files.is_empty() {
                    return Err(Error::Configuration(format!(
                        "no image files found for class '{}' in '{}'",
                        name,
                        dir.display()
                    )));
                }

                files.sort();
                Ok(files.into_iter().map(move |file| (file, class_index)))
            })
            .flatten_ok()
            .collect::<Result<_>>()?;

        let classes: IndexSet<String> = class_dirs.into_iter().map(|(name, _)| name).collect();

        debug!(
            "found {} images in {} classes under '{}'",
            samples.len(),
            classes.len(),
            root.display()
        );

        Ok(Self {
            root: root.to_owned(),
            classes,
            samples,
            transform,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The class names in index order.
    pub fn classes(&self) -> &IndexSet<String> {
        &self.classes
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<(RgbImage, usize)> {
        let (path, class) = self.samples.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })?;
        let image = image::open(path).map_err(|source| Error::Decode {
            location: path.display().to_string(),
            source,
        })?;
        Ok((image.to_rgb8(), *class))
    }
}

fn collect_images(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|err| Error::io(dir, err))? {
        let path = entry.map_err(|err| Error::io(dir, err))?.path();

        if path.is_dir() {
            collect_images(&path, files)?;
        } else if is_image_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

impl GenericDataset for ImageFolderDataset {
    fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

impl RandomAccessDataset for ImageFolderDataset {
    fn num_records(&self) -> usize {
        self.samples.len()
    }

    fn nth(&mut self, index: usize) -> Result<DataRecord> {
        let (image, class) = self.get(index)?;
        let image = match &self.transform {
            Some(transform) => transform.forward(image),
            None => to_tensor(&image),
        };
        Ok(DataRecord {
            image,
            target: class as i64,
        })
    }

    fn filename(&self, index: usize) -> Option<String> {
        let (path, _) = self.samples.get(index)?;
        Some(path.display().to_string())
    }
}
