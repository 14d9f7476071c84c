//! The image dataset backed by a remote object store.

use super::*;
use crate::{
    common::*,
    processor::{to_tensor, Transform},
    storage::{BackendConfig, Connector, FileClient, StorageBackend},
};

/// The default number of consecutive fetch failures tolerated by a parser.
pub const DEFAULT_MAX_RETRIES: usize = 50;

/// The class map file in the annotation directory.
pub const CLASS_MAP_FILE: &str = "class_to_idx.json";

/// The sample list file in the annotation directory.
pub const LABEL_FILE: &str = "label.txt";

/// Maps dataset indices to decoded images and class indices.
pub trait Parser
where
    Self: Debug + Send,
{
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn num_classes(&self) -> usize;

    /// Load the image and the class index at the index.
    ///
    /// The class index is `None` if the sample is unlabeled.
    fn get_sample(&mut self, index: usize) -> Result<(RgbImage, Option<usize>)>;

    /// The storage location of the sample at the index.
    fn location(&self, index: usize) -> Result<String>;

    /// The file name of the sample at the index.
    ///
    /// If `basename` is set, only the last path segment is returned.
    /// Locations are always qualified by the dataset root, so the
    /// `absolute` flag does not change the result.
    fn filename(&self, index: usize, basename: bool, _absolute: bool) -> Result<String> {
        let location = self.location(index)?;
        let filename = if basename {
            utils::basename(&location).to_owned()
        } else {
            location
        };
        Ok(filename)
    }

    /// The file names of all samples in index order.
    fn filenames(&self, basename: bool, absolute: bool) -> Result<Vec<String>> {
        (0..self.len())
            .map(|index| self.filename(index, basename, absolute))
            .collect()
    }
}

/// The parser that fetches image bytes through a storage client.
///
/// The storage client is opened on the first access rather than on
/// construction, so that a configured parser can be cloned into data loading
/// workers before any connection exists. A clone never shares the client.
///
/// When an image cannot be fetched or decoded, the parser logs a warning and
/// moves on to the next index, wrapping around at the end of the dataset.
/// After `max_retries` consecutive failures the last error is returned. The
/// returned sample may therefore belong to a later index than the requested
/// one.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CephImageParser {
    root: String,
    class_to_idx: Arc<IndexMap<String, usize>>,
    samples: Arc<Vec<ManifestRecord>>,
    backend: BackendConfig,
    #[derivative(Debug = "ignore")]
    connector: Connector,
    client: Option<Box<dyn StorageBackend>>,
    max_retries: usize,
    consecutive_errors: usize,
}

impl CephImageParser {
    /// Load the manifest files in `annotation_root`.
    ///
    /// A missing or malformed manifest file is a configuration error.
    ///
    /// * `root` - The storage root that sample paths are joined onto, e.g. `s3://imagenet22k`.
    /// * `annotation_root` - The directory containing `class_to_idx.json` and `label.txt`.
    /// * `backend` - The storage backend name and options.
    pub fn new(
        root: impl Into<String>,
        annotation_root: impl AsRef<Path>,
        backend: BackendConfig,
    ) -> Result<Self> {
        let annotation_root = annotation_root.as_ref();
        let invalid_annotation = |err: Error| {
            Error::Configuration(format!(
                "invalid annotation directory '{}': {}",
                annotation_root.display(),
                err
            ))
        };
        let class_to_idx =
            load_class_map(annotation_root.join(CLASS_MAP_FILE)).map_err(invalid_annotation)?;
        let samples = load_manifest(annotation_root.join(LABEL_FILE)).map_err(invalid_annotation)?;

        debug!(
            "loaded {} samples and {} classes from '{}'",
            samples.len(),
            class_to_idx.len(),
            annotation_root.display()
        );

        Ok(Self::from_manifest(root, class_to_idx, samples, backend))
    }

    /// Build a parser from manifest contents already in memory.
    pub fn from_manifest(
        root: impl Into<String>,
        class_to_idx: IndexMap<String, usize>,
        samples: Vec<ManifestRecord>,
        backend: BackendConfig,
    ) -> Self {
        Self {
            root: root.into(),
            class_to_idx: Arc::new(class_to_idx),
            samples: Arc::new(samples),
            backend,
            connector: FileClient::connector(),
            client: None,
            max_retries: DEFAULT_MAX_RETRIES,
            consecutive_errors: 0,
        }
    }

    /// Replace the function that opens the storage client.
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self.client = None;
        self
    }

    /// Set the number of consecutive failures after which an access fails.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn class_to_idx(&self) -> &IndexMap<String, usize> {
        &self.class_to_idx
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.samples
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// The number of failures since the last successful fetch.
    pub fn consecutive_errors(&self) -> usize {
        self.consecutive_errors
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Open the storage client unless it is already open.
    pub fn ensure_connected(&mut self) -> Result<()> {
        if self.client.is_none() {
            debug!("connecting to storage backend '{}'", self.backend.backend);
            let client = (self.connector)(&self.backend)?;
            self.client = Some(client);
        }
        Ok(())
    }

    /// Load the image and the class index at the index.
    pub fn get(&mut self, index: usize) -> Result<(RgbImage, usize)> {
        let len = self.samples.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        self.ensure_connected()?;

        let mut index = index;
        let (index, image) = loop {
            let location = join_location(&self.root, &self.samples[index].path);

            match self.fetch_image(&location) {
                Ok(image) => break (index, image),
                Err(err) => {
                    warn!(index, %location, "skipped sample: {}", err);
                    self.consecutive_errors += 1;

                    if self.consecutive_errors >= self.max_retries {
                        return Err(err);
                    }
                    index = (index + 1) % len;
                }
            }
        };
        self.consecutive_errors = 0;

        let label = &self.samples[index].label;
        let class = *self
            .class_to_idx
            .get(label)
            .ok_or_else(|| Error::UnknownLabel {
                label: label.clone(),
            })?;

        Ok((image, class))
    }

    fn fetch_image(&self, location: &str) -> Result<RgbImage> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Configuration("storage client is not connected".into()))?;
        let bytes = client.get(location).map_err(|source| Error::Fetch {
            location: location.to_owned(),
            source,
        })?;
        let image = image::load_from_memory(&bytes).map_err(|source| Error::Decode {
            location: location.to_owned(),
            source,
        })?;
        Ok(image.to_rgb8())
    }
}

impl Clone for CephImageParser {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            class_to_idx: self.class_to_idx.clone(),
            samples: self.samples.clone(),
            backend: self.backend.clone(),
            connector: self.connector.clone(),
            client: None,
            max_retries: self.max_retries,
            consecutive_errors: 0,
        }
    }
}

impl Parser for CephImageParser {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn num_classes(&self) -> usize {
        self.class_to_idx.len()
    }

    fn get_sample(&mut self, index: usize) -> Result<(RgbImage, Option<usize>)> {
        let (image, class) = self.get(index)?;
        Ok((image, Some(class)))
    }

    fn location(&self, index: usize) -> Result<String> {
        let record = self.samples.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })?;
        Ok(join_location(&self.root, &record.path))
    }
}

/// Maps a class index to the training target.
pub type TargetTransform = Box<dyn Fn(usize) -> i64 + Send + Sync>;

/// The dataset of remote-backed images.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImageCephDataset<P = CephImageParser>
where
    P: Parser,
{
    parser: P,
    transform: Option<Transform>,
    #[derivative(Debug = "ignore")]
    target_transform: Option<TargetTransform>,
}

impl ImageCephDataset<CephImageParser> {
    /// Open the dataset with a [CephImageParser] on the manifest in `annotation_root`.
    pub fn open(
        root: impl Into<String>,
        annotation_root: impl AsRef<Path>,
        backend: BackendConfig,
        transform: Option<Transform>,
    ) -> Result<Self> {
        let parser = CephImageParser::new(root, annotation_root, backend)?;
        Ok(Self::with_parser(parser, transform))
    }
}

impl<P> ImageCephDataset<P>
where
    P: Parser,
{
    pub fn with_parser(parser: P, transform: Option<Transform>) -> Self {
        Self {
            parser,
            transform,
            target_transform: None,
        }
    }

    pub fn with_target_transform<F>(mut self, target_transform: F) -> Self
    where
        F: 'static + Fn(usize) -> i64 + Send + Sync,
    {
        self.target_transform = Some(Box::new(target_transform));
        self
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut P {
        &mut self.parser
    }

    pub fn len(&self) -> usize {
        self.parser.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parser.is_empty()
    }

    /// Load the preprocessed image and its target at the index.
    ///
    /// Unlabeled samples get the target -1.
    pub fn get(&mut self, index: usize) -> Result<DataRecord> {
        let (image, class) = self.parser.get_sample(index)?;

        let image = match &self.transform {
            Some(transform) => transform.forward(image),
            None => to_tensor(&image),
        };
        let target = match (class, &self.target_transform) {
            (None, _) => -1,
            (Some(class), Some(target_transform)) => target_transform(class),
            (Some(class), None) => class as i64,
        };

        Ok(DataRecord { image, target })
    }

    pub fn filename(&self, index: usize, basename: bool, absolute: bool) -> Result<String> {
        self.parser.filename(index, basename, absolute)
    }

    pub fn filenames(&self, basename: bool, absolute: bool) -> Result<Vec<String>> {
        self.parser.filenames(basename, absolute)
    }
}

impl<P> GenericDataset for ImageCephDataset<P>
where
    P: Parser,
{
    fn num_classes(&self) -> usize {
        self.parser.num_classes()
    }
}

impl<P> RandomAccessDataset for ImageCephDataset<P>
where
    P: Parser,
{
    fn num_records(&self) -> usize {
        self.parser.len()
    }

    fn nth(&mut self, index: usize) -> Result<DataRecord> {
        self.get(index)
    }

    fn filename(&self, index: usize) -> Option<String> {
        self.parser.filename(index, false, false).ok()
    }
}
