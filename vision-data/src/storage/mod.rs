//! Storage clients that fetch raw sample bytes.

mod disk;

pub use disk::*;

use crate::common::*;
use serde_json::{Map, Value};

/// The byte-fetching backend behind a storage client.
pub trait StorageBackend
where
    Self: Debug + Send,
{
    /// Fetch the bytes stored at the location.
    fn get(&self, location: &str) -> anyhow::Result<Vec<u8>>;
}

/// Builds a storage backend from its configuration.
pub type Connector = Arc<dyn Fn(&BackendConfig) -> Result<Box<dyn StorageBackend>> + Send + Sync>;

/// The backend name and the options passed through to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub backend: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl BackendConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DiskBackend::NAME)
    }
}

/// The registry of storage backends shipped with the crate.
#[derive(Debug, Clone, Copy)]
pub struct FileClient;

impl FileClient {
    /// Open a backend by its configured name.
    pub fn connect(config: &BackendConfig) -> Result<Box<dyn StorageBackend>> {
        let BackendConfig { backend, options } = config;

        let client: Box<dyn StorageBackend> = match backend.as_str() {
            DiskBackend::NAME => Box::new(DiskBackend::from_options(options)?),
            other => {
                return Err(Error::Configuration(format!(
                    "unsupported storage backend '{}'",
                    other
                )))
            }
        };

        Ok(client)
    }

    /// The connector that opens backends through [FileClient::connect].
    pub fn connector() -> Connector {
        Arc::new(Self::connect)
    }
}
