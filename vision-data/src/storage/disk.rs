use super::*;
use anyhow::Context as _;

/// Reads objects from the local filesystem.
///
/// Relative locations are resolved against the optional `prefix` option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskBackend {
    prefix: Option<PathBuf>,
}

impl DiskBackend {
    pub const NAME: &'static str = "disk";

    pub fn new(prefix: Option<PathBuf>) -> Self {
        Self { prefix }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let mut prefix = None;

        for (key, value) in options {
            match key.as_str() {
                "prefix" => {
                    let value = value.as_str().ok_or_else(|| {
                        Error::Configuration(
                            "the 'prefix' option of disk backend must be a string".into(),
                        )
                    })?;
                    prefix = Some(PathBuf::from(value));
                }
                other => {
                    return Err(Error::Configuration(format!(
                        "unknown option '{}' for disk backend",
                        other
                    )))
                }
            }
        }

        Ok(Self { prefix })
    }

    pub fn resolve(&self, location: &str) -> PathBuf {
        match &self.prefix {
            Some(prefix) => prefix.join(location),
            None => PathBuf::from(location),
        }
    }
}

impl StorageBackend for DiskBackend {
    fn get(&self, location: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(location);
        let bytes =
            fs::read(&path).with_context(|| format!("unable to read '{}'", path.display()))?;
        Ok(bytes)
    }
}
