use crate::common::*;

/// The manifest entry of a remote-backed sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestRecord {
    /// The path relative to the dataset root.
    pub path: String,
    /// The raw class token.
    pub label: String,
}

impl FromStr for ManifestRecord {
    type Err = String;

    /// Parse a `<path> <label>` line.
    ///
    /// The line is split on single spaces and must contain exactly two
    /// fields, so paths containing spaces cannot be expressed.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<_> = line.split(' ').collect();

        match fields.as_slice() {
            [path, label] if !path.is_empty() && !label.is_empty() => Ok(Self {
                path: (*path).to_owned(),
                label: (*label).to_owned(),
            }),
            _ => Err(format!(
                "expect '<path> <label>', but get {} space-separated fields in '{}'",
                fields.len(),
                line
            )),
        }
    }
}

/// The record with image pixels and its target.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub image: Tensor,
    /// The class index, or -1 if the sample is unlabeled.
    pub target: i64,
}
