use super::*;
use crate::common::*;

/// Load the `class_to_idx.json` file that maps label tokens to class indices.
pub fn load_class_map(path: impl AsRef<Path>) -> Result<IndexMap<String, usize>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let class_to_idx: IndexMap<String, usize> =
        serde_json::from_str(&text).map_err(|err| Error::malformed(path, err))?;
    Ok(class_to_idx)
}

/// Load the `label.txt` file listing one `<path> <label>` record per line.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<ManifestRecord>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let records = text
        .lines()
        .enumerate()
        .map(|(lineno, line)| {
            line.parse::<ManifestRecord>().map_err(|reason| {
                Error::malformed(path, format!("line {}: {}", lineno + 1, reason))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(records)
}

/// Join a relative sample path onto a storage root.
///
/// The root may be a URI such as `s3://bucket/prefix`. An absolute path
/// replaces the root.
pub fn join_location(root: &str, path: &str) -> String {
    if path.starts_with('/') || root.is_empty() {
        path.to_owned()
    } else if root.ends_with('/') {
        format!("{}{}", root, path)
    } else {
        format!("{}/{}", root, path)
    }
}

/// The last segment of a location.
pub fn basename(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}
