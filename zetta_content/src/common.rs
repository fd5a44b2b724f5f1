use std::{
    io,
    path::{Path, PathBuf},
    result,
    time::SystemTime,
};

use zetta_shared::{
    rand::{distributions::Alphanumeric, thread_rng, Rng},
    thiserror,
};

use crate::content_tools::TextureImportError;

/// Extension of the files written by the pipeline.
pub const ASSET_FILE_EXTENSION: &str = "asset";

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
    #[error("Invalid extension '{0}' in path {1}")]
    InvalidExtension(String, PathBuf),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid asset data in '{path}': {reason}")]
    InvalidAssetData { path: PathBuf, reason: String },
    #[error("Texture import failed: {0}")]
    TextureImport(TextureImportError),
    #[error("Geometry import failed: {0}")]
    GeometryImport(String),
    #[error("Array size {0} is not a multiple of 6 but the texture is a cube map")]
    InvalidCubeMapArraySize(u32),
    #[error("Not supported: {0}")]
    NotSupported(&'static str),
    #[error("Failed to start directory watcher in directory: {0}")]
    FailedToStartDirectoryWatcher(PathBuf),
    #[error("Failed to start thread pool")]
    FailedToStartThreadPool,
    #[error("Other: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a decoding failure of the file at `path`.
    pub(crate) fn invalid_data(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::InvalidAssetData {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` when the error means that the file doesn't exist as opposed to being unreadable or corrupt.
    pub fn is_missing_file(&self) -> bool {
        match self {
            Error::FileNotFound(_) => true,
            Error::IoError(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub(crate) fn extract_extension_from_path(path: &Path) -> Result<String> {
    Ok(path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_lowercase())
        .ok_or(Error::InvalidPath(path.to_owned()))?
        .to_owned())
}

pub(crate) fn extract_file_stem_from_path(path: &Path) -> Result<String> {
    Ok(path
        .file_stem()
        .and_then(|file_stem| file_stem.to_str())
        .ok_or(Error::InvalidPath(path.to_owned()))?
        .to_owned())
}

pub(crate) fn modified_system_time(path: &Path) -> Option<SystemTime> {
    path.metadata().ok().and_then(|metadata| metadata.modified().ok())
}

/// Returns whether the path has the extension of asset files.
pub fn is_asset_file(path: &Path) -> bool {
    extract_extension_from_path(path).is_ok_and(|extension| extension == ASSET_FILE_EXTENSION)
}

const INVALID_PATH_CHARS: &[char] = &['"', '<', '>', '|'];
const INVALID_FILE_NAME_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

fn replace_chars(value: &str, invalid: &[char]) -> String {
    value
        .chars()
        .map(|c| if c.is_control() || invalid.contains(&c) { '_' } else { c })
        .collect()
}

/// Replaces the characters that are not allowed in paths with `_`. The directory and the file name
/// are sanitized separately because file names forbid more characters.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use zetta_content::sanitize_file_name;
/// let sanitized = sanitize_file_name(Path::new("content/mesh|lod?.asset"));
/// assert_eq!(sanitized, Path::new("content/mesh_lod_.asset"));
/// ```
pub fn sanitize_file_name(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|file_name| replace_chars(&file_name.to_string_lossy(), INVALID_FILE_NAME_CHARS))
        .unwrap_or_default();
    match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => PathBuf::from(replace_chars(&parent.to_string_lossy(), INVALID_PATH_CHARS)).join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Returns a random string of lowercase ascii letters and digits.
pub fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Returns whether `time` lies before `other`.
pub fn is_older(time: SystemTime, other: SystemTime) -> bool {
    time < other
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn sanitize_only_file_name_chars() {
        let sanitized = sanitize_file_name(Path::new("a:b/c:d*e.asset"));
        assert_eq!(sanitized, PathBuf::from("a:b").join("c_d_e.asset"));
    }

    #[test]
    fn sanitize_without_parent() {
        assert_eq!(sanitize_file_name(Path::new("x?y")), PathBuf::from("x_y"));
    }

    #[test]
    fn sanitize_control_chars() {
        let sanitized = sanitize_file_name(Path::new("dir\u{1}/na\tme"));
        assert_eq!(sanitized, PathBuf::from("dir_").join("na_me"));
    }

    #[test]
    fn random_string_is_lowercase_alphanumeric() {
        let value = random_string(8);
        assert_eq!(value.len(), 8);
        assert!(value.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn older() {
        let now = SystemTime::now();
        assert!(is_older(now, now + Duration::from_secs(1)));
        assert!(!is_older(now, now));
    }

    #[test]
    fn asset_file_detection() {
        assert!(is_asset_file(Path::new("content/cube.asset")));
        assert!(is_asset_file(Path::new("content/cube.ASSET")));
        assert!(!is_asset_file(Path::new("content/cube.asset.tmp")));
        assert!(!is_asset_file(Path::new("content")));
    }

    #[test]
    fn missing_file_error() {
        assert!(Error::FileNotFound(PathBuf::from("a")).is_missing_file());
        assert!(Error::IoError(io::Error::from(io::ErrorKind::NotFound)).is_missing_file());
        assert!(!Error::invalid_data("a", "bad magic").is_missing_file());
    }
}
