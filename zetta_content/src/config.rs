use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use zetta_shared::log::info;

use crate::{Error, Result};

/// Name of the configuration file that is looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "content.yaml";

/// Configuration of the content pipeline of a project.
///
/// # Example
///
/// ```rust
/// use zetta_content::config::ContentConfig;
/// let config: ContentConfig = serde_yaml::from_str("content_path: project/content").unwrap();
/// assert_eq!(config.temp_path(), std::path::Path::new("project/.temp"));
/// assert_eq!(config.import_threads, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Root folder of all assets of the project.
    pub content_path: PathBuf,
    /// Scratch folder for imports. Defaults to `.temp` next to the content folder.
    #[serde(default)]
    pub temp_path: Option<PathBuf>,
    /// Number of files that are imported in parallel.
    #[serde(default = "default_import_threads")]
    pub import_threads: usize,
    /// Time in milliseconds that the registry waits for file system events to settle.
    #[serde(default = "default_registry_debounce_ms")]
    pub registry_debounce_ms: u64,
}

fn default_import_threads() -> usize {
    4
}

fn default_registry_debounce_ms() -> u64 {
    250
}

impl ContentConfig {
    /// Creates a configuration with default values for the given content folder.
    pub fn new(content_path: impl Into<PathBuf>) -> Self {
        Self {
            content_path: content_path.into(),
            temp_path: None,
            import_threads: default_import_threads(),
            registry_debounce_ms: default_registry_debounce_ms(),
        }
    }

    /// Reads the configuration from a YAML file. Relative paths are resolved against the
    /// directory of the file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_owned()));
        }
        let content = fs::read_to_string(path)?;
        let mut config: ContentConfig = serde_yaml::from_str(&content).map_err(|err| Error::Other(Box::new(err)))?;
        if let Some(base) = path.parent() {
            config.content_path = base.join(&config.content_path);
            config.temp_path = config.temp_path.map(|temp_path| base.join(temp_path));
        }
        info!("Read content configuration from '{}': {config:?}", path.display());
        Ok(config)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.temp_path.clone().unwrap_or_else(|| {
            self.content_path
                .parent()
                .map(|parent| parent.join(".temp"))
                .unwrap_or_else(|| PathBuf::from(".temp"))
        })
    }

    pub fn registry_debounce(&self) -> Duration {
        Duration::from_millis(self.registry_debounce_ms)
    }

    /// Creates the content and the temp folder if they don't exist.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.content_path)?;
        fs::create_dir_all(self.temp_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;
    use zetta_shared::indoc::indoc;

    use super::*;

    #[test]
    fn defaults() {
        let config = ContentConfig::new("game/content");
        assert_eq!(config.temp_path(), PathBuf::from("game/.temp"));
        assert_eq!(config.registry_debounce(), Duration::from_millis(250));
        assert_eq!(config.import_threads, 4);
    }

    #[test]
    fn from_yaml_file() {
        // Given
        let root = TempDir::new("config").unwrap();
        let path = root.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            indoc! {"
                content_path: content
                temp_path: scratch
                import_threads: 2
                registry_debounce_ms: 100
            "},
        )
        .unwrap();

        // When
        let config = ContentConfig::from_yaml_file(&path).unwrap();

        // Then
        assert_eq!(config.content_path, root.path().join("content"));
        assert_eq!(config.temp_path(), root.path().join("scratch"));
        assert_eq!(config.import_threads, 2);
        assert_eq!(config.registry_debounce_ms, 100);
    }

    #[test]
    fn ensure_directories() {
        let root = TempDir::new("config").unwrap();
        let config = ContentConfig::new(root.path().join("project").join("content"));
        config.ensure_directories().unwrap();
        assert!(root.path().join("project").join("content").is_dir());
        assert!(root.path().join("project").join(".temp").is_dir());
    }

    #[test]
    fn missing_file() {
        let root = TempDir::new("config").unwrap();
        let result = ContentConfig::from_yaml_file(root.path().join(CONFIG_FILE_NAME));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn invalid_yaml() {
        let root = TempDir::new("config").unwrap();
        let path = root.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "import_threads: [").unwrap();
        assert!(matches!(ContentConfig::from_yaml_file(&path), Err(Error::Other(_))));
    }
}
