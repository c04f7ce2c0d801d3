//! Batch configuration, loaded from YAML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Overwrite records that already exist instead of reusing them.
    pub update_existing: bool,

    /// Only accept a dependency whose publication date matches exactly.
    pub exact_match_only: bool,

    /// Per-namespace fetch timeout.
    pub fetch_timeout_ms: u64,

    /// Namespace named in exported schema documents. Defaults to the
    /// exported namespace itself.
    pub export_namespace: Option<String>,

    /// Index of the namespace to export among the batch's resolved
    /// namespaces (0 = first supplied document).
    pub primary_namespace_index: usize,

    /// Directory of nodeset files the CLI fetches dependencies from.
    pub library_dir: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            update_existing: false,
            exact_match_only: false,
            fetch_timeout_ms: 30_000,
            export_namespace: None,
            primary_namespace_index: 0,
            library_dir: None,
        }
    }
}

impl BatchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ModelError::Parse(format!("YAML error: {}", e)))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = BatchConfig::from_yaml(
            r#"
update_existing: true
fetch_timeout_ms: 500
library_dir: ./nodesets
"#,
        )
        .unwrap();
        assert!(config.update_existing);
        assert!(!config.exact_match_only);
        assert_eq!(config.fetch_timeout(), Duration::from_millis(500));
        assert_eq!(config.library_dir, Some(PathBuf::from("./nodesets")));
        assert_eq!(config.primary_namespace_index, 0);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(BatchConfig::from_yaml("{}").unwrap(), BatchConfig::default());
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        let err = BatchConfig::from_yaml("fetch_timeout_ms: soon").unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }
}
