//! Namespace library backed by a directory of nodeset files.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use nodeset_lite_core::resolver::{select_version, NamespaceFetcher, NamespaceRecord};
use nodeset_lite_core::{ModelError, Result};

/// Serves every `*.xml` file in one directory. The directory is rescanned
/// on each fetch; files that do not parse are skipped.
pub struct DirectoryFetcher {
    dir: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn scan(dir: &Path, uri: &str) -> Result<Vec<Arc<NamespaceRecord>>> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ModelError::Parse(format!("{}: {}", dir.display(), e)))?;
        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("xml") {
                continue;
            }
            let record = std::fs::read_to_string(&path)
                .map_err(|e| ModelError::Parse(e.to_string()))
                .and_then(|xml| NamespaceRecord::from_xml(&xml));
            match record {
                Ok(r) if r.uri == uri => {
                    debug!(path = %path.display(), version = ?r.version, "library candidate");
                    records.push(Arc::new(r));
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping library file"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl NamespaceFetcher for DirectoryFetcher {
    async fn resolve(
        &self,
        uri: &str,
        publication_date: Option<DateTime<Utc>>,
        exact_match_only: bool,
    ) -> Result<Option<NamespaceRecord>> {
        let dir = self.dir.clone();
        let target = uri.to_string();
        let candidates = tokio::task::spawn_blocking(move || Self::scan(&dir, &target))
            .await
            .map_err(|e| ModelError::Store(format!("library scan: {}", e)))??;
        Ok(select_version(&candidates, publication_date, exact_match_only)
            .map(|(record, _)| NamespaceRecord::clone(&record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, uri: &str, version: &str, published: &str) {
        let xml = format!(
            r#"<UANodeSet><Models><Model ModelUri="{uri}" Version="{version}" PublicationDate="{published}" /></Models></UANodeSet>"#
        );
        std::fs::write(dir.join(name), xml).unwrap();
    }

    fn date(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn picks_earliest_version_not_older_than_requested() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a-1.0.xml", "urn:a", "1.0", "2020-01-01T00:00:00Z");
        write(dir.path(), "a-1.1.xml", "urn:a", "1.1", "2021-06-01T00:00:00Z");
        write(dir.path(), "b.xml", "urn:b", "1.0", "2020-01-01T00:00:00Z");
        std::fs::write(dir.path().join("broken.xml"), "<UANodeSet>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let fetcher = DirectoryFetcher::new(dir.path());
        let found = fetcher
            .resolve("urn:a", Some(date("2021-01-01T00:00:00Z")), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.version.as_deref(), Some("1.1"));

        let exact = fetcher
            .resolve("urn:a", Some(date("2021-01-01T00:00:00Z")), true)
            .await
            .unwrap();
        assert!(exact.is_none());

        assert!(fetcher.resolve("urn:c", None, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path().join("absent"));
        assert!(fetcher.resolve("urn:a", None, false).await.is_err());
    }
}
