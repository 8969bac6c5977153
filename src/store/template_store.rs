use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use super::StoreError;
use crate::utils::file::file_get;
use crate::utils::http::{CancelFlag, Fetcher};
use crate::utils::url::is_link;

/// Base template loader
pub trait TemplateStore: Send + Sync {
    /// Load the text behind a template reference (local path or http(s) URL)
    fn load(&self, reference: &str) -> Result<String, StoreError>;
}

/// Loads templates from disk, or through a [`Fetcher`] for remote references
pub struct FileTemplateStore {
    base_dir: Option<PathBuf>,
    fetcher: Arc<dyn Fetcher>,
}

impl FileTemplateStore {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        FileTemplateStore {
            base_dir: None,
            fetcher,
        }
    }

    /// Resolve relative paths against `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl TemplateStore for FileTemplateStore {
    fn load(&self, reference: &str) -> Result<String, StoreError> {
        let reference = reference.trim();
        if is_link(reference) {
            debug!("Loading remote template {}", reference);
            return self
                .fetcher
                .fetch(reference, &CancelFlag::new())
                .map(|response| response.body)
                .map_err(|source| StoreError::Fetch {
                    url: reference.to_string(),
                    source,
                });
        }

        let path = self.resolve(reference);
        let path_str = path.to_string_lossy().into_owned();
        debug!("Loading template file {}", path_str);
        file_get(&path_str).map_err(|source| StoreError::Io {
            path: path_str,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::{FetchError, FetchResponse};
    use std::io::Write;

    struct StaticFetcher;

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str, _cancel: &CancelFlag) -> Result<FetchResponse, FetchError> {
            if url.ends_with("/ok.yaml") {
                Ok(FetchResponse {
                    body: "rules: []\n".to_string(),
                    ..Default::default()
                })
            } else {
                Err(FetchError::Status(404))
            }
        }
    }

    #[test]
    fn test_load_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("base.yaml")).unwrap();
        writeln!(file, "mode: rule").unwrap();

        let store = FileTemplateStore::new(Arc::new(StaticFetcher)).with_base_dir(dir.path());
        assert_eq!(store.load("base.yaml").unwrap(), "mode: rule\n");
        assert!(matches!(
            store.load("missing.yaml"),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn test_load_remote() {
        let store = FileTemplateStore::new(Arc::new(StaticFetcher));
        assert_eq!(store.load("https://example.com/ok.yaml").unwrap(), "rules: []\n");
        assert!(matches!(
            store.load("https://example.com/gone.yaml"),
            Err(StoreError::Fetch {
                source: FetchError::Status(404),
                ..
            })
        ));
    }
}
