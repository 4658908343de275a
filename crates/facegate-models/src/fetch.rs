use std::fs;
use std::io::Read;
use std::path::PathBuf;

use thiserror::Error;

use crate::ModelSource;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to download {url}: {message}")]
    Http { url: String, message: String },
}

/// Retrieves one file, relative to a model source. Blocking.
pub trait Fetch: Send + Sync {
    fn fetch(&self, source: &ModelSource, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Reads local directories from disk and remote mirrors over HTTPS.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl Fetch for HttpFetcher {
    fn fetch(&self, source: &ModelSource, path: &str) -> Result<Vec<u8>, FetchError> {
        match source {
            ModelSource::Local(dir) => {
                let path = dir.join(path);
                fs::read(&path).map_err(|source| FetchError::Io { path, source })
            }
            ModelSource::Remote(base) => {
                let url = format!("{}/{}", base.trim_end_matches('/'), path);
                tracing::debug!(%url, "downloading");

                let resp = ureq::get(&url).call().map_err(|e| FetchError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

                let mut body = Vec::new();
                resp.into_body()
                    .into_reader()
                    .read_to_end(&mut body)
                    .map_err(|e| FetchError::Http {
                        url,
                        message: e.to_string(),
                    })?;
                Ok(body)
            }
        }
    }
}
