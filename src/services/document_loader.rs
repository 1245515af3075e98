//! Visualization document loading.
//!
//! Sources are resolved once into a [`DocumentSource`], so everything
//! downstream of the loader works with a parsed [`VisualizationDocument`].

use crate::error::DocumentLoadError;
use crate::models::VisualizationDocument;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// File name of the persisted document inside an export root.
pub const VIZ_FILE_NAME: &str = "viz.json";

#[derive(Debug, Clone)]
pub enum DocumentSource {
    Url(Url),
    Path(PathBuf),
    /// A document that was already loaded earlier in the same run
    Inline(VisualizationDocument),
}

impl DocumentSource {
    /// Interpret a CLI-style source string.
    ///
    /// `http(s)://` strings are URLs (public map pages are rewritten to their
    /// viz.json URL), anything else is a local path.
    pub fn parse(source: &str) -> Result<Self, DocumentLoadError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(DocumentLoadError::InvalidSource(
                "empty source".to_string(),
            ));
        }

        let lower = source.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let resolved = resolve_viz_url(source).unwrap_or_else(|| source.to_string());
            let url = Url::parse(&resolved)
                .map_err(|e| DocumentLoadError::InvalidSource(format!("{}: {}", source, e)))?;
            return Ok(DocumentSource::Url(url));
        }

        Ok(DocumentSource::Path(PathBuf::from(source)))
    }
}

impl From<VisualizationDocument> for DocumentSource {
    fn from(document: VisualizationDocument) -> Self {
        DocumentSource::Inline(document)
    }
}

/// Convert a public map page URL into the viz.json URL for that map.
///
/// `https://eric.cartodb.com/viz/<id>/public_map` becomes
/// `https://eric.cartodb.com/api/v2/viz/<id>/viz.json`. Returns `None` for
/// anything that is not a map page URL.
pub fn resolve_viz_url(url: &str) -> Option<String> {
    let map_re =
        Regex::new(r"^https?://([^./\s]+)\.cartodb\.com/viz/([^/\s]+)/(?:public_)?map").ok()?;
    let captures = map_re.captures(url)?;
    let user = captures.get(1)?.as_str();
    let map_id = captures.get(2)?.as_str();
    Some(format!(
        "https://{}.cartodb.com/api/v2/viz/{}/viz.json",
        user, map_id
    ))
}

/// Loads visualization documents from URLs or local files.
#[derive(Clone)]
pub struct DocumentLoader {
    client: reqwest::Client,
}

impl DocumentLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Load a document, writing a copy of its bytes to `persist_to` when given.
    ///
    /// Inline documents are returned as they are and never persisted.
    pub async fn load(
        &self,
        source: DocumentSource,
        persist_to: Option<&Path>,
    ) -> Result<VisualizationDocument, DocumentLoadError> {
        match source {
            DocumentSource::Inline(document) => Ok(document),
            DocumentSource::Url(url) => {
                let bytes = self.fetch(&url).await?;
                let document = VisualizationDocument::from_slice(&bytes)?;
                if let Some(dest) = persist_to {
                    persist(dest, &bytes).await?;
                }
                info!(
                    "[DocumentLoader] Loaded {} ({} layers)",
                    url,
                    document.layers().len()
                );
                Ok(document)
            }
            DocumentSource::Path(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        DocumentLoadError::NotFound(path.clone())
                    } else {
                        DocumentLoadError::Io {
                            path: path.clone(),
                            source: e,
                        }
                    }
                })?;
                let document = VisualizationDocument::from_slice(&bytes)?;
                if let Some(dest) = persist_to {
                    if !same_file(&path, dest).await {
                        persist(dest, &bytes).await?;
                    }
                }
                info!(
                    "[DocumentLoader] Loaded {} ({} layers)",
                    path.display(),
                    document.layers().len()
                );
                Ok(document)
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, DocumentLoadError> {
        let request_error = |source| DocumentLoadError::Request {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocumentLoadError::Status {
                url: url.to_string(),
                status,
            });
        }

        debug!(
            "[DocumentLoader] Downloading {} (content-length: {:?})",
            url,
            response.content_length()
        );
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

async fn persist(dest: &Path, bytes: &[u8]) -> Result<(), DocumentLoadError> {
    let io_error = |source| DocumentLoadError::Io {
        path: dest.to_path_buf(),
        source,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::write(dest, bytes).await.map_err(io_error)?;
    debug!("[DocumentLoader] Saved {}", dest.display());
    Ok(())
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
