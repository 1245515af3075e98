//! Sub-layer data download.
//!
//! Each sub-layer's SQL is augmented with the geometry filter and sent to the
//! owning layer's SQL API, which answers with GeoJSON. The body is streamed
//! into a `.part` file that is renamed into place only once the download has
//! completed, so a failed fetch never leaves a truncated `layer.geojson`.

use crate::error::SublayerError;
use crate::models::{Layer, Sublayer, SublayerTarget, VisualizationDocument};
use crate::sql_augmenter::SqlAugmenter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Response format requested from the SQL API.
pub const SQL_API_FORMAT: &str = "GeoJSON";

/// Produces one file per sub-layer.
#[async_trait]
pub trait SublayerFetcher: Send + Sync {
    /// Write the file for `target` and return its path.
    async fn fetch(
        &self,
        document: &VisualizationDocument,
        target: &SublayerTarget,
    ) -> Result<PathBuf, SublayerError>;

    /// The path `fetch` writes for `target`.
    fn output_path(&self, target: &SublayerTarget) -> PathBuf;

    /// Whether `sublayer` has anything for this fetcher to write. Sub-layers
    /// it declines are skipped rather than reported as failures.
    fn accepts(&self, _sublayer: &Sublayer) -> bool {
        true
    }
}

/// Downloads sub-layer data from the SQL API.
#[derive(Clone)]
pub struct HttpSublayerFetcher {
    client: reqwest::Client,
    augmenter: SqlAugmenter,
}

impl HttpSublayerFetcher {
    pub fn new(client: reqwest::Client, augmenter: SqlAugmenter) -> Self {
        Self { client, augmenter }
    }

    /// `<sql api url>?format=GeoJSON&q=<augmented sql>`
    pub fn query_url(&self, layer: &Layer, sublayer: &Sublayer) -> Result<Url, SublayerError> {
        let endpoint = layer.group_options.sql_api_url()?;
        let sql = sublayer
            .options
            .sql
            .as_deref()
            .ok_or(SublayerError::MissingSql)?;
        let augmented = self.augmenter.augment(sql)?;

        let mut url = Url::parse(&endpoint)
            .map_err(|e| SublayerError::InvalidLayer(format!("SQL API url '{}': {}", endpoint, e)))?;
        url.query_pairs_mut()
            .append_pair("format", SQL_API_FORMAT)
            .append_pair("q", &augmented);
        Ok(url)
    }
}

#[async_trait]
impl SublayerFetcher for HttpSublayerFetcher {
    async fn fetch(
        &self,
        document: &VisualizationDocument,
        target: &SublayerTarget,
    ) -> Result<PathBuf, SublayerError> {
        let (layer, sublayer) = resolve(document, target)?;
        let url = self.query_url(layer, sublayer)?;
        let dest = self.output_path(target);

        tokio::fs::create_dir_all(&target.dir)
            .await
            .map_err(|e| SublayerError::filesystem(&target.dir, e))?;

        debug!(
            "[SublayerFetcher] Requesting layer {} sublayer {}: {}",
            target.layer_index, target.sublayer_index, url
        );
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut endpoint = url;
            endpoint.set_query(None);
            return Err(SublayerError::Status {
                url: endpoint.to_string(),
                status,
            });
        }

        let written = stream_to_file(response, &dest).await?;
        info!(
            "[SublayerFetcher] Saved layer {} sublayer {} ({} bytes) to {}",
            target.layer_index,
            target.sublayer_index,
            written,
            dest.display()
        );
        Ok(dest)
    }

    fn output_path(&self, target: &SublayerTarget) -> PathBuf {
        target.data_path()
    }
}

/// Look up the layer and sub-layer a target points at.
pub(crate) fn resolve<'a>(
    document: &'a VisualizationDocument,
    target: &SublayerTarget,
) -> Result<(&'a Layer, &'a Sublayer), SublayerError> {
    let layer = document.layer(target.layer_index).ok_or_else(|| {
        SublayerError::InvalidLayer(format!("no layer at index {}", target.layer_index))
    })?;
    let sublayer = layer.sublayers.get(target.sublayer_index).ok_or_else(|| {
        SublayerError::InvalidLayer(format!(
            "layer {} has no sublayer at index {}",
            target.layer_index, target.sublayer_index
        ))
    })?;
    Ok((layer, sublayer))
}

/// `layer.geojson` -> `layer.geojson.part`
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn stream_to_file(
    mut response: reqwest::Response,
    dest: &Path,
) -> Result<u64, SublayerError> {
    let part = part_path(dest);
    let total = response.content_length();

    let result = async {
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| SublayerError::filesystem(&part, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| SublayerError::filesystem(&part, e))?;
            written += chunk.len() as u64;
            debug!(
                "[SublayerFetcher] {}: {} of {:?} bytes",
                dest.display(),
                written,
                total
            );
        }
        file.flush()
            .await
            .map_err(|e| SublayerError::filesystem(&part, e))?;
        Ok::<u64, SublayerError>(written)
    }
    .await;

    finish_part(&part, dest, result).await
}

/// Write `bytes` to `dest` through a `.part` file.
pub(crate) async fn write_file_atomically(dest: &Path, bytes: &[u8]) -> Result<u64, SublayerError> {
    let part = part_path(dest);
    let result = tokio::fs::write(&part, bytes)
        .await
        .map(|_| bytes.len() as u64)
        .map_err(|e| SublayerError::filesystem(&part, e));
    finish_part(&part, dest, result).await
}

/// Rename a completed `.part` file into place, or remove it on failure.
async fn finish_part(
    part: &Path,
    dest: &Path,
    result: Result<u64, SublayerError>,
) -> Result<u64, SublayerError> {
    let outcome = match result {
        Ok(written) => tokio::fs::rename(part, dest)
            .await
            .map(|_| written)
            .map_err(|e| SublayerError::filesystem(dest, e)),
        Err(e) => Err(e),
    };

    if outcome.is_err() {
        let _ = tokio::fs::remove_file(part).await;
    }
    outcome
}
