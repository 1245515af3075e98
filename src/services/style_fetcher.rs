//! Sub-layer style export.

use crate::error::SublayerError;
use crate::export::StyleExporter;
use crate::models::{Sublayer, SublayerTarget, VisualizationDocument};
use crate::services::sublayer_fetcher::{SublayerFetcher, resolve, write_file_atomically};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Writes `style.json` next to each sub-layer's data file.
#[derive(Clone, Default)]
pub struct StyleFetcher;

impl StyleFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SublayerFetcher for StyleFetcher {
    async fn fetch(
        &self,
        document: &VisualizationDocument,
        target: &SublayerTarget,
    ) -> Result<PathBuf, SublayerError> {
        let (_, sublayer) = resolve(document, target)?;
        let cartocss = sublayer
            .options
            .cartocss
            .as_deref()
            .ok_or(SublayerError::MissingStyle)?;

        let style = StyleExporter::export(cartocss, sublayer.options.cartocss_version.as_deref());
        let bytes = serde_json::to_vec_pretty(&style)
            .map_err(|e| SublayerError::filesystem(target.style_path(), std::io::Error::other(e)))?;

        tokio::fs::create_dir_all(&target.dir)
            .await
            .map_err(|e| SublayerError::filesystem(&target.dir, e))?;

        let dest = self.output_path(target);
        write_file_atomically(&dest, &bytes).await?;
        info!(
            "[StyleFetcher] Saved style for layer {} sublayer {} to {}",
            target.layer_index,
            target.sublayer_index,
            dest.display()
        );
        Ok(dest)
    }

    fn output_path(&self, target: &SublayerTarget) -> PathBuf {
        target.style_path()
    }

    fn accepts(&self, sublayer: &Sublayer) -> bool {
        sublayer.options.cartocss.is_some()
    }
}
