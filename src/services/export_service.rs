//! Export service coordinating a full visualization export.
//!
//! An export loads the document (persisting `viz.json`), then launches one
//! fetch per sub-layer and per configured fetcher. Fetches run concurrently
//! on the caller's task and never cancel each other; their outcomes are
//! collected into an [`ExportReport`].

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::models::{ExportReport, SublayerFailure, SublayerTarget, VisualizationDocument};
use crate::services::document_loader::{DocumentLoader, DocumentSource, VIZ_FILE_NAME};
use crate::services::layer_walker::sublayer_targets;
use crate::services::style_fetcher::StyleFetcher;
use crate::services::sublayer_fetcher::{HttpSublayerFetcher, SublayerFetcher};
use futures_util::future::join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Lifecycle of one export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    LoadingDocument,
    WalkingLayers,
    Complete,
    Failed,
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportPhase::Idle => "idle",
            ExportPhase::LoadingDocument => "loading document",
            ExportPhase::WalkingLayers => "walking layers",
            ExportPhase::Complete => "complete",
            ExportPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Service for exporting visualizations to a local directory tree.
pub struct ExportService {
    loader: DocumentLoader,
    fetchers: Vec<Arc<dyn SublayerFetcher>>,
    max_concurrency: usize,
}

impl ExportService {
    /// Build the HTTP-backed service described by `config`.
    pub fn new(config: &ExportConfig) -> Result<Self, ExportError> {
        let client = config.http_client().map_err(ExportError::HttpClient)?;

        let mut fetchers: Vec<Arc<dyn SublayerFetcher>> = vec![Arc::new(
            HttpSublayerFetcher::new(client.clone(), config.sql_augmenter()),
        )];
        if config.export_styles {
            fetchers.push(Arc::new(StyleFetcher::new()));
        }

        Ok(Self::with_fetchers(
            DocumentLoader::new(client),
            fetchers,
            config.max_concurrency,
        ))
    }

    /// Build a service from explicit parts. `max_concurrency == 0` means unbounded.
    pub fn with_fetchers(
        loader: DocumentLoader,
        fetchers: Vec<Arc<dyn SublayerFetcher>>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            loader,
            fetchers,
            max_concurrency,
        }
    }

    /// Export the visualization at `source` into `dest_root`.
    ///
    /// Returns `Ok` only when every sub-layer file was written. Sub-layer
    /// failures are collected in the report carried by
    /// [`ExportError::SublayersFailed`].
    pub async fn export_visualization(
        &self,
        source: DocumentSource,
        dest_root: &Path,
    ) -> Result<ExportReport, ExportError> {
        let mut phase = ExportPhase::Idle;

        transition(&mut phase, ExportPhase::LoadingDocument);
        if let Err(source) = tokio::fs::create_dir_all(dest_root).await {
            transition(&mut phase, ExportPhase::Failed);
            return Err(ExportError::Filesystem {
                path: dest_root.to_path_buf(),
                source,
            });
        }

        let viz_path = dest_root.join(VIZ_FILE_NAME);
        let document = match self.loader.load(source, Some(&viz_path)).await {
            Ok(document) => document,
            Err(e) => {
                transition(&mut phase, ExportPhase::Failed);
                return Err(e.into());
            }
        };

        transition(&mut phase, ExportPhase::WalkingLayers);
        let report = self
            .download_visualization_data(&document, dest_root)
            .await;

        if report.is_success() {
            transition(&mut phase, ExportPhase::Complete);
            info!(
                "[ExportService] Exported {} sublayer files to {}",
                report.written.len(),
                dest_root.display()
            );
            Ok(report)
        } else {
            transition(&mut phase, ExportPhase::Failed);
            Err(ExportError::SublayersFailed(report))
        }
    }

    /// Fetch every sub-layer of an already loaded document into `dest_root`.
    ///
    /// Fetches are launched in document order and awaited together.
    pub async fn download_visualization_data(
        &self,
        document: &VisualizationDocument,
        dest_root: &Path,
    ) -> ExportReport {
        let targets = sublayer_targets(document, dest_root);
        let semaphore = (self.max_concurrency > 0).then(|| Semaphore::new(self.max_concurrency));

        let mut report = ExportReport::new(dest_root.to_path_buf());
        let mut jobs = Vec::with_capacity(targets.len() * self.fetchers.len());
        for target in &targets {
            let sublayer = document.sublayer(target.layer_index, target.sublayer_index);
            for fetcher in &self.fetchers {
                if sublayer.is_some_and(|s| !fetcher.accepts(s)) {
                    let path = fetcher.output_path(target);
                    info!("[ExportService] Nothing to write for {}, skipping", path.display());
                    report.skipped.push(path);
                    continue;
                }
                jobs.push(run_fetch(
                    fetcher.as_ref(),
                    document,
                    target,
                    semaphore.as_ref(),
                ));
            }
        }
        debug!(
            "[ExportService] Launching {} fetches for {} sublayers",
            jobs.len(),
            targets.len()
        );

        report.attempted = jobs.len();
        for result in join_all(jobs).await {
            match result {
                Ok(path) => report.written.push(path),
                Err(failure) => {
                    warn!("[ExportService] Failed to export {}", failure);
                    report.failures.push(failure);
                }
            }
        }
        report
    }
}

async fn run_fetch(
    fetcher: &dyn SublayerFetcher,
    document: &VisualizationDocument,
    target: &SublayerTarget,
    semaphore: Option<&Semaphore>,
) -> Result<PathBuf, SublayerFailure> {
    let _permit = match semaphore {
        Some(semaphore) => semaphore.acquire().await.ok(),
        None => None,
    };

    fetcher
        .fetch(document, target)
        .await
        .map_err(|error| SublayerFailure {
            layer_index: target.layer_index,
            sublayer_index: target.sublayer_index,
            path: fetcher.output_path(target),
            error,
        })
}

fn transition(phase: &mut ExportPhase, next: ExportPhase) {
    debug!("[ExportService] {} -> {}", phase, next);
    *phase = next;
}
