//! Export map visualizations and the data behind their sub-layers.
//!
//! A visualization document (`viz.json`) lists layers; every `layergroup`
//! layer owns sub-layers defined by a SQL query. An export writes
//!
//! ```text
//! <dest>/viz.json
//! <dest>/layers/<layer>/sublayers/<sublayer>/layer.geojson
//! <dest>/layers/<layer>/sublayers/<sublayer>/style.json   (optional)
//! ```
//!
//! Each sub-layer query is rewritten by [`sql_augmenter`] to drop features
//! without geometry before it is sent to the SQL API.

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod observability;
pub mod services;
pub mod sql_augmenter;

pub use config::ExportConfig;
pub use error::{DocumentLoadError, ExportError, SublayerError};
pub use models::{ExportReport, SublayerFailure, VisualizationDocument};
pub use services::{DocumentSource, ExportService};
pub use sql_augmenter::{SqlAugmentError, SqlAugmenter, augment_sql};

use std::path::Path;

/// Export the visualization at `source` (URL or local path) into `dest`
/// using configuration from the environment.
pub async fn export_visualization(source: &str, dest: &Path) -> Result<ExportReport, ExportError> {
    let source = DocumentSource::parse(source)?;
    let service = ExportService::new(&ExportConfig::from_env())?;
    service.export_visualization(source, dest).await
}
