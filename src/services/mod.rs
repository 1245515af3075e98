//! Services module - loading, walking and exporting visualizations.

pub mod document_loader;
pub mod export_service;
pub mod layer_walker;
pub mod style_fetcher;
pub mod sublayer_fetcher;

// Re-export for convenience
pub use document_loader::{DocumentLoader, DocumentSource, resolve_viz_url};
pub use export_service::{ExportPhase, ExportService};
pub use layer_walker::{for_each_sublayer, sublayer_targets};
pub use style_fetcher::StyleFetcher;
pub use sublayer_fetcher::{HttpSublayerFetcher, SublayerFetcher};
