pub mod report;
pub mod visualization;

pub use report::{ExportReport, SublayerFailure};
pub use visualization::{
    DATA_FILE_NAME, LAYER_GROUP_KIND, Layer, LayerGroupOptions, STYLE_FILE_NAME, Sublayer,
    SublayerOptions, SublayerTarget, VisualizationDocument, sublayer_dir,
};
