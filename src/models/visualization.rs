//! Visualization document model.
//!
//! The document is parsed leniently: anything that does not look like a
//! layer-group with a sub-layer list simply contributes nothing to the export.

use crate::error::SublayerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// The only layer `type` that carries queryable sub-layers.
pub const LAYER_GROUP_KIND: &str = "layergroup";

pub const DATA_FILE_NAME: &str = "layer.geojson";
pub const STYLE_FILE_NAME: &str = "style.json";

#[derive(Debug, Clone)]
pub struct VisualizationDocument {
    raw: Value,
    layers: Vec<Layer>,
}

impl VisualizationDocument {
    pub fn from_value(raw: Value) -> Self {
        let layers = raw
            .get("layers")
            .and_then(Value::as_array)
            .map(|layers| layers.iter().map(Layer::from_value).collect())
            .unwrap_or_default();

        Self { raw, layers }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(raw))
    }

    /// The JSON this document was built from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, layer_index: usize) -> Option<&Layer> {
        self.layers.get(layer_index)
    }

    pub fn sublayer(&self, layer_index: usize, sublayer_index: usize) -> Option<&Sublayer> {
        self.layer(layer_index)?.sublayers.get(sublayer_index)
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    /// The layer's `type` field
    pub kind: String,
    pub group_options: LayerGroupOptions,
    pub sublayers: Vec<Sublayer>,
}

impl Layer {
    fn from_value(value: &Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let options = value.get("options");

        let group_options = options
            .map(LayerGroupOptions::from_options)
            .unwrap_or_default();

        let sublayers = options
            .and_then(|o| o.pointer("/layer_definition/layers"))
            .and_then(Value::as_array)
            .map(|sublayers| sublayers.iter().map(Sublayer::from_value).collect())
            .unwrap_or_default();

        Self {
            kind,
            group_options,
            sublayers,
        }
    }

    pub fn is_layer_group(&self) -> bool {
        self.kind == LAYER_GROUP_KIND
    }
}

/// SQL API settings of a layer-group layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerGroupOptions {
    #[serde(default)]
    pub sql_api_template: Option<String>,
    #[serde(default)]
    pub sql_api_endpoint: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl LayerGroupOptions {
    fn from_options(options: &Value) -> Self {
        Self {
            sql_api_template: string_field(options, "sql_api_template"),
            sql_api_endpoint: string_field(options, "sql_api_endpoint"),
            user_name: string_field(options, "user_name"),
        }
    }

    /// `<sql_api_template><sql_api_endpoint>` with `{user}` replaced by the user name.
    pub fn sql_api_url(&self) -> Result<String, SublayerError> {
        let template = self
            .sql_api_template
            .as_deref()
            .ok_or_else(|| SublayerError::InvalidLayer("sql_api_template".to_string()))?;
        let endpoint = self
            .sql_api_endpoint
            .as_deref()
            .ok_or_else(|| SublayerError::InvalidLayer("sql_api_endpoint".to_string()))?;

        let url = format!("{}{}", template, endpoint);
        if !url.contains("{user}") {
            return Ok(url);
        }

        let user = self
            .user_name
            .as_deref()
            .ok_or_else(|| SublayerError::InvalidLayer("user_name".to_string()))?;
        Ok(url.replace("{user}", user))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sublayer {
    pub options: SublayerOptions,
}

impl Sublayer {
    fn from_value(value: &Value) -> Self {
        let options = value
            .get("options")
            .map(|o| SublayerOptions {
                sql: string_field(o, "sql"),
                cartocss: string_field(o, "cartocss"),
                cartocss_version: string_field(o, "cartocss_version"),
            })
            .unwrap_or_default();
        Self { options }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SublayerOptions {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub cartocss: Option<String>,
    #[serde(default)]
    pub cartocss_version: Option<String>,
}

/// A string option; absent and wrongly typed values are both `None`, without
/// affecting the other options of the same object.
fn string_field(options: &Value, name: &str) -> Option<String> {
    options.get(name).and_then(Value::as_str).map(str::to_string)
}

/// A (layer, sub-layer) pair and the directory its files are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SublayerTarget {
    pub layer_index: usize,
    pub sublayer_index: usize,
    pub dir: PathBuf,
}

impl SublayerTarget {
    pub fn new(root: &Path, layer_index: usize, sublayer_index: usize) -> Self {
        Self {
            layer_index,
            sublayer_index,
            dir: sublayer_dir(root, layer_index, sublayer_index),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE_NAME)
    }

    pub fn style_path(&self) -> PathBuf {
        self.dir.join(STYLE_FILE_NAME)
    }
}

/// `<root>/layers/<layer_index>/sublayers/<sublayer_index>`
pub fn sublayer_dir(root: &Path, layer_index: usize, sublayer_index: usize) -> PathBuf {
    root.join("layers")
        .join(layer_index.to_string())
        .join("sublayers")
        .join(sublayer_index.to_string())
}
