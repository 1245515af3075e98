//! Traversal of a document's layer/sub-layer tree.

use crate::models::{Layer, Sublayer, SublayerTarget, VisualizationDocument};
use std::path::Path;
use tracing::debug;

/// Call `action(layer, layer_index, sublayer, sublayer_index)` for every
/// sub-layer of every layer-group layer, in document order.
///
/// Layers of any other kind are skipped. Indices are positions in the
/// original document, so skipped layers still consume a layer index.
pub fn for_each_sublayer<F>(document: &VisualizationDocument, mut action: F)
where
    F: FnMut(&Layer, usize, &Sublayer, usize),
{
    for (layer_index, layer) in document.layers().iter().enumerate() {
        if !layer.is_layer_group() {
            debug!(
                "[LayerWalker] Skipping layer {} of type '{}'",
                layer_index, layer.kind
            );
            continue;
        }

        for (sublayer_index, sublayer) in layer.sublayers.iter().enumerate() {
            action(layer, layer_index, sublayer, sublayer_index);
        }
    }
}

/// Every qualifying (layer, sub-layer) pair with its directory under `root`.
pub fn sublayer_targets(document: &VisualizationDocument, root: &Path) -> Vec<SublayerTarget> {
    let mut targets = Vec::new();
    for_each_sublayer(document, |_, layer_index, _, sublayer_index| {
        targets.push(SublayerTarget::new(root, layer_index, sublayer_index));
    });
    targets
}
