use crate::error::SublayerError;
use std::fmt;
use std::path::PathBuf;

/// Outcome of one export run.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub dest_root: PathBuf,
    /// Number of sub-layer files the export tried to write
    pub attempted: usize,
    pub written: Vec<PathBuf>,
    /// Files not attempted because the fetcher had nothing to write
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<SublayerFailure>,
}

impl ExportReport {
    pub fn new(dest_root: PathBuf) -> Self {
        Self {
            dest_root,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// `(layer_index, sublayer_index)` of every failed sub-layer, in document order.
    pub fn failed_coordinates(&self) -> Vec<(usize, usize)> {
        let mut coords: Vec<(usize, usize)> = self
            .failures
            .iter()
            .map(|f| (f.layer_index, f.sublayer_index))
            .collect();
        coords.sort_unstable();
        coords.dedup();
        coords
    }
}

#[derive(Debug)]
pub struct SublayerFailure {
    pub layer_index: usize,
    pub sublayer_index: usize,
    /// File that was not written
    pub path: PathBuf,
    pub error: SublayerError,
}

impl fmt::Display for SublayerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layer {} sublayer {} ({}): {}",
            self.layer_index,
            self.sublayer_index,
            self.path.display(),
            self.error
        )
    }
}
