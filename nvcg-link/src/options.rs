//! Link options

use crate::addrspace::SegmentMap;
use serde::{Deserialize, Serialize};

/// Knobs of one compilation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkOptions {
    /// Build the graph and run the traversal on the rayon pool
    pub parallel: bool,
    /// Size of a dedicated pool; `None` uses the global rayon pool
    pub threads: Option<usize>,
    /// Reject generic to specific conversions whose provenance is unknown
    /// instead of lowering them to a runtime check
    pub strict_provenance: bool,
    pub segments: SegmentMap,
    /// Kernel entry points designated by the driver
    pub extra_roots: Vec<String>,
    /// Name of the linked output module
    pub output_name: String,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
            strict_provenance: false,
            segments: SegmentMap::default(),
            extra_roots: Vec::new(),
            output_name: "merged".to_string(),
        }
    }
}

impl LinkOptions {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_root(mut self, name: &str) -> Self {
        self.extra_roots.push(name.to_string());
        self
    }
}
