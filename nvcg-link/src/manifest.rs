//! Session manifest
//!
//! JSON description of a link: every unit with its symbol table, reference
//! manifest and bitcode path, plus driver-designated kernel roots and
//! optional link options.
//!
//! ```json
//! {
//!   "units": [
//!     { "name": "app", "symbols": [...], "manifest": [...], "bitcode": "app.bc" },
//!     { "name": "libdevice", "kind": "library", "symbols": [...] }
//!   ],
//!   "kernels": ["kernel_main"]
//! }
//! ```
//!
//! Relative bitcode paths resolve against the manifest's directory; a unit
//! without a path is looked up as `<name>.bc` next to the manifest.

use crate::options::LinkOptions;
use crate::session::CompilationSession;
use crate::source::FileSource;
use crate::unit::CompiledUnit;
use nvcg_common::CodegenError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitEntry {
    #[serde(flatten)]
    pub unit: CompiledUnit,
    #[serde(default)]
    pub bitcode: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionManifest {
    pub units: Vec<UnitEntry>,
    /// Extra kernel entry points
    #[serde(default)]
    pub kernels: Vec<String>,
    #[serde(default)]
    pub options: Option<LinkOptions>,
}

impl SessionManifest {
    pub fn parse(json: &str) -> Result<Self, CodegenError> {
        serde_json::from_str(json).map_err(|e| CodegenError::internal(format!("invalid session manifest: {e}")))
    }

    /// Load a manifest file, resolving bitcode paths against its directory
    pub fn load(path: &Path) -> Result<Self, CodegenError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CodegenError::IoError { message: format!("{}: {}", path.display(), e) })?;
        let mut manifest = Self::parse(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut manifest.units {
            let bitcode = entry
                .bitcode
                .take()
                .unwrap_or_else(|| PathBuf::from(format!("{}.bc", entry.unit.name)));
            entry.bitcode = Some(if bitcode.is_absolute() { bitcode } else { base.join(bitcode) });
        }
        Ok(manifest)
    }

    /// Turn the manifest into a ready-to-run session. Options in the
    /// manifest take the place of `defaults`; kernels are added as roots.
    pub fn into_session(self, defaults: LinkOptions) -> CompilationSession {
        let mut options = self.options.unwrap_or(defaults);
        options.extra_roots.extend(self.kernels);

        let mut source = FileSource::new();
        for entry in &self.units {
            if let Some(path) = &entry.bitcode {
                source = source.with_path(&entry.unit.name, path.clone());
            }
        }

        let mut session = CompilationSession::new(Arc::new(source), options);
        for entry in self.units {
            session.add_unit(entry.unit);
        }
        session
    }
}
