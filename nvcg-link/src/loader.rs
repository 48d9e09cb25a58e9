//! Lazy module loader
//!
//! Each module has one slot holding a `OnceLock`. The first caller that needs
//! the body reads and decodes the bitcode inside `get_or_init`; concurrent
//! callers for the same module block on the lock until that read finishes,
//! and every later call gets the same `Arc`. A failed load is memoized too,
//! so a broken blob is also read only once.

use crate::graph::DependencyGraph;
use crate::source::BitcodeSource;
use log::debug;
use nvcg_common::{CodegenError, ModuleId};
use nvcg_ir::{decode_module, Module};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

struct ModuleSlot {
    name: String,
    body: OnceLock<Result<Arc<Module>, CodegenError>>,
    reads: AtomicUsize,
}

pub struct LazyModuleLoader {
    source: Arc<dyn BitcodeSource>,
    slots: Vec<ModuleSlot>,
}

impl LazyModuleLoader {
    /// One slot per module name, indexed by `ModuleId` in the given order
    pub fn new<I>(source: Arc<dyn BitcodeSource>, modules: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let slots = modules
            .into_iter()
            .map(|name| ModuleSlot {
                name,
                body: OnceLock::new(),
                reads: AtomicUsize::new(0),
            })
            .collect();
        Self { source, slots }
    }

    pub fn for_graph(source: Arc<dyn BitcodeSource>, graph: &DependencyGraph) -> Self {
        Self::new(source, graph.modules().iter().map(|m| m.name.clone()))
    }

    /// Body of `module`, reading its bitcode on the first call
    pub fn load(&self, module: ModuleId) -> Result<Arc<Module>, CodegenError> {
        let slot = self.slot(module)?;
        slot.body
            .get_or_init(|| {
                slot.reads.fetch_add(1, Ordering::SeqCst);
                self.read_module(&slot.name)
            })
            .clone()
    }

    /// Body of `module` if it has already been loaded successfully
    pub fn get(&self, module: ModuleId) -> Option<Arc<Module>> {
        self.slots
            .get(module.index())
            .and_then(|slot| slot.body.get())
            .and_then(|body| body.as_ref().ok())
            .cloned()
    }

    pub fn is_loaded(&self, module: ModuleId) -> bool {
        self.get(module).is_some()
    }

    /// How many times the bitcode of `module` was read
    pub fn read_count(&self, module: ModuleId) -> usize {
        self.slots
            .get(module.index())
            .map_or(0, |slot| slot.reads.load(Ordering::SeqCst))
    }

    pub fn module_count(&self) -> usize {
        self.slots.len()
    }

    pub fn loaded_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.body.get(), Some(Ok(_))))
            .count()
    }

    pub fn module_name(&self, module: ModuleId) -> Option<&str> {
        self.slots.get(module.index()).map(|slot| slot.name.as_str())
    }

    fn slot(&self, module: ModuleId) -> Result<&ModuleSlot, CodegenError> {
        self.slots
            .get(module.index())
            .ok_or_else(|| CodegenError::internal(format!("loader has no module {module}")))
    }

    fn read_module(&self, name: &str) -> Result<Arc<Module>, CodegenError> {
        let bytes = self
            .source
            .read(name)
            .map_err(|e| CodegenError::module_load(name, e.to_string()))?;
        let module = decode_module(&bytes).map_err(|e| CodegenError::module_load(name, e.to_string()))?;
        if module.name != name {
            return Err(CodegenError::module_load(
                name,
                format!("bitcode contains module `{}`", module.name),
            ));
        }
        debug!(
            "loaded module '{}': {} functions, {} globals ({} bytes)",
            name,
            module.functions.len(),
            module.globals.len(),
            bytes.len()
        );
        Ok(Arc::new(module))
    }
}
