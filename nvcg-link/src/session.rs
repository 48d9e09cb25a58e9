//! Compilation session
//!
//! Owns the compiled units, the bitcode source and the options of one link,
//! and drives graph building, traversal and linking in order. Every error on
//! the way is recorded in the session's `ErrorReporter`; the first one is
//! returned and no output is produced.

use crate::dce::{eliminate, DceResult};
use crate::graph::{build_graph, DependencyGraph};
use crate::linker::{link, LinkedModule};
use crate::loader::LazyModuleLoader;
use crate::options::LinkOptions;
use crate::source::BitcodeSource;
use crate::unit::CompiledUnit;
use log::{info, warn};
use nvcg_common::{CodegenError, ErrorReporter, ModuleId, SourceSpan, UnitKind};
use nvcg_ir::encode_module;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Counters of one session
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionStats {
    pub modules_total: usize,
    pub modules_loaded: usize,
    pub symbols_total: usize,
    pub symbols_reachable: usize,
    pub runtime_checks: usize,
    /// Bitcode reads per module name
    pub reads_per_module: BTreeMap<String, usize>,
}

/// Graph and traversal state, before linking
pub struct Analysis {
    pub graph: DependencyGraph,
    pub loader: LazyModuleLoader,
    pub dce: DceResult,
}

impl Analysis {
    pub fn stats(&self) -> SessionStats {
        let reads_per_module = self
            .graph
            .modules()
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), self.loader.read_count(ModuleId(i as u32))))
            .collect();
        SessionStats {
            modules_total: self.graph.modules().len(),
            modules_loaded: self.loader.loaded_count(),
            symbols_total: self.graph.symbols().len(),
            symbols_reachable: self.dce.reachable_symbols().len(),
            runtime_checks: self.dce.runtime_checks(),
            reads_per_module,
        }
    }

    /// Root symbols, qualified by module
    pub fn root_names(&self) -> Vec<String> {
        self.dce.roots().iter().map(|&id| self.graph.qualified_name(id)).collect()
    }
}

/// Everything a successful session hands downstream
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub linked: LinkedModule,
    /// The linked module in bitcode form
    pub bitcode: Vec<u8>,
    pub stats: SessionStats,
}

pub struct CompilationSession {
    units: Vec<CompiledUnit>,
    source: Arc<dyn BitcodeSource>,
    options: LinkOptions,
    reporter: ErrorReporter,
}

impl CompilationSession {
    pub fn new(source: Arc<dyn BitcodeSource>, options: LinkOptions) -> Self {
        Self {
            units: Vec::new(),
            source,
            options,
            reporter: ErrorReporter::new(),
        }
    }

    pub fn add_unit(&mut self, unit: CompiledUnit) {
        self.units.push(unit);
    }

    /// Add a support library that is linked only where something uses it
    pub fn add_lazy_module(&mut self, mut unit: CompiledUnit) {
        unit.kind = UnitKind::Library;
        self.add_unit(unit);
    }

    pub fn units(&self) -> &[CompiledUnit] {
        &self.units
    }

    pub fn options(&self) -> &LinkOptions {
        &self.options
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn build_graph(&mut self) -> Result<DependencyGraph, CodegenError> {
        let segments = self
            .options
            .segments
            .validate()
            .map_err(|msg| CodegenError::internal(format!("invalid segment map: {msg}")));
        self.record(segments)?;
        let graph = build_graph(&self.units, self.options.parallel);
        self.record(graph)
    }

    /// Build the graph and run the traversal, without linking
    pub fn analyze(&mut self) -> Result<Analysis, CodegenError> {
        let graph = self.build_graph()?;
        let roots = graph.root_set(&self.options.extra_roots);
        let roots = self.record(roots)?;
        let loader = LazyModuleLoader::for_graph(self.source.clone(), &graph);

        let dce = match eliminate(&graph, &loader, &self.options, &roots) {
            Ok(dce) => dce,
            Err(failure) => {
                for error in failure.errors() {
                    self.reporter.report(error);
                }
                return Err(failure.first);
            }
        };

        for (i, module) in graph.modules().iter().enumerate() {
            let id = ModuleId(i as u32);
            if module.kind == UnitKind::Crate && !module.symbols.is_empty() && !loader.is_loaded(id) {
                warn!("crate '{}' contributes nothing to the linked module", module.name);
                self.reporter.warning(
                    format!("crate `{}` has no reachable symbols", module.name),
                    SourceSpan::dummy(),
                );
            }
        }

        Ok(Analysis { graph, loader, dce })
    }

    /// Run the whole session and produce the linked module
    pub fn run(&mut self) -> Result<SessionOutput, CodegenError> {
        let analysis = self.analyze()?;
        let linked = link(&analysis.graph, &analysis.dce, &self.options);
        let linked = self.record(linked)?;
        let bitcode = encode_module(&linked.module)
            .map_err(|e| CodegenError::internal(format!("cannot encode the linked module: {e}")));
        let bitcode = self.record(bitcode)?;

        let stats = analysis.stats();
        info!(
            "session done: {}/{} modules loaded, {}/{} symbols kept, {} runtime checks",
            stats.modules_loaded, stats.modules_total, stats.symbols_reachable, stats.symbols_total, stats.runtime_checks
        );
        Ok(SessionOutput { linked, bitcode, stats })
    }

    fn record<T>(&mut self, result: Result<T, CodegenError>) -> Result<T, CodegenError> {
        if let Err(error) = &result {
            self.reporter.report(error);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::test_support::{compile, function, kernel};
    use nvcg_common::Visibility;
    use nvcg_ir::{decode_module, Module};
    use pretty_assertions::assert_eq;

    fn session(modules: Vec<(Module, UnitKind)>, options: LinkOptions) -> CompilationSession {
        let (units, source) = compile(&modules);
        let mut session = CompilationSession::new(Arc::new(source), options);
        for unit in units {
            session.add_unit(unit);
        }
        session
    }

    #[test]
    fn test_run_produces_bitcode() {
        let mut app = Module::new("app".to_string());
        app.add_function(kernel("kernel_main", &["helper"]));
        app.add_function(function("helper", Visibility::Internal, &[]));

        let mut session = session(vec![(app, UnitKind::Crate)], LinkOptions::default());
        let output = session.run().unwrap();

        let decoded = decode_module(&output.bitcode).unwrap();
        assert_eq!(decoded, output.linked.module);
        assert_eq!(decoded.name, "merged");
        assert_eq!(output.stats.symbols_reachable, 2);
        assert_eq!(output.stats.reads_per_module["app"], 1);
        assert!(!session.reporter().has_errors());
    }

    #[test]
    fn test_errors_are_reported() {
        let mut a = Module::new("a".to_string());
        a.add_function(kernel("kernel_main", &[]));
        let mut b = Module::new("b".to_string());
        b.add_function(kernel("kernel_main", &[]));

        let mut session = session(vec![(a, UnitKind::Crate), (b, UnitKind::Crate)], LinkOptions::sequential());
        let err = session.run().unwrap_err();
        assert_eq!(err, CodegenError::duplicate_external("kernel_main", "a", "b"));
        assert_eq!(session.reporter().error_count(), 1);
    }

    #[test]
    fn test_unused_crate_warning() {
        let mut app = Module::new("app".to_string());
        app.add_function(kernel("kernel_main", &[]));
        let mut stale = Module::new("stale".to_string());
        stale.add_function(function("leftover", Visibility::Internal, &[]));

        let mut session = session(vec![(app, UnitKind::Crate), (stale, UnitKind::Crate)], LinkOptions::default());
        let analysis = session.analyze().unwrap();
        assert_eq!(analysis.stats().reads_per_module["stale"], 0);
        assert_eq!(analysis.root_names(), vec!["app::kernel_main".to_string()]);
        assert_eq!(session.reporter().warning_count(), 1);
    }

    #[test]
    fn test_invalid_segment_map() {
        let mut options = LinkOptions::default();
        options.segments.shared = options.segments.global;
        let mut session = CompilationSession::new(Arc::new(InMemorySource::new()), options);
        assert!(matches!(session.build_graph(), Err(CodegenError::InternalError { .. })));
        assert!(session.reporter().has_errors());
    }

    #[test]
    fn test_lazy_module_is_library() {
        let mut session = CompilationSession::new(Arc::new(InMemorySource::new()), LinkOptions::default());
        session.add_lazy_module(CompiledUnit::new("libdevice"));
        assert_eq!(session.units()[0].kind, UnitKind::Library);
    }
}
