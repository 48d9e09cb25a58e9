//! Reachability-based dead code elimination
//!
//! Traverses the dependency graph from the root set. Every node is claimed
//! with a single compare-exchange on its reachable flag, so whichever worker
//! wins processes it and everybody else moves on. Processing a symbol loads
//! its module through the lazy loader, verifies the body, and parks it in a
//! per-symbol slot for the linker. Modules no reached symbol lives in are
//! never loaded.
//!
//! The sequential traversal is an explicit worklist. The parallel one spawns
//! a rayon scope task per claimed node. Both reach the same set.

use crate::addrspace::{AddressSpaceVerifier, SegmentMap, SpaceLookup, VerifiedFunction};
use crate::graph::{DependencyGraph, DispatchId, NodeId};
use crate::loader::LazyModuleLoader;
use crate::options::LinkOptions;
use log::{debug, trace};
use nvcg_common::{AddressSpace, CodegenError, ModuleId, SymbolId, SymbolKind};
use nvcg_ir::{GlobalVariable, IrType, Module};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use thiserror::Error;

/// Per-session reachable flags, one per symbol and one per dispatch site
#[derive(Debug)]
pub struct Reachability {
    symbols: Vec<AtomicBool>,
    dispatch: Vec<AtomicBool>,
}

impl Reachability {
    pub fn new(graph: &DependencyGraph) -> Self {
        Self {
            symbols: graph.symbols().iter().map(|_| AtomicBool::new(false)).collect(),
            dispatch: graph.dispatch_sites().iter().map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn flag(&self, node: NodeId) -> &AtomicBool {
        match node {
            NodeId::Symbol(id) => &self.symbols[id.index()],
            NodeId::Dispatch(id) => &self.dispatch[id.index()],
        }
    }

    /// Mark `node` reachable. Returns true for the one caller that flipped it.
    pub fn claim(&self, node: NodeId) -> bool {
        self.flag(node)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.flag(node).load(Ordering::Acquire)
    }

    pub fn reachable_symbols(&self) -> Vec<SymbolId> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, flag)| flag.load(Ordering::Acquire))
            .map(|(i, _)| SymbolId(i as u32))
            .collect()
    }
}

/// A reached definition, ready for the linker
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Function(VerifiedFunction),
    Global(GlobalVariable),
}

/// The traversal stopped on an error. `first` is the error that cancelled
/// it; `others` were found by workers still in flight.
#[derive(Error, Debug)]
#[error("{first}")]
pub struct TraversalFailure {
    pub first: CodegenError,
    pub others: Vec<CodegenError>,
}

impl TraversalFailure {
    pub fn errors(&self) -> impl Iterator<Item = &CodegenError> {
        std::iter::once(&self.first).chain(self.others.iter())
    }
}

/// Outcome of a successful traversal
#[derive(Debug)]
pub struct DceResult {
    roots: Vec<SymbolId>,
    reachability: Reachability,
    bodies: Vec<Option<Materialized>>,
}

impl DceResult {
    pub fn roots(&self) -> &[SymbolId] {
        &self.roots
    }

    pub fn is_reachable(&self, id: SymbolId) -> bool {
        self.reachability.is_reachable(NodeId::Symbol(id))
    }

    pub fn is_dispatch_reachable(&self, id: DispatchId) -> bool {
        self.reachability.is_reachable(NodeId::Dispatch(id))
    }

    pub fn reachable_symbols(&self) -> Vec<SymbolId> {
        self.reachability.reachable_symbols()
    }

    pub fn body(&self, id: SymbolId) -> Option<&Materialized> {
        self.bodies.get(id.index()).and_then(Option::as_ref)
    }

    /// Conversions left to a runtime check across all reached functions
    pub fn runtime_checks(&self) -> usize {
        self.bodies
            .iter()
            .flatten()
            .map(|body| match body {
                Materialized::Function(f) => f.runtime_checks,
                Materialized::Global(_) => 0,
            })
            .sum()
    }
}

/// Name lookups made from inside one module's bodies
struct ModuleScope<'g> {
    graph: &'g DependencyGraph,
    module: ModuleId,
    body: &'g Module,
}

impl SpaceLookup for ModuleScope<'_> {
    fn space_of(&self, name: &str) -> Option<AddressSpace> {
        self.graph.resolve(self.module, name).map(|id| {
            let symbol = self.graph.symbol(id);
            match symbol.kind {
                SymbolKind::GlobalVariable => symbol.space,
                SymbolKind::Function => AddressSpace::Generic,
            }
        })
    }

    /// Signatures come from the module's own definitions and the
    /// declarations it carries for its external callees
    fn parameter_types(&self, function: &str) -> Option<Vec<IrType>> {
        self.body
            .get_function(function)
            .map(|f| f.parameters.iter().map(|(_, ty)| ty.clone()).collect())
    }
}

pub struct DceEngine<'a> {
    graph: &'a DependencyGraph,
    loader: &'a LazyModuleLoader,
    parallel: bool,
    threads: Option<usize>,
    strict: bool,
    segments: SegmentMap,
    reachability: Reachability,
    bodies: Vec<OnceLock<Materialized>>,
    cancelled: AtomicBool,
    errors: Mutex<Vec<CodegenError>>,
}

impl<'a> DceEngine<'a> {
    pub fn new(graph: &'a DependencyGraph, loader: &'a LazyModuleLoader, options: &LinkOptions) -> Self {
        Self {
            graph,
            loader,
            parallel: options.parallel,
            threads: options.threads,
            strict: options.strict_provenance,
            segments: options.segments,
            reachability: Reachability::new(graph),
            bodies: graph.symbols().iter().map(|_| OnceLock::new()).collect(),
            cancelled: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn run(self, roots: &[SymbolId]) -> Result<DceResult, TraversalFailure> {
        debug!(
            "dce: {} roots, {} mode",
            roots.len(),
            if self.parallel { "parallel" } else { "sequential" }
        );

        match (self.parallel, self.threads) {
            (false, _) => self.run_sequential(roots),
            (true, None) => self.run_parallel(roots),
            (true, Some(threads)) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(|| self.run_parallel(roots)),
                Err(e) => self.fail(CodegenError::internal(format!("cannot build a {threads}-thread pool: {e}"))),
            },
        }

        self.finish(roots)
    }

    fn run_sequential(&self, roots: &[SymbolId]) {
        let mut worklist: Vec<NodeId> = roots.iter().rev().map(|&id| NodeId::Symbol(id)).collect();

        while let Some(node) = worklist.pop() {
            if self.is_cancelled() {
                break;
            }
            if !self.reachability.claim(node) {
                continue;
            }
            match self.visit(node) {
                Ok(successors) => worklist.extend(
                    successors
                        .iter()
                        .rev()
                        .filter(|&&next| !self.reachability.is_reachable(next)),
                ),
                Err(e) => self.fail(e),
            }
        }
    }

    fn run_parallel(&self, roots: &[SymbolId]) {
        rayon::scope(|scope| {
            for &root in roots {
                self.spawn_visit(scope, NodeId::Symbol(root));
            }
        });
    }

    fn spawn_visit<'s>(&'s self, scope: &rayon::Scope<'s>, node: NodeId) {
        if self.is_cancelled() || !self.reachability.claim(node) {
            return;
        }
        scope.spawn(move |scope| {
            if self.is_cancelled() {
                return;
            }
            match self.visit(node) {
                Ok(successors) => {
                    for &next in successors {
                        self.spawn_visit(scope, next);
                    }
                }
                Err(e) => self.fail(e),
            }
        });
    }

    /// Process a claimed node and hand back its successors
    fn visit(&self, node: NodeId) -> Result<&'a [NodeId], CodegenError> {
        if let NodeId::Symbol(id) = node {
            self.materialize(id)?;
        }
        Ok(self.graph.successors(node))
    }

    fn materialize(&self, id: SymbolId) -> Result<(), CodegenError> {
        let symbol = self.graph.symbol(id);
        let module = self.loader.load(symbol.module)?;
        let module_name = &self.graph.module(symbol.module).name;
        let missing = || {
            CodegenError::module_load(
                module_name,
                format!("symbol table lists `{}` but the bitcode does not define it", symbol.name),
            )
        };

        let scope = ModuleScope {
            graph: self.graph,
            module: symbol.module,
            body: &module,
        };
        let verifier = AddressSpaceVerifier::new(&scope)
            .with_segments(&self.segments)
            .strict(self.strict);

        let body = match symbol.kind {
            SymbolKind::Function => {
                let function = module
                    .get_function(&symbol.name)
                    .filter(|f| !f.is_declaration())
                    .ok_or_else(missing)?;
                Materialized::Function(verifier.verify_function(function)?)
            }
            SymbolKind::GlobalVariable => {
                let global = module.get_global(&symbol.name).ok_or_else(missing)?;
                if global.space != symbol.space {
                    return Err(CodegenError::module_load(
                        module_name,
                        format!(
                            "`{}` is declared in the {} space but its bitcode places it in {}",
                            symbol.name, symbol.space, global.space
                        ),
                    ));
                }
                verifier.verify_global(global)?;
                Materialized::Global(global.clone())
            }
        };

        trace!("reached {}", self.graph.qualified_name(id));
        self.bodies[id.index()]
            .set(body)
            .map_err(|_| CodegenError::internal(format!("{} was processed twice", self.graph.qualified_name(id))))
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record an error and stop every worker from taking new work
    fn fail(&self, error: CodegenError) {
        debug!("dce cancelled: {}", error);
        self.cancelled.store(true, Ordering::Release);
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(error);
    }

    fn finish(self, roots: &[SymbolId]) -> Result<DceResult, TraversalFailure> {
        let mut errors = self.errors.into_inner().unwrap_or_else(PoisonError::into_inner);
        if !errors.is_empty() {
            let first = errors.remove(0);
            return Err(TraversalFailure { first, others: errors });
        }

        let result = DceResult {
            roots: roots.to_vec(),
            reachability: self.reachability,
            bodies: self.bodies.into_iter().map(OnceLock::into_inner).collect(),
        };
        debug!(
            "dce: {} of {} symbols reachable",
            result.reachable_symbols().len(),
            self.graph.symbols().len()
        );
        Ok(result)
    }
}

/// Run the traversal for `roots` with the given options
pub fn eliminate(
    graph: &DependencyGraph,
    loader: &LazyModuleLoader,
    options: &LinkOptions,
    roots: &[SymbolId],
) -> Result<DceResult, TraversalFailure> {
    DceEngine::new(graph, loader, options).run(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::test_support::{compile, function};
    use crate::unit::SymbolEntry;
    use nvcg_common::{UnitKind, Visibility};
    use nvcg_ir::Module;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn chain() -> Vec<(Module, UnitKind)> {
        let mut a = Module::new("a".to_string());
        a.add_function(function("entry", Visibility::External, &["step", "step"]));
        a.add_function(function("step", Visibility::Internal, &["step", "finish"]));
        a.add_function(function("dead", Visibility::Internal, &["finish"]));
        let mut b = Module::new("b".to_string());
        b.add_function(function("finish", Visibility::External, &[]));
        b.add_function(function("unused", Visibility::Internal, &[]));
        vec![(a, UnitKind::Crate), (b, UnitKind::Crate)]
    }

    #[test]
    fn test_modes_agree() {
        let (units, source) = compile(&chain());
        let graph = build_graph(&units, false).unwrap();
        let roots = graph.root_set(&[]).unwrap();
        let source = Arc::new(source);

        let mut reached = Vec::new();
        for options in [
            LinkOptions::sequential(),
            LinkOptions::default(),
            LinkOptions { threads: Some(2), ..LinkOptions::default() },
        ] {
            let loader = LazyModuleLoader::for_graph(source.clone(), &graph);
            let result = eliminate(&graph, &loader, &options, &roots).unwrap();
            let names: Vec<String> = result
                .reachable_symbols()
                .into_iter()
                .map(|id| graph.qualified_name(id))
                .collect();
            reached.push(names);
        }
        assert_eq!(reached[0], vec!["a::entry".to_string(), "a::step".to_string(), "b::finish".to_string()]);
        assert_eq!(reached[0], reached[1]);
        assert_eq!(reached[0], reached[2]);
    }

    #[test]
    fn test_bodies_only_for_reached_symbols() {
        let (units, source) = compile(&chain());
        let graph = build_graph(&units, false).unwrap();
        let loader = LazyModuleLoader::for_graph(Arc::new(source), &graph);
        let entry = graph.lookup_external("entry").unwrap();
        let result = eliminate(&graph, &loader, &LinkOptions::sequential(), &[entry]).unwrap();

        for id in graph.symbol_ids() {
            assert_eq!(result.body(id).is_some(), result.is_reachable(id), "{}", graph.qualified_name(id));
        }
        assert_eq!(result.roots(), &[entry]);
    }

    #[test]
    fn test_missing_body_fails() {
        let (mut units, source) = compile(&chain());
        units[1].symbols.add(SymbolEntry::function("phantom", Visibility::External));
        let graph = build_graph(&units, false).unwrap();
        let loader = LazyModuleLoader::for_graph(Arc::new(source), &graph);
        let roots = graph.root_set(&[]).unwrap();

        let failure = eliminate(&graph, &loader, &LinkOptions::sequential(), &roots).unwrap_err();
        assert_eq!(failure.first.kind_name(), "ModuleLoadFailure");
        assert!(failure.first.to_string().contains("phantom"));
        assert_eq!(failure.errors().count(), 1 + failure.others.len());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (units, _) = compile(&chain());
        let graph = build_graph(&units, false).unwrap();
        let reachability = Reachability::new(&graph);
        let node = NodeId::Symbol(SymbolId(1));
        assert!(reachability.claim(node));
        assert!(!reachability.claim(node));
        assert!(reachability.is_reachable(node));
        assert_eq!(reachability.reachable_symbols(), vec![SymbolId(1)]);
    }
}
