//! Dependency graph
//!
//! Built once per session from the symbol tables and reference manifests of
//! every compiled unit, without touching any bitcode. Symbols and dispatch
//! sites live in flat arenas indexed by dense ids; edges are per-node
//! adjacency lists. The graph is never mutated after `build_graph` returns.

use crate::unit::{CompiledUnit, RefTarget};
use log::debug;
use nvcg_common::{AddressSpace, CodegenError, ModuleId, SymbolId, SymbolKind, UnitKind, Visibility};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Dense index of a dispatch site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(pub u32);

impl DispatchId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node of the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Symbol(SymbolId),
    Dispatch(DispatchId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub space: AddressSpace,
    pub visibility: Visibility,
    pub module: ModuleId,
    pub is_kernel: bool,
}

/// A dynamically dispatched capability. Reaching the site reaches every
/// implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSite {
    pub capability: String,
    pub implementations: Vec<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    pub name: String,
    pub kind: UnitKind,
    pub symbols: Vec<SymbolId>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    modules: Vec<ModuleInfo>,
    symbols: Vec<GraphSymbol>,
    edges: Vec<Vec<NodeId>>,
    dispatch: Vec<DispatchSite>,
    dispatch_edges: Vec<Vec<NodeId>>,
    capabilities: HashMap<String, DispatchId>,
    local_names: Vec<HashMap<String, SymbolId>>,
    external_names: HashMap<String, SymbolId>,
    duplicate_externals: Vec<(SymbolId, SymbolId)>,
}

impl DependencyGraph {
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.index()]
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(|i| ModuleId(i as u32))
    }

    pub fn symbols(&self) -> &[GraphSymbol] {
        &self.symbols
    }

    pub fn symbol(&self, id: SymbolId) -> &GraphSymbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_ids(&self) -> impl Iterator<Item = SymbolId> {
        (0..self.symbols.len() as u32).map(SymbolId)
    }

    pub fn dispatch_sites(&self) -> &[DispatchSite] {
        &self.dispatch
    }

    pub fn dispatch_site(&self, id: DispatchId) -> &DispatchSite {
        &self.dispatch[id.index()]
    }

    pub fn capability(&self, name: &str) -> Option<DispatchId> {
        self.capabilities.get(name).copied()
    }

    pub fn successors(&self, node: NodeId) -> &[NodeId] {
        match node {
            NodeId::Symbol(id) => &self.edges[id.index()],
            NodeId::Dispatch(id) => &self.dispatch_edges[id.index()],
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().chain(self.dispatch_edges.iter()).map(Vec::len).sum()
    }

    /// Resolve `name` as seen from `module`: the module's own symbol first,
    /// then the external symbol of that name anywhere.
    pub fn resolve(&self, module: ModuleId, name: &str) -> Option<SymbolId> {
        self.local_names
            .get(module.index())
            .and_then(|names| names.get(name))
            .copied()
            .or_else(|| self.lookup_external(name))
    }

    pub fn lookup_external(&self, name: &str) -> Option<SymbolId> {
        self.external_names.get(name).copied()
    }

    /// External names defined by more than one module, as (first, later)
    pub fn duplicate_externals(&self) -> &[(SymbolId, SymbolId)] {
        &self.duplicate_externals
    }

    /// Every external symbol of a non-library unit, every kernel, and the
    /// extra entries the driver designates
    pub fn root_set(&self, extra_roots: &[String]) -> Result<Vec<SymbolId>, CodegenError> {
        let mut roots: Vec<SymbolId> = self
            .symbol_ids()
            .filter(|&id| {
                let symbol = self.symbol(id);
                let crate_external = symbol.visibility == Visibility::External
                    && self.module(symbol.module).kind == UnitKind::Crate;
                crate_external || symbol.is_kernel
            })
            .collect();

        for name in extra_roots {
            let id = self
                .lookup_external(name)
                .or_else(|| self.symbol_ids().find(|&id| self.symbol(id).name == *name))
                .ok_or_else(|| CodegenError::unresolved("<driver>", name))?;
            roots.push(id);
        }

        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    /// `module::name`, for logs and listings
    pub fn qualified_name(&self, id: SymbolId) -> String {
        let symbol = self.symbol(id);
        format!("{}::{}", self.module(symbol.module).name, symbol.name)
    }

    fn node_label(&self, node: NodeId) -> String {
        match node {
            NodeId::Symbol(id) => self.qualified_name(id),
            NodeId::Dispatch(id) => format!("<dyn {}>", self.dispatch_site(id).capability),
        }
    }
}

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.symbol_ids() {
            let symbol = self.symbol(id);
            write!(f, "{} {} [{}, {}]", symbol.kind, self.qualified_name(id), symbol.visibility, symbol.space)?;
            if symbol.is_kernel {
                write!(f, " kernel")?;
            }
            writeln!(f)?;
            for &next in self.successors(NodeId::Symbol(id)) {
                writeln!(f, "  -> {}", self.node_label(next))?;
            }
        }
        for (i, site) in self.dispatch.iter().enumerate() {
            writeln!(f, "dispatch <dyn {}>", site.capability)?;
            for &next in &self.dispatch_edges[i] {
                writeln!(f, "  -> {}", self.node_label(next))?;
            }
        }
        Ok(())
    }
}

/// Build the dependency graph of a session.
///
/// Symbol ids are assigned in unit order, then in symbol table order, so the
/// same inputs always give the same graph. With `parallel` set each unit's
/// manifest is resolved on the rayon pool.
pub fn build_graph(units: &[CompiledUnit], parallel: bool) -> Result<DependencyGraph, CodegenError> {
    let mut graph = DependencyGraph::default();
    let mut capabilities: BTreeMap<String, Vec<SymbolId>> = BTreeMap::new();

    for (index, unit) in units.iter().enumerate() {
        let module = ModuleId(index as u32);
        if graph.module_id(&unit.name).is_some() {
            return Err(CodegenError::internal(format!("unit `{}` was added twice", unit.name)));
        }

        let mut names = HashMap::new();
        let mut ids = Vec::with_capacity(unit.symbols.len());
        for entry in unit.symbols.iter() {
            let id = SymbolId(graph.symbols.len() as u32);
            if names.insert(entry.name.clone(), id).is_some() {
                return Err(CodegenError::internal(format!(
                    "symbol `{}` is defined twice in `{}`",
                    entry.name, unit.name
                )));
            }
            if entry.visibility == Visibility::External || entry.is_kernel {
                match graph.external_names.get(&entry.name) {
                    Some(&first) => graph.duplicate_externals.push((first, id)),
                    None => {
                        graph.external_names.insert(entry.name.clone(), id);
                    }
                }
            }
            for capability in &entry.implements {
                capabilities.entry(capability.clone()).or_default().push(id);
            }
            graph.symbols.push(GraphSymbol {
                name: entry.name.clone(),
                kind: entry.kind,
                space: entry.space,
                visibility: if entry.is_kernel { Visibility::External } else { entry.visibility },
                module,
                is_kernel: entry.is_kernel,
            });
            ids.push(id);
        }

        // capabilities dispatched on but never implemented still get a site
        for reference in unit.manifest.iter() {
            if let RefTarget::Dispatch(capability) = &reference.to {
                capabilities.entry(capability.clone()).or_default();
            }
        }

        graph.local_names.push(names);
        graph.modules.push(ModuleInfo {
            name: unit.name.clone(),
            kind: unit.kind,
            symbols: ids,
        });
    }

    for (index, (capability, implementations)) in capabilities.into_iter().enumerate() {
        graph.capabilities.insert(capability.clone(), DispatchId(index as u32));
        graph.dispatch_edges.push(implementations.iter().map(|&id| NodeId::Symbol(id)).collect());
        graph.dispatch.push(DispatchSite { capability, implementations });
    }

    let resolve_unit = |(index, unit): (usize, &CompiledUnit)| resolve_references(&graph, ModuleId(index as u32), unit);
    let resolved: Vec<Result<Vec<(SymbolId, NodeId)>, CodegenError>> = if parallel {
        units.par_iter().enumerate().map(resolve_unit).collect()
    } else {
        units.iter().enumerate().map(resolve_unit).collect()
    };

    let mut edges = vec![Vec::new(); graph.symbols.len()];
    for unit_edges in resolved {
        for (from, to) in unit_edges? {
            edges[from.index()].push(to);
        }
    }
    for list in &mut edges {
        list.sort();
        list.dedup();
    }
    graph.edges = edges;

    debug!(
        "dependency graph: {} modules, {} symbols, {} dispatch sites, {} edges",
        graph.modules.len(),
        graph.symbols.len(),
        graph.dispatch.len(),
        graph.edge_count()
    );
    Ok(graph)
}

fn resolve_references(
    graph: &DependencyGraph,
    module: ModuleId,
    unit: &CompiledUnit,
) -> Result<Vec<(SymbolId, NodeId)>, CodegenError> {
    let local = &graph.local_names[module.index()];
    unit.manifest
        .iter()
        .map(|reference| {
            let from = local.get(&reference.from).copied().ok_or_else(|| {
                CodegenError::internal(format!(
                    "manifest of `{}` lists a reference from `{}`, which it does not define",
                    unit.name, reference.from
                ))
            })?;
            let to = match &reference.to {
                RefTarget::Symbol(name) => graph
                    .resolve(module, name)
                    .map(NodeId::Symbol)
                    .ok_or_else(|| CodegenError::unresolved(&reference.from, name))?,
                RefTarget::Dispatch(capability) => graph
                    .capability(capability)
                    .map(NodeId::Dispatch)
                    .ok_or_else(|| CodegenError::internal(format!("no dispatch site for `{capability}`")))?,
            };
            Ok((from, to))
        })
        .collect()
}
