//! Module linker
//!
//! Merges the reached definitions into a single output module:
//! - external names are kept verbatim, internal ones are prefixed with their
//!   mangled module name (plus a `.N` suffix if that still collides),
//! - every symbol reference in a body is rewritten to its output name,
//! - only kernels and externally visible crate functions keep external
//!   linkage; every global is internalized,
//! - the output is checked for dangling references before it is handed on.

use crate::dce::{DceResult, Materialized};
use crate::addrspace::SegmentMap;
use crate::graph::{DependencyGraph, DispatchId};
use crate::options::LinkOptions;
use log::{debug, info};
use nvcg_common::{CodegenError, ModuleId, SymbolId, SymbolKind, UnitKind, Visibility};
use nvcg_ir::{Module, Value};
use std::collections::{HashMap, HashSet};

/// The single linked module and what the host side needs to know about it
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedModule {
    pub module: Module,
    /// Kernel entry points, by output name
    pub kernels: Vec<String>,
    /// Externally visible functions: kernels plus exported device functions
    pub abi_surface: Vec<String>,
    /// Globals that get host-side storage
    pub host_globals: Vec<String>,
    /// Shared and local globals, which are block or thread scoped
    pub block_scoped: Vec<String>,
    /// Segment placement the backend lowers checked conversions and
    /// segment tests against
    pub segments: SegmentMap,
}

/// Prefix for the internal symbols of `module`
pub fn mangle_module(module: &str) -> String {
    format!("{}__", module.replace(['.', '-'], "_"))
}

/// Whether a symbol keeps external linkage in the output
fn is_exported(graph: &DependencyGraph, id: SymbolId) -> bool {
    let symbol = graph.symbol(id);
    match symbol.kind {
        SymbolKind::GlobalVariable => false,
        SymbolKind::Function => {
            symbol.is_kernel
                || (symbol.visibility == Visibility::External && graph.module(symbol.module).kind == UnitKind::Crate)
        }
    }
}

pub fn link(graph: &DependencyGraph, dce: &DceResult, options: &LinkOptions) -> Result<LinkedModule, CodegenError> {
    if let Some(&(first, second)) = graph.duplicate_externals().first() {
        let module_of = |id: SymbolId| graph.module(graph.symbol(id).module).name.as_str();
        return Err(CodegenError::duplicate_external(
            &graph.symbol(first).name,
            module_of(first),
            module_of(second),
        ));
    }

    let reachable = dce.reachable_symbols();
    let names = assign_names(graph, &reachable);
    let output_name_of = |id: SymbolId| -> Result<&String, CodegenError> {
        names
            .get(&id)
            .ok_or_else(|| CodegenError::internal(format!("no output name for {}", graph.qualified_name(id))))
    };
    let rename = |module: ModuleId, referencing: &str, value: &mut Value| -> Result<(), CodegenError> {
        if let Some(name) = value.symbol_name_mut() {
            let target = graph
                .resolve(module, name)
                .filter(|&target| dce.is_reachable(target))
                .ok_or_else(|| CodegenError::unresolved(referencing, name.as_str()))?;
            *name = output_name_of(target)?.clone();
        }
        Ok(())
    };

    let mut output = Module::new(options.output_name.clone());
    let mut linked = LinkedModule {
        module: Module::default(),
        kernels: Vec::new(),
        abi_surface: Vec::new(),
        host_globals: Vec::new(),
        block_scoped: Vec::new(),
        segments: options.segments,
    };

    for &id in &reachable {
        let symbol = graph.symbol(id);
        let out_name = output_name_of(id)?.clone();
        let linkage = if is_exported(graph, id) { Visibility::External } else { Visibility::Internal };
        let body = dce
            .body(id)
            .ok_or_else(|| CodegenError::internal(format!("{} is reachable but was never loaded", graph.qualified_name(id))))?;

        match body {
            Materialized::Function(verified) => {
                let mut function = verified.function.clone();
                function.name = out_name.clone();
                function.visibility = linkage;
                for instr in function.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut()) {
                    for operand in instr.operands_mut() {
                        rename(symbol.module, &symbol.name, operand)?;
                    }
                }
                if function.is_kernel {
                    linked.kernels.push(out_name.clone());
                }
                if linkage == Visibility::External {
                    linked.abi_surface.push(out_name.clone());
                    if !function.is_kernel {
                        output.used.push(out_name);
                    }
                }
                output.add_function(function);
            }
            Materialized::Global(global) => {
                let mut global = global.clone();
                global.name = out_name.clone();
                global.visibility = linkage;
                if let Some(init) = global.initializer.as_mut() {
                    rename(symbol.module, &symbol.name, init)?;
                }
                if global.space.has_host_storage() {
                    linked.host_globals.push(out_name);
                } else {
                    linked.block_scoped.push(out_name);
                }
                output.add_global(global);
            }
        }
    }

    for (index, site) in graph.dispatch_sites().iter().enumerate() {
        if !dce.is_dispatch_reachable(DispatchId(index as u32)) {
            continue;
        }
        let implementations = site
            .implementations
            .iter()
            .map(|&id| output_name_of(id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        output.dispatch_tables.insert(site.capability.clone(), implementations);
    }

    pre_verify(&output)?;

    info!(
        "linked '{}': {} functions, {} globals, {} kernels",
        output.name,
        output.functions.len(),
        output.globals.len(),
        linked.kernels.len()
    );
    linked.module = output;
    Ok(linked)
}

/// Output names for every reachable symbol. Externals are claimed first so
/// an internal symbol never takes an ABI name.
fn assign_names(graph: &DependencyGraph, reachable: &[SymbolId]) -> HashMap<SymbolId, String> {
    let mut names = HashMap::with_capacity(reachable.len());
    let mut taken: HashSet<String> = HashSet::new();

    for &id in reachable {
        let symbol = graph.symbol(id);
        if symbol.visibility == Visibility::External {
            taken.insert(symbol.name.clone());
            names.insert(id, symbol.name.clone());
        }
    }

    for &id in reachable {
        let symbol = graph.symbol(id);
        if symbol.visibility == Visibility::External {
            continue;
        }
        let base = format!("{}{}", mangle_module(&graph.module(symbol.module).name), symbol.name);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while !taken.insert(candidate.clone()) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        if suffix > 1 {
            debug!("renamed {} to {} to avoid a collision", graph.qualified_name(id), candidate);
        }
        names.insert(id, candidate);
    }

    names
}

/// Every name referenced in the output must be defined exactly once
fn pre_verify(module: &Module) -> Result<(), CodegenError> {
    let mut defined = HashSet::new();
    let all_names = module
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .chain(module.globals.iter().map(|g| g.name.as_str()));
    for name in all_names {
        if !defined.insert(name) {
            return Err(CodegenError::internal(format!("`{name}` is defined twice in the linked module")));
        }
    }

    for function in &module.functions {
        for name in function.referenced_symbols() {
            if !defined.contains(name.as_str()) {
                return Err(CodegenError::unresolved(&function.name, &name));
            }
        }
    }
    for global in &module.globals {
        if let Some(name) = global.initializer.as_ref().and_then(Value::symbol_name) {
            if !defined.contains(name) {
                return Err(CodegenError::unresolved(&global.name, name));
            }
        }
    }
    for (capability, implementations) in &module.dispatch_tables {
        if let Some(missing) = implementations.iter().find(|name| !defined.contains(name.as_str())) {
            return Err(CodegenError::unresolved(capability, missing));
        }
    }
    Ok(())
}
