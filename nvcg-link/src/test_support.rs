//! Helpers shared by the unit tests

use crate::dce::{eliminate, DceResult};
use crate::graph::{build_graph, DependencyGraph};
use crate::loader::LazyModuleLoader;
use crate::options::LinkOptions;
use crate::source::InMemorySource;
use crate::unit::CompiledUnit;
use nvcg_common::{UnitKind, Visibility};
use nvcg_ir::{encode_module, Function, IrBuilder, IrType, Module};
use std::sync::Arc;

/// A void function whose body calls each of `calls` in order
pub fn function(name: &str, visibility: Visibility, calls: &[&str]) -> Function {
    let mut builder = IrBuilder::new();
    builder.create_function(name, IrType::Void);
    builder.create_block().unwrap();
    for callee in calls {
        builder.build_call(callee, vec![], IrType::Void).unwrap();
    }
    builder.build_return(None).unwrap();
    let mut function = builder.finish_function().unwrap();
    function.visibility = visibility;
    function
}

pub fn kernel(name: &str, calls: &[&str]) -> Function {
    let mut function = function(name, Visibility::External, calls);
    function.is_kernel = true;
    function
}

/// Describe and encode every module
pub fn compile(modules: &[(Module, UnitKind)]) -> (Vec<CompiledUnit>, InMemorySource) {
    let mut source = InMemorySource::new();
    let units = modules
        .iter()
        .map(|(module, kind)| {
            source.insert(&module.name, encode_module(module).unwrap());
            CompiledUnit::describe(module, *kind)
        })
        .collect();
    (units, source)
}

/// Graph, loader and traversal result for the default root set
pub fn analyze(modules: Vec<(Module, UnitKind)>, options: &LinkOptions) -> (DependencyGraph, LazyModuleLoader, DceResult) {
    let (units, source) = compile(&modules);
    let graph = build_graph(&units, options.parallel).unwrap();
    let loader = LazyModuleLoader::for_graph(Arc::new(source), &graph);
    let roots = graph.root_set(&options.extra_roots).unwrap();
    let dce = eliminate(&graph, &loader, options, &roots).unwrap();
    (graph, loader, dce)
}
