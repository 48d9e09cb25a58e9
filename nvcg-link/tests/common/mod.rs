//! Program builders shared by the integration tests

#![allow(dead_code)]

use nvcg_common::{UnitKind, Visibility};
use nvcg_ir::{encode_module, Function, IrBuilder, IrType, Module};
use nvcg_link::{BitcodeSource, CompilationSession, CompiledUnit, InMemorySource, LinkOptions};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A void function whose body calls each of `calls`
pub fn func(name: &str, visibility: Visibility, calls: &[&str]) -> Function {
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
    let mut function = func(name, Visibility::External, calls);
    function.is_kernel = true;
    function
}

pub fn module(name: &str, functions: Vec<Function>) -> Module {
    let mut module = Module::new(name.to_string());
    for function in functions {
        module.add_function(function);
    }
    module
}

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

pub fn session_with_source(
    units: Vec<CompiledUnit>,
    source: Arc<dyn BitcodeSource>,
    options: LinkOptions,
) -> CompilationSession {
    let mut session = CompilationSession::new(source, options);
    for unit in units {
        session.add_unit(unit);
    }
    session
}

pub fn session(modules: &[(Module, UnitKind)], options: LinkOptions) -> CompilationSession {
    let (units, source) = compile(modules);
    session_with_source(units, Arc::new(source), options)
}

/// Counts every read and sleeps a little on each, so concurrent readers
/// of the same unit actually overlap
pub struct CountingSource {
    inner: InMemorySource,
    reads: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl CountingSource {
    pub fn new(inner: InMemorySource, delay: Duration) -> Self {
        Self {
            inner,
            reads: Mutex::new(HashMap::new()),
            delay,
        }
    }

    pub fn reads(&self, unit: &str) -> usize {
        self.reads.lock().unwrap().get(unit).copied().unwrap_or(0)
    }
}

impl BitcodeSource for CountingSource {
    fn read(&self, unit: &str) -> io::Result<Vec<u8>> {
        *self.reads.lock().unwrap().entry(unit.to_string()).or_default() += 1;
        std::thread::sleep(self.delay);
        self.inner.read(unit)
    }
}
