//! NVVM Codegen link core
//!
//! Takes the compiled units of a multi-crate GPU program and produces one
//! linked, dead-code-eliminated module:
//!
//! 1. `graph` builds the dependency graph from symbol tables and reference
//!    manifests alone, without reading any bitcode.
//! 2. `dce` walks the graph from the root set, pulling module bodies in
//!    through the `loader` only when a symbol in them is reached, and runs
//!    the `addrspace` verifier on every body it pulls in.
//! 3. `linker` merges the reached definitions into the output module.
//!
//! `CompilationSession` drives the three steps.

pub mod addrspace;
pub mod dce;
pub mod graph;
pub mod linker;
pub mod loader;
pub mod manifest;
pub mod options;
pub mod session;
pub mod source;
pub mod unit;

#[cfg(test)]
mod test_support;

pub use addrspace::{AddressSpaceVerifier, GenericPtr, SegmentMap, SpaceLookup, SpecificPtr, VerifiedFunction};
pub use dce::{eliminate, DceEngine, DceResult, Materialized, Reachability, TraversalFailure};
pub use graph::{build_graph, DependencyGraph, DispatchId, GraphSymbol, NodeId};
pub use linker::{link, mangle_module, LinkedModule};
pub use loader::LazyModuleLoader;
pub use manifest::{SessionManifest, UnitEntry};
pub use options::LinkOptions;
pub use session::{Analysis, CompilationSession, SessionOutput, SessionStats};
pub use source::{BitcodeSource, FileSource, InMemorySource};
pub use unit::{CompiledUnit, RefTarget, Reference, ReferenceManifest, SymbolEntry, SymbolTable};
