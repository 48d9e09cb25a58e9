//! Compiled units
//!
//! What the front-end serializer hands over for every crate: a symbol table,
//! a reference manifest, and (separately, through a `BitcodeSource`) the
//! bitcode blob. The symbol table and manifest are cheap to read and are
//! enough to build the whole dependency graph.

use nvcg_common::{AddressSpace, SymbolKind, UnitKind, Visibility};
use nvcg_ir::Module;
use serde::{Deserialize, Serialize};

/// One defined symbol of a compiled unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub space: AddressSpace,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_kernel: bool,
    /// Dispatch capabilities this function implements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
}

impl SymbolEntry {
    pub fn function(name: &str, visibility: Visibility) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Function,
            space: AddressSpace::Generic,
            visibility,
            is_kernel: false,
            implements: Vec::new(),
        }
    }

    pub fn global(name: &str, space: AddressSpace, visibility: Visibility) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::GlobalVariable,
            space,
            visibility,
            is_kernel: false,
            implements: Vec::new(),
        }
    }

    /// A kernel entry point. Kernels are always externally visible.
    pub fn kernel(name: &str) -> Self {
        Self {
            is_kernel: true,
            ..Self::function(name, Visibility::External)
        }
    }

    pub fn implementing(mut self, capability: &str) -> Self {
        self.implements.push(capability.to_string());
        self
    }
}

/// Per-unit record of defined functions and globals
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: SymbolEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefTarget {
    /// A named function or global
    Symbol(String),
    /// Every implementation of a dynamically dispatched capability
    Dispatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Referencing symbol, defined in the same unit
    pub from: String,
    pub to: RefTarget,
}

/// Names referenced by each symbol's body, independent of the bitcode
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceManifest {
    references: Vec<Reference>,
}

impl ReferenceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol_ref(&mut self, from: &str, to: &str) {
        self.references.push(Reference {
            from: from.to_string(),
            to: RefTarget::Symbol(to.to_string()),
        });
    }

    pub fn add_dispatch_ref(&mut self, from: &str, capability: &str) {
        self.references.push(Reference {
            from: from.to_string(),
            to: RefTarget::Dispatch(capability.to_string()),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Everything known about a crate before its bitcode is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub name: String,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default)]
    pub symbols: SymbolTable,
    #[serde(default)]
    pub manifest: ReferenceManifest,
}

impl CompiledUnit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: UnitKind::Crate,
            symbols: SymbolTable::new(),
            manifest: ReferenceManifest::new(),
        }
    }

    pub fn library(name: &str) -> Self {
        Self {
            kind: UnitKind::Library,
            ..Self::new(name)
        }
    }

    pub fn with_symbol(mut self, entry: SymbolEntry) -> Self {
        self.symbols.add(entry);
        self
    }

    pub fn with_ref(mut self, from: &str, to: &str) -> Self {
        self.manifest.add_symbol_ref(from, to);
        self
    }

    pub fn with_dispatch(mut self, from: &str, capability: &str) -> Self {
        self.manifest.add_dispatch_ref(from, capability);
        self
    }

    /// Derive the symbol table and reference manifest from a module body,
    /// the way the front-end serializer does when it writes a crate out.
    pub fn describe(module: &Module, kind: UnitKind) -> Self {
        let mut unit = CompiledUnit {
            kind,
            ..CompiledUnit::new(&module.name)
        };

        for function in module.functions.iter().filter(|f| !f.is_declaration()) {
            unit.symbols.add(SymbolEntry {
                name: function.name.clone(),
                kind: SymbolKind::Function,
                space: AddressSpace::Generic,
                visibility: function.visibility,
                is_kernel: function.is_kernel,
                implements: function.implements.clone(),
            });
            for target in function.referenced_symbols() {
                unit.manifest.add_symbol_ref(&function.name, &target);
            }
            for capability in function.dispatched_capabilities() {
                unit.manifest.add_dispatch_ref(&function.name, &capability);
            }
        }

        for global in &module.globals {
            unit.symbols.add(SymbolEntry::global(&global.name, global.space, global.visibility));
            if let Some(target) = global.initializer.as_ref().and_then(|init| init.symbol_name()) {
                unit.manifest.add_symbol_ref(&global.name, target);
            }
        }

        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvcg_ir::{GlobalVariable, IrBuilder, IrType, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unit_builder() {
        let unit = CompiledUnit::new("app")
            .with_symbol(SymbolEntry::kernel("kernel_main"))
            .with_symbol(SymbolEntry::function("helper", Visibility::Internal))
            .with_ref("kernel_main", "helper");

        assert_eq!(unit.kind, UnitKind::Crate);
        assert_eq!(unit.symbols.len(), 2);
        assert!(unit.symbols.get("kernel_main").unwrap().is_kernel);
        assert_eq!(unit.symbols.get("kernel_main").unwrap().visibility, Visibility::External);
        assert_eq!(unit.manifest.len(), 1);
    }

    #[test]
    fn test_describe_module() {
        let mut builder = IrBuilder::new();
        builder.create_function("kernel_main", IrType::Void);
        builder.create_block().unwrap();
        builder.build_store(Value::Constant(1), Value::Global("counter".to_string())).unwrap();
        builder.build_call("helper", vec![], IrType::Void).unwrap();
        builder.build_dispatch("Shape::area", Value::Undef, vec![], IrType::F32).unwrap();
        builder.build_return(None).unwrap();
        let mut kernel = builder.finish_function().unwrap();
        kernel.is_kernel = true;
        kernel.visibility = Visibility::External;

        let mut module = Module::new("app".to_string());
        module.add_function(kernel);
        module.add_function(nvcg_ir::Function::new("external_decl".to_string(), IrType::Void));
        module.add_global(GlobalVariable::new("counter", IrType::I32, AddressSpace::Global));

        let unit = CompiledUnit::describe(&module, UnitKind::Crate);
        assert_eq!(unit.name, "app");
        assert_eq!(unit.symbols.len(), 2);
        assert!(unit.symbols.get("external_decl").is_none());
        assert_eq!(unit.symbols.get("counter").unwrap().space, AddressSpace::Global);

        let refs: Vec<&RefTarget> = unit.manifest.iter().map(|r| &r.to).collect();
        assert_eq!(
            refs,
            vec![
                &RefTarget::Symbol("counter".to_string()),
                &RefTarget::Symbol("helper".to_string()),
                &RefTarget::Dispatch("Shape::area".to_string()),
            ]
        );
    }

    #[test]
    fn test_unit_json_shape() {
        let json = r#"{
            "name": "libdevice",
            "kind": "library",
            "symbols": [
                { "name": "__nv_sinf", "kind": "function", "visibility": "external" },
                { "name": "table", "kind": "global_variable", "space": "constant" }
            ],
            "manifest": [
                { "from": "__nv_sinf", "to": { "symbol": "table" } }
            ]
        }"#;
        let unit: CompiledUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit.kind, UnitKind::Library);
        assert_eq!(unit.symbols.get("table").unwrap().space, AddressSpace::Constant);
        assert_eq!(unit.symbols.get("table").unwrap().visibility, Visibility::Internal);
        assert_eq!(unit.manifest.len(), 1);
    }
}
