//! Module and Global Variables
//!
//! A `Module` is the body of one compiled unit once it has been loaded from
//! bitcode, and also the shape of the single linked output module.

use nvcg_common::{AddressSpace, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use crate::ir::{Function, IrType, Value};

/// Global variable definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub var_type: IrType,
    /// Segment the variable is allocated in. Defaults to generic unless the
    /// source annotated it.
    #[serde(default)]
    pub space: AddressSpace,
    pub is_constant: bool,
    pub initializer: Option<Value>,
    pub visibility: Visibility,
}

impl GlobalVariable {
    pub fn new(name: &str, var_type: IrType, space: AddressSpace) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            space,
            is_constant: false,
            initializer: None,
            visibility: Visibility::Internal,
        }
    }

    pub fn with_initializer(mut self, value: Value) -> Self {
        self.initializer = Some(value);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_constant = true;
        self
    }
}

/// IR Module - a compilation unit body, or the linked output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
    /// Functions marked `#[externally_visible]` that must keep external
    /// linkage without being kernels
    #[serde(default)]
    pub used: Vec<String>,
    /// Capability name to the implementations a dispatch may reach.
    /// Only populated on linked output.
    #[serde(default)]
    pub dispatch_tables: BTreeMap<String, Vec<String>>,
}

impl Module {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn add_global(&mut self, global: GlobalVariable) {
        self.globals.push(global);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Kernel entry points defined in this module
    pub fn kernels(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| f.is_kernel)
    }

    pub fn defines(&self, name: &str) -> bool {
        self.get_function(name).is_some() || self.get_global(name).is_some()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for global in &self.globals {
            write!(
                f,
                "@{} = {} addrspace({}) {} {}",
                global.name,
                global.visibility,
                global.space.nvvm_id(),
                if global.is_constant { "constant" } else { "global" },
                global.var_type
            )?;
            match &global.initializer {
                Some(init) => writeln!(f, " {init}")?,
                None => writeln!(f)?,
            }
        }
        for function in &self.functions {
            let keyword = if function.is_declaration() { "declare" } else { "define" };
            write!(f, "\n{keyword} {} {} @{}(", function.visibility, function.return_type, function.name)?;
            for (i, (id, ty)) in function.parameters.iter().enumerate() {
                if i > 0 { write!(f, ", ")?; }
                write!(f, "{ty} %{id}")?;
            }
            write!(f, ")")?;
            if function.is_declaration() {
                writeln!(f)?;
                continue;
            }
            writeln!(f, " {{")?;
            for block in &function.blocks {
                writeln!(f, "L{}:", block.id)?;
                for instr in &block.instructions {
                    writeln!(f, "  {instr}")?;
                }
            }
            writeln!(f, "}}")?;
        }
        let kernels: Vec<&str> = self.kernels().map(|k| k.name.as_str()).collect();
        if !kernels.is_empty() {
            writeln!(f, "\n; kernels: {}", kernels.join(", "))?;
        }
        for (capability, impls) in &self.dispatch_tables {
            writeln!(f, "; dispatch <{}>: {}", capability, impls.join(", "))?;
        }
        Ok(())
    }
}
