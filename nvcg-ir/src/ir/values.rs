//! IR Value Representations
//!
//! Operands of IR instructions: temporaries, constants, and references to
//! module-level symbols. Symbol references are by name; the linker rewrites
//! them when it renames internal symbols.

use nvcg_common::{AddressSpace, TempId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR Value - represents operands in IR instructions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Temporary variable
    Temp(TempId),

    /// Constant integer
    Constant(i64),

    /// Address of a global variable
    Global(String),

    /// Address of a function
    Function(String),

    /// Array of constant values (for initializers)
    ConstantArray(Vec<i64>),

    /// Null pointer in the given space
    Null(AddressSpace),

    Undef,
}

impl Value {
    /// Name of the module-level symbol this value refers to
    pub fn symbol_name(&self) -> Option<&str> {
        match self {
            Value::Global(name) | Value::Function(name) => Some(name),
            _ => None,
        }
    }

    pub fn symbol_name_mut(&mut self) -> Option<&mut String> {
        match self {
            Value::Global(name) | Value::Function(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(id) => write!(f, "%{id}"),
            Value::Constant(val) => write!(f, "{val}"),
            Value::Global(name) => write!(f, "@{name}"),
            Value::Function(name) => write!(f, "@{name}"),
            Value::ConstantArray(values) => {
                write!(f, "[")?;
                for (i, val) in values.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{val}")?;
                }
                write!(f, "]")
            }
            Value::Null(AddressSpace::Generic) => write!(f, "null"),
            Value::Null(space) => write!(f, "null addrspace({})", space.nvvm_id()),
            Value::Undef => write!(f, "undef"),
        }
    }
}
