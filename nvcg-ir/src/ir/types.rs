//! IR Type System
//!
//! Integer and float scalars, arrays, structs, functions, and pointers.
//! Every pointer type carries the address space of the memory it points
//! into.

use nvcg_common::AddressSpace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR Type system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrType {
    Void,
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,

    /// Pointer into one address space
    Ptr {
        pointee: Box<IrType>,
        space: AddressSpace,
    },

    /// Array type [size x element_type]
    Array { size: u64, element_type: Box<IrType> },

    Function {
        return_type: Box<IrType>,
        param_types: Vec<IrType>,
        is_vararg: bool,
    },

    Struct {
        name: Option<String>,
        fields: Vec<IrType>,
        packed: bool,
    },

    /// Label type (for basic block addresses)
    Label,
}

impl IrType {
    pub fn ptr(pointee: IrType, space: AddressSpace) -> Self {
        IrType::Ptr {
            pointee: Box::new(pointee),
            space,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::I1 | IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr { .. })
    }

    /// Address space of a pointer type, `None` for everything else
    pub fn address_space(&self) -> Option<AddressSpace> {
        match self {
            IrType::Ptr { space, .. } => Some(*space),
            _ => None,
        }
    }

    /// The same pointer type retagged into another space.
    /// Non-pointer types are returned unchanged.
    pub fn with_address_space(&self, space: AddressSpace) -> IrType {
        match self {
            IrType::Ptr { pointee, .. } => IrType::Ptr {
                pointee: pointee.clone(),
                space,
            },
            other => other.clone(),
        }
    }

    pub fn element_type(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr { pointee, .. } => Some(pointee),
            IrType::Array { element_type, .. } => Some(element_type),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "float"),
            IrType::F64 => write!(f, "double"),
            IrType::Ptr { pointee, space: AddressSpace::Generic } => write!(f, "{pointee}*"),
            IrType::Ptr { pointee, space } => write!(f, "{pointee} addrspace({})*", space.nvvm_id()),
            IrType::Array { size, element_type } => write!(f, "[{size} x {element_type}]"),
            IrType::Function { return_type, param_types, is_vararg } => {
                write!(f, "{return_type} (")?;
                for (i, param) in param_types.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{param}")?;
                }
                if *is_vararg { write!(f, ", ...")?; }
                write!(f, ")")
            }
            IrType::Struct { name: Some(name), .. } => write!(f, "%{name}"),
            IrType::Struct { name: None, fields, packed } => {
                let (open, close) = if *packed { ("<{", "}>") } else { ("{", "}") };
                write!(f, "{open} ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{field}")?;
                }
                write!(f, " {close}")
            }
            IrType::Label => write!(f, "label"),
        }
    }
}
