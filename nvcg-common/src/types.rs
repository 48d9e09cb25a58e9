//! Common types used throughout the link core
//!
//! This module defines the tags and identifiers that are shared between the
//! IR, the dependency graph and the linker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Temporary value identifier inside a function body
pub type TempId = u32;

/// Basic block label identifier
pub type LabelId = u32;

/// Dense index of a module (compiled unit) within one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Dense index of a symbol within one dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// GPU memory segment a pointer or global lives in.
///
/// The numbering follows NVVM IR: generic is 0, global 1, shared 3,
/// constant 4 and local 5 (2 is unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSpace {
    #[default]
    Generic,
    Global,
    Shared,
    Constant,
    Local,
}

impl AddressSpace {
    /// Every non-generic space
    pub const SPECIFIC: [AddressSpace; 4] = [
        AddressSpace::Global,
        AddressSpace::Shared,
        AddressSpace::Constant,
        AddressSpace::Local,
    ];

    /// The `addrspace(N)` number used in NVVM IR
    pub fn nvvm_id(self) -> u32 {
        match self {
            AddressSpace::Generic => 0,
            AddressSpace::Global => 1,
            AddressSpace::Shared => 3,
            AddressSpace::Constant => 4,
            AddressSpace::Local => 5,
        }
    }

    pub fn from_nvvm_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(AddressSpace::Generic),
            1 => Some(AddressSpace::Global),
            3 => Some(AddressSpace::Shared),
            4 => Some(AddressSpace::Constant),
            5 => Some(AddressSpace::Local),
            _ => None,
        }
    }

    pub fn is_generic(self) -> bool {
        self == AddressSpace::Generic
    }

    pub fn is_specific(self) -> bool {
        !self.is_generic()
    }

    /// Whether a global in this space gets storage on the host side.
    /// Shared memory is block-scoped and local memory is per-thread, so
    /// neither has a host-visible counterpart.
    pub fn has_host_storage(self) -> bool {
        !matches!(self, AddressSpace::Shared | AddressSpace::Local)
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Generic => write!(f, "generic"),
            AddressSpace::Global => write!(f, "global"),
            AddressSpace::Shared => write!(f, "shared"),
            AddressSpace::Constant => write!(f, "constant"),
            AddressSpace::Local => write!(f, "local"),
        }
    }
}

/// What a symbol names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    GlobalVariable,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::GlobalVariable => write!(f, "global"),
        }
    }
}

/// Symbol visibility across module boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Part of the externally visible ABI; the name is preserved verbatim
    External,
    /// Only visible within the defining module
    #[default]
    Internal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::External => write!(f, "external"),
            Visibility::Internal => write!(f, "internal"),
        }
    }
}

/// Flavor of a compiled unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// A crate of the program being compiled. Its external symbols are roots.
    #[default]
    Crate,
    /// A support library (libdevice, intrinsics). Only linked where referenced.
    Library,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Crate => write!(f, "crate"),
            UnitKind::Library => write!(f, "library"),
        }
    }
}
