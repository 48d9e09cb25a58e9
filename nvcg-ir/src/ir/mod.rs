//! Body IR for GPU bitcode
//! 
//! ## Architecture
//! 
//! - `types` - Type system (IrType with address-space tagged pointers)
//! - `values` - Value representations
//! - `ops` - Binary operations
//! - `instructions` - IR instructions, including address space conversions
//! - `blocks` - Basic block management
//! - `function` - Function definitions
//! - `module` - Module and global variables
//! - `builder` - IR construction utilities

pub use self::types::IrType;
pub use self::values::Value;
pub use self::ops::IrBinaryOp;
pub use self::instructions::Instruction;
pub use self::blocks::BasicBlock;
pub use self::function::Function;
pub use self::module::{Module, GlobalVariable};
pub use self::builder::IrBuilder;

mod types;
mod values;
mod ops;
mod instructions;
mod blocks;
mod function;
mod module;
mod builder;
