//! NVVM Codegen - Intermediate Representation
//! 
//! This crate defines the body IR carried inside each compiled unit's
//! bitcode blob, and the container format used to serialize it. Function
//! bodies are only materialized from bitcode when the link core proves
//! they are needed.

pub mod ir;
pub mod bitcode;

pub use ir::{
    Module, Function, BasicBlock, Instruction, Value, IrType,
    IrBinaryOp, GlobalVariable, IrBuilder
};
pub use bitcode::{
    decode_module, encode_module, encode_module_with_version, peek_version,
    BitcodeError, IrVersion, CURRENT_IR_VERSION, MIN_IR_VERSION
};
