//! IR Instructions
//!
//! Alongside the usual memory, arithmetic and control flow instructions the
//! body IR has three address space operations:
//! - `AddrSpaceCast` is the explicit conversion between the generic space
//!   and a specific one; every other cross-space pointer change is invalid.
//! - `CheckedAddrSpaceCast` is what the verifier lowers a generic to
//!   specific conversion into when it cannot prove where the pointer came
//!   from. The backend emits it as an `isspacep` test followed by a trap.
//! - `IsInAddressSpace` is the runtime segment test.

use nvcg_common::{AddressSpace, LabelId, SourceLocation, TempId};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::ir::{IrBinaryOp, IrType, Value};

/// IR Instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Binary operation: result = op lhs, rhs
    Binary {
        result: TempId,
        op: IrBinaryOp,
        lhs: Value,
        rhs: Value,
        result_type: IrType,
    },

    /// Load from memory: result = load ptr
    Load {
        result: TempId,
        ptr: Value,
        result_type: IrType,
    },

    /// Store to memory: store value, ptr
    Store {
        value: Value,
        ptr: Value,
    },

    /// Pointer arithmetic. The result stays in the base pointer's space.
    GetElementPtr {
        result: TempId,
        ptr: Value,
        indices: Vec<Value>,
        result_type: IrType,
    },

    /// Per-thread stack allocation; the result points into local memory
    Alloca {
        result: TempId,
        alloc_type: IrType,
        count: Option<Value>,
        result_type: IrType,
    },

    /// Direct call: result = call func(args...)
    Call {
        result: Option<TempId>,
        function: Value,
        args: Vec<Value>,
        result_type: IrType,
    },

    /// Call through a dynamically dispatched capability (a trait method
    /// invoked on a trait object). The concrete callee is any
    /// implementation of `capability`.
    DispatchCall {
        result: Option<TempId>,
        capability: String,
        receiver: Value,
        args: Vec<Value>,
        result_type: IrType,
    },

    /// Explicit conversion between the generic space and `target`
    AddrSpaceCast {
        result: TempId,
        ptr: Value,
        target: AddressSpace,
        result_type: IrType,
    },

    /// Generic to specific conversion guarded by a runtime segment check
    CheckedAddrSpaceCast {
        result: TempId,
        ptr: Value,
        target: AddressSpace,
        result_type: IrType,
    },

    /// result = (ptr lies in the segment of space) as i1
    IsInAddressSpace {
        result: TempId,
        ptr: Value,
        space: AddressSpace,
    },

    /// Bit-level or numeric cast: result = cast value to target_type
    Cast {
        result: TempId,
        value: Value,
        target_type: IrType,
    },

    Select {
        result: TempId,
        condition: Value,
        true_value: Value,
        false_value: Value,
        result_type: IrType,
    },

    Phi {
        result: TempId,
        incoming: Vec<(Value, LabelId)>,
        result_type: IrType,
    },

    Return(Option<Value>),

    Branch(LabelId),

    BranchCond {
        condition: Value,
        true_label: LabelId,
        false_label: LabelId,
    },

    /// Debug location for the instructions that follow
    DebugLoc {
        location: SourceLocation,
    },

    Comment(String),
}

impl Instruction {
    /// The temporary this instruction defines
    pub fn result(&self) -> Option<TempId> {
        match self {
            Instruction::Binary { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::GetElementPtr { result, .. }
            | Instruction::Alloca { result, .. }
            | Instruction::AddrSpaceCast { result, .. }
            | Instruction::CheckedAddrSpaceCast { result, .. }
            | Instruction::IsInAddressSpace { result, .. }
            | Instruction::Cast { result, .. }
            | Instruction::Select { result, .. }
            | Instruction::Phi { result, .. } => Some(*result),
            Instruction::Call { result, .. } | Instruction::DispatchCall { result, .. } => *result,
            _ => None,
        }
    }

    /// Every value operand, in order
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Load { ptr, .. }
            | Instruction::AddrSpaceCast { ptr, .. }
            | Instruction::CheckedAddrSpaceCast { ptr, .. }
            | Instruction::IsInAddressSpace { ptr, .. } => vec![ptr],
            Instruction::Store { value, ptr } => vec![value, ptr],
            Instruction::GetElementPtr { ptr, indices, .. } => {
                std::iter::once(ptr).chain(indices.iter()).collect()
            }
            Instruction::Alloca { count, .. } => count.iter().collect(),
            Instruction::Call { function, args, .. } => {
                std::iter::once(function).chain(args.iter()).collect()
            }
            Instruction::DispatchCall { receiver, args, .. } => {
                std::iter::once(receiver).chain(args.iter()).collect()
            }
            Instruction::Cast { value, .. } => vec![value],
            Instruction::Select { condition, true_value, false_value, .. } => {
                vec![condition, true_value, false_value]
            }
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(value, _)| value).collect(),
            Instruction::Return(value) => value.iter().collect(),
            Instruction::BranchCond { condition, .. } => vec![condition],
            Instruction::Branch(_) | Instruction::DebugLoc { .. } | Instruction::Comment(_) => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Instruction::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Load { ptr, .. }
            | Instruction::AddrSpaceCast { ptr, .. }
            | Instruction::CheckedAddrSpaceCast { ptr, .. }
            | Instruction::IsInAddressSpace { ptr, .. } => vec![ptr],
            Instruction::Store { value, ptr } => vec![value, ptr],
            Instruction::GetElementPtr { ptr, indices, .. } => {
                std::iter::once(ptr).chain(indices.iter_mut()).collect()
            }
            Instruction::Alloca { count, .. } => count.iter_mut().collect(),
            Instruction::Call { function, args, .. } => {
                std::iter::once(function).chain(args.iter_mut()).collect()
            }
            Instruction::DispatchCall { receiver, args, .. } => {
                std::iter::once(receiver).chain(args.iter_mut()).collect()
            }
            Instruction::Cast { value, .. } => vec![value],
            Instruction::Select { condition, true_value, false_value, .. } => {
                vec![condition, true_value, false_value]
            }
            Instruction::Phi { incoming, .. } => incoming.iter_mut().map(|(value, _)| value).collect(),
            Instruction::Return(value) => value.iter_mut().collect(),
            Instruction::BranchCond { condition, .. } => vec![condition],
            Instruction::Branch(_) | Instruction::DebugLoc { .. } | Instruction::Comment(_) => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return(_) | Instruction::Branch(_) | Instruction::BranchCond { .. }
        )
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Value]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 { write!(f, ", ")?; }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary { result, op, lhs, rhs, result_type } => {
                write!(f, "%{result} = {op} {result_type} {lhs}, {rhs}")
            }
            Instruction::Load { result, ptr, result_type } => {
                write!(f, "%{result} = load {result_type}, {ptr}")
            }
            Instruction::Store { value, ptr } => write!(f, "store {value}, {ptr}"),
            Instruction::GetElementPtr { result, ptr, indices, result_type } => {
                write!(f, "%{result} = getelementptr {result_type} {ptr}")?;
                for index in indices {
                    write!(f, ", {index}")?;
                }
                Ok(())
            }
            Instruction::Alloca { result, alloc_type, count, .. } => {
                write!(f, "%{result} = alloca {alloc_type}")?;
                if let Some(count) = count {
                    write!(f, ", {count}")?;
                }
                Ok(())
            }
            Instruction::Call { result, function, args, result_type } => {
                if let Some(result) = result {
                    write!(f, "%{result} = ")?;
                }
                write!(f, "call {result_type} {function}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instruction::DispatchCall { result, capability, receiver, args, result_type } => {
                if let Some(result) = result {
                    write!(f, "%{result} = ")?;
                }
                write!(f, "dispatch {result_type} <{capability}> {receiver}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instruction::AddrSpaceCast { result, ptr, result_type, .. } => {
                write!(f, "%{result} = addrspacecast {ptr} to {result_type}")
            }
            Instruction::CheckedAddrSpaceCast { result, ptr, target, result_type } => {
                write!(f, "%{result} = addrspacecast.checked {ptr} to {result_type} ; isspacep.{target}")
            }
            Instruction::IsInAddressSpace { result, ptr, space } => {
                write!(f, "%{result} = isspacep.{space} {ptr}")
            }
            Instruction::Cast { result, value, target_type } => {
                write!(f, "%{result} = cast {value} to {target_type}")
            }
            Instruction::Select { result, condition, true_value, false_value, result_type } => {
                write!(f, "%{result} = select i1 {condition}, {result_type} {true_value}, {result_type} {false_value}")
            }
            Instruction::Phi { result, incoming, result_type } => {
                write!(f, "%{result} = phi {result_type} ")?;
                for (i, (value, label)) in incoming.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "[{value}, %L{label}]")?;
                }
                Ok(())
            }
            Instruction::Return(Some(value)) => write!(f, "ret {value}"),
            Instruction::Return(None) => write!(f, "ret void"),
            Instruction::Branch(label) => write!(f, "br label %L{label}"),
            Instruction::BranchCond { condition, true_label, false_label } => {
                write!(f, "br i1 {condition}, label %L{true_label}, label %L{false_label}")
            }
            Instruction::DebugLoc { location } => write!(f, "; loc {location}"),
            Instruction::Comment(text) => write!(f, "; {text}"),
        }
    }
}
