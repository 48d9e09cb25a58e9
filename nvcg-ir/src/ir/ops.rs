//! Binary operations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operations in IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrBinaryOp {
    // Integer arithmetic
    Add, Sub, Mul,
    SDiv, UDiv,
    SRem, URem,

    // Float arithmetic
    FAdd, FSub, FMul, FDiv,

    // Bitwise
    And, Or, Xor,
    Shl, LShr, AShr,

    // Comparison (return i1)
    Eq, Ne,
    Slt, Sle, Sgt, Sge,
    Ult, Ule, Ugt, Uge,
}

impl IrBinaryOp {
    pub fn mnemonic(self) -> &'static str {
        use IrBinaryOp::*;
        match self {
            Add => "add", Sub => "sub", Mul => "mul",
            SDiv => "sdiv", UDiv => "udiv", SRem => "srem", URem => "urem",
            FAdd => "fadd", FSub => "fsub", FMul => "fmul", FDiv => "fdiv",
            And => "and", Or => "or", Xor => "xor",
            Shl => "shl", LShr => "lshr", AShr => "ashr",
            Eq => "icmp eq", Ne => "icmp ne",
            Slt => "icmp slt", Sle => "icmp sle", Sgt => "icmp sgt", Sge => "icmp sge",
            Ult => "icmp ult", Ule => "icmp ule", Ugt => "icmp ugt", Uge => "icmp uge",
        }
    }

    pub fn is_comparison(self) -> bool {
        use IrBinaryOp::*;
        matches!(self, Eq | Ne | Slt | Sle | Sgt | Sge | Ult | Ule | Ugt | Uge)
    }
}

impl fmt::Display for IrBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
