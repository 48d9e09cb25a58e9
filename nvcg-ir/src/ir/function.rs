//! Function Definitions

use nvcg_common::{LabelId, SourceLocation, TempId, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::ir::{BasicBlock, Instruction, IrType};

/// Function in IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub return_type: IrType,
    pub parameters: Vec<(TempId, IrType)>,
    pub blocks: Vec<BasicBlock>,
    pub visibility: Visibility,
    /// GPU entry point (`nvvm.annotations` kernel)
    #[serde(default)]
    pub is_kernel: bool,
    /// Capabilities this function implements for dynamic dispatch
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub source_location: Option<SourceLocation>,
}

impl Function {
    pub fn new(name: String, return_type: IrType) -> Self {
        Self {
            name,
            return_type,
            parameters: Vec::new(),
            blocks: Vec::new(),
            visibility: Visibility::Internal,
            is_kernel: false,
            implements: Vec::new(),
            source_location: None,
        }
    }

    pub fn add_parameter(&mut self, param_id: TempId, param_type: IrType) {
        self.parameters.push((param_id, param_type));
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.push(block);
    }

    pub fn get_block(&self, id: LabelId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn get_block_mut(&mut self, id: LabelId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// A function without blocks is an external declaration
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Names of all module-level symbols the body refers to
    pub fn referenced_symbols(&self) -> BTreeSet<String> {
        self.instructions()
            .flat_map(|instr| instr.operands())
            .filter_map(|value| value.symbol_name())
            .map(str::to_string)
            .collect()
    }

    /// Capabilities invoked through dynamic dispatch in the body
    pub fn dispatched_capabilities(&self) -> BTreeSet<String> {
        self.instructions()
            .filter_map(|instr| match instr {
                Instruction::DispatchCall { capability, .. } => Some(capability.clone()),
                _ => None,
            })
            .collect()
    }
}
