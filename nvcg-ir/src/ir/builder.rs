//! IR Builder
//!
//! Helper used by tests and tooling to assemble function bodies one
//! instruction at a time.

use nvcg_common::{AddressSpace, LabelId, SourceLocation, TempId};
use crate::ir::{BasicBlock, Function, Instruction, IrBinaryOp, IrType, Value};

/// Builder for constructing IR
pub struct IrBuilder {
    current_function: Option<Function>,
    current_block: Option<LabelId>,
    next_temp_id: TempId,
    next_label_id: LabelId,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            current_function: None,
            current_block: None,
            next_temp_id: 0,
            next_label_id: 0,
        }
    }

    pub fn new_temp(&mut self) -> TempId {
        let temp = self.next_temp_id;
        self.next_temp_id += 1;
        temp
    }

    pub fn new_label(&mut self) -> LabelId {
        let label = self.next_label_id;
        self.next_label_id += 1;
        label
    }

    /// Start a new function, discarding any unfinished one
    pub fn create_function(&mut self, name: &str, return_type: IrType) -> &mut Function {
        self.next_temp_id = 0;
        self.next_label_id = 0;
        self.current_block = None;
        self.current_function.insert(Function::new(name.to_string(), return_type))
    }

    /// Add a parameter and return the temp that names it
    pub fn add_parameter(&mut self, param_type: IrType) -> Result<TempId, String> {
        let id = self.new_temp();
        let function = self.current_function.as_mut().ok_or("No current function")?;
        function.add_parameter(id, param_type);
        Ok(id)
    }

    /// Create a block and make it the insertion point
    pub fn create_block(&mut self) -> Result<LabelId, String> {
        let label = self.new_label();
        let function = self.current_function.as_mut().ok_or("No current function")?;
        function.add_block(BasicBlock::new(label));
        self.current_block = Some(label);
        Ok(label)
    }

    pub fn switch_to_block(&mut self, label: LabelId) -> Result<(), String> {
        let function = self.current_function.as_ref().ok_or("No current function")?;
        if function.get_block(label).is_none() {
            return Err(format!("Block L{label} not found"));
        }
        self.current_block = Some(label);
        Ok(())
    }

    pub fn build_binary(&mut self, op: IrBinaryOp, lhs: Value, rhs: Value, result_type: IrType) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::Binary { result, op, lhs, rhs, result_type })?;
        Ok(result)
    }

    pub fn build_load(&mut self, ptr: Value, result_type: IrType) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::Load { result, ptr, result_type })?;
        Ok(result)
    }

    pub fn build_store(&mut self, value: Value, ptr: Value) -> Result<(), String> {
        self.add_instruction(Instruction::Store { value, ptr })
    }

    /// Stack allocation, which always lives in local memory
    pub fn build_alloca(&mut self, alloc_type: IrType) -> Result<TempId, String> {
        let result = self.new_temp();
        let result_type = IrType::ptr(alloc_type.clone(), AddressSpace::Local);
        self.add_instruction(Instruction::Alloca { result, alloc_type, count: None, result_type })?;
        Ok(result)
    }

    pub fn build_gep(&mut self, ptr: Value, indices: Vec<Value>, result_type: IrType) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::GetElementPtr { result, ptr, indices, result_type })?;
        Ok(result)
    }

    pub fn build_call(&mut self, function: &str, args: Vec<Value>, result_type: IrType) -> Result<Option<TempId>, String> {
        let result = if matches!(result_type, IrType::Void) {
            None
        } else {
            Some(self.new_temp())
        };
        let function = Value::Function(function.to_string());
        self.add_instruction(Instruction::Call { result, function, args, result_type })?;
        Ok(result)
    }

    pub fn build_dispatch(
        &mut self,
        capability: &str,
        receiver: Value,
        args: Vec<Value>,
        result_type: IrType,
    ) -> Result<Option<TempId>, String> {
        let result = if matches!(result_type, IrType::Void) {
            None
        } else {
            Some(self.new_temp())
        };
        self.add_instruction(Instruction::DispatchCall {
            result,
            capability: capability.to_string(),
            receiver,
            args,
            result_type,
        })?;
        Ok(result)
    }

    /// Explicit address space conversion of `ptr` (of type `ptr_type`)
    pub fn build_addrspace_cast(&mut self, ptr: Value, ptr_type: &IrType, target: AddressSpace) -> Result<TempId, String> {
        let result = self.new_temp();
        let result_type = ptr_type.with_address_space(target);
        self.add_instruction(Instruction::AddrSpaceCast { result, ptr, target, result_type })?;
        Ok(result)
    }

    pub fn build_is_in_address_space(&mut self, ptr: Value, space: AddressSpace) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::IsInAddressSpace { result, ptr, space })?;
        Ok(result)
    }

    pub fn build_cast(&mut self, value: Value, target_type: IrType) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::Cast { result, value, target_type })?;
        Ok(result)
    }

    pub fn build_select(
        &mut self,
        condition: Value,
        true_value: Value,
        false_value: Value,
        result_type: IrType,
    ) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::Select { result, condition, true_value, false_value, result_type })?;
        Ok(result)
    }

    pub fn build_phi(&mut self, incoming: Vec<(Value, LabelId)>, result_type: IrType) -> Result<TempId, String> {
        let result = self.new_temp();
        self.add_instruction(Instruction::Phi { result, incoming, result_type })?;
        Ok(result)
    }

    pub fn build_return(&mut self, value: Option<Value>) -> Result<(), String> {
        self.add_instruction(Instruction::Return(value))
    }

    pub fn build_branch(&mut self, label: LabelId) -> Result<(), String> {
        self.add_instruction(Instruction::Branch(label))
    }

    pub fn build_branch_cond(&mut self, condition: Value, true_label: LabelId, false_label: LabelId) -> Result<(), String> {
        self.add_instruction(Instruction::BranchCond { condition, true_label, false_label })
    }

    pub fn set_location(&mut self, location: SourceLocation) -> Result<(), String> {
        self.add_instruction(Instruction::DebugLoc { location })
    }

    fn add_instruction(&mut self, instr: Instruction) -> Result<(), String> {
        let function = self.current_function.as_mut().ok_or("No current function")?;
        let block_id = self.current_block.ok_or("No current block")?;
        let block = function
            .get_block_mut(block_id)
            .ok_or_else(|| "Current block not found".to_string())?;
        block.add_instruction(instr);
        Ok(())
    }

    pub fn current_block_has_terminator(&self) -> bool {
        self.current_function
            .as_ref()
            .zip(self.current_block)
            .and_then(|(function, id)| function.get_block(id))
            .is_some_and(BasicBlock::has_terminator)
    }

    pub fn finish_function(&mut self) -> Option<Function> {
        self.current_block = None;
        self.current_function.take()
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
