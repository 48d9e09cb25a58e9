//! Static address space verification
//!
//! Runs over each function body as the traversal pulls it in. For every
//! pointer-typed temporary the verifier tracks two things: the static tag
//! of its type, and its provenance, meaning the space it is known to point
//! into at runtime (allocas are local, globals are in their declared space,
//! and conversions carry provenance through).
//!
//! Provenance survives a round trip through an integer, so a pointer
//! rebuilt from arithmetic on another pointer's address is held to the
//! space that address came from.
//!
//! With that it
//! - rejects any pointer change between spaces that is not an explicit
//!   generic conversion, including pointer arguments passed to a callee
//!   whose declaration expects another space,
//! - accepts generic to specific conversions whose provenance proves the
//!   target, and lowers the unproven ones to `CheckedAddrSpaceCast`,
//! - folds `IsInAddressSpace` tests whose answer is already known.

use crate::addrspace::model::{GenericPtr, SegmentMap};
use log::trace;
use nvcg_common::{AddressSpace, CodegenError, SourceLocation, TempId};
use nvcg_ir::{Function, GlobalVariable, Instruction, IrType, Value};
use std::collections::HashMap;

/// Where the verifier learns the declared space of a global by name
pub trait SpaceLookup {
    fn space_of(&self, name: &str) -> Option<AddressSpace>;

    /// Parameter types of `function`, when its signature is in scope
    fn parameter_types(&self, _function: &str) -> Option<Vec<IrType>> {
        None
    }
}

impl SpaceLookup for HashMap<String, AddressSpace> {
    fn space_of(&self, name: &str) -> Option<AddressSpace> {
        self.get(name).copied()
    }
}

/// A function body that passed verification, with its conversions lowered
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedFunction {
    pub function: Function,
    /// Generic to specific conversions left to a runtime check
    pub runtime_checks: usize,
    /// Segment tests resolved statically
    pub folded_tests: usize,
}

pub struct AddressSpaceVerifier<'a> {
    spaces: &'a dyn SpaceLookup,
    segments: Option<&'a SegmentMap>,
    strict: bool,
}

impl<'a> AddressSpaceVerifier<'a> {
    pub fn new(spaces: &'a dyn SpaceLookup) -> Self {
        Self {
            spaces,
            segments: None,
            strict: false,
        }
    }

    /// Fold segment tests on constant addresses against `segments`
    pub fn with_segments(mut self, segments: &'a SegmentMap) -> Self {
        self.segments = Some(segments);
        self
    }

    /// In strict mode an unproven generic to specific conversion is an error
    /// instead of a runtime check
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn verify_function(&self, function: &Function) -> Result<VerifiedFunction, CodegenError> {
        let mut state = FunctionState::new(self, function);
        let mut body = function.clone();

        for block in &mut body.blocks {
            for instr in &mut block.instructions {
                state.visit(instr)?;
            }
        }

        if state.runtime_checks > 0 || state.folded_tests > 0 {
            trace!(
                "verified '{}': {} runtime checks, {} folded tests",
                function.name,
                state.runtime_checks,
                state.folded_tests
            );
        }

        Ok(VerifiedFunction {
            runtime_checks: state.runtime_checks,
            folded_tests: state.folded_tests,
            function: body,
        })
    }

    pub fn verify_global(&self, global: &GlobalVariable) -> Result<(), CodegenError> {
        let Some(init) = &global.initializer else {
            return Ok(());
        };
        if global.space == AddressSpace::Shared {
            return Err(CodegenError::InvalidSharedInitializer { name: global.name.clone() });
        }
        // a pointer-typed global initialized with the address of another global
        if let (Some(expected), Value::Global(target)) = (global.var_type.address_space(), init) {
            if let Some(actual) = self.spaces.space_of(target) {
                if actual != expected {
                    return Err(CodegenError::invalid_cast(SourceLocation::dummy(), &global.name, actual, expected));
                }
            }
        }
        Ok(())
    }
}

struct FunctionState<'v, 'f> {
    verifier: &'v AddressSpaceVerifier<'v>,
    function: &'f Function,
    types: HashMap<TempId, IrType>,
    provenance: HashMap<TempId, AddressSpace>,
    location: Option<SourceLocation>,
    runtime_checks: usize,
    folded_tests: usize,
}

impl<'v, 'f> FunctionState<'v, 'f> {
    fn new(verifier: &'v AddressSpaceVerifier<'v>, function: &'f Function) -> Self {
        let mut state = Self {
            verifier,
            function,
            types: HashMap::new(),
            provenance: HashMap::new(),
            location: function.source_location.clone(),
            runtime_checks: 0,
            folded_tests: 0,
        };
        for (id, ty) in &function.parameters {
            state.define(*id, ty.clone(), None);
        }
        state
    }

    /// Record a new temporary. A pointer with a specific static tag points
    /// into that space unless told otherwise.
    fn define(&mut self, id: TempId, ty: IrType, provenance: Option<AddressSpace>) {
        let provenance = provenance.or_else(|| ty.address_space().filter(|s| s.is_specific()));
        if let Some(space) = provenance {
            self.provenance.insert(id, space);
        }
        self.types.insert(id, ty);
    }

    fn static_space(&self, value: &Value) -> Option<AddressSpace> {
        match value {
            Value::Temp(id) => self.types.get(id).and_then(IrType::address_space),
            Value::Global(name) => Some(self.verifier.spaces.space_of(name).unwrap_or_default()),
            Value::Function(_) => Some(AddressSpace::Generic),
            Value::Null(space) => Some(*space),
            _ => None,
        }
    }

    fn provenance_of(&self, value: &Value) -> Option<AddressSpace> {
        match value {
            Value::Temp(id) => self.provenance.get(id).copied(),
            Value::Global(name) => self.verifier.spaces.space_of(name).filter(|s| s.is_specific()),
            _ => None,
        }
    }

    /// A pointer whose address is known without running the function
    fn constant_address(&self, value: &Value) -> Option<GenericPtr> {
        match value {
            Value::Null(_) => Some(GenericPtr::new(0)),
            Value::Constant(addr) => Some(GenericPtr::new(*addr as u64)),
            _ => None,
        }
    }

    /// Space of the pointers stored behind `ptr`, when its type says
    fn pointee_space(&self, ptr: &Value) -> Option<AddressSpace> {
        match ptr {
            Value::Temp(id) => self
                .types
                .get(id)
                .and_then(IrType::element_type)
                .and_then(IrType::address_space),
            _ => None,
        }
    }

    fn error(&self, from: AddressSpace, to: AddressSpace) -> CodegenError {
        let location = self.location.clone().unwrap_or_else(SourceLocation::dummy);
        CodegenError::invalid_cast(location, &self.function.name, from, to)
    }

    fn expect_same(&self, from: Option<AddressSpace>, to: Option<AddressSpace>) -> Result<(), CodegenError> {
        match (from, to) {
            (Some(from), Some(to)) if from != to => Err(self.error(from, to)),
            _ => Ok(()),
        }
    }

    fn visit(&mut self, instr: &mut Instruction) -> Result<(), CodegenError> {
        match instr {
            Instruction::DebugLoc { location } => {
                self.location = Some(location.clone());
            }

            Instruction::Alloca { result, result_type, .. } => {
                self.expect_same(Some(AddressSpace::Local), result_type.address_space())?;
                self.define(*result, result_type.clone(), Some(AddressSpace::Local));
            }

            Instruction::GetElementPtr { result, ptr, result_type, .. } => {
                self.expect_same(self.static_space(ptr), result_type.address_space())?;
                let provenance = self.provenance_of(ptr);
                self.define(*result, result_type.clone(), provenance);
            }

            Instruction::Cast { result, value, target_type } => {
                let provenance = self.provenance_of(value);
                if let Some(target) = target_type.address_space() {
                    self.expect_same(self.static_space(value), Some(target))?;
                    if target.is_specific() {
                        self.expect_same(provenance, Some(target))?;
                    }
                }
                self.define(*result, target_type.clone(), provenance);
            }

            Instruction::Load { result, ptr, result_type } => {
                if result_type.is_pointer() {
                    self.expect_same(self.pointee_space(ptr), result_type.address_space())?;
                }
                self.define(*result, result_type.clone(), None);
            }

            Instruction::Store { value, ptr } => {
                self.expect_same(self.static_space(value), self.pointee_space(ptr))?;
            }

            Instruction::AddrSpaceCast { result, ptr, target, result_type } => {
                let (result, target, result_type) = (*result, *target, result_type.clone());
                let from = self.static_space(ptr).unwrap_or_default();
                let provenance = self.provenance_of(ptr);

                match (from.is_generic(), target.is_generic()) {
                    _ if from == target => {}
                    // specific to generic is always legal
                    (false, true) => {}
                    (true, false) => match provenance {
                        Some(proven) if proven == target => {}
                        Some(proven) => return Err(self.error(proven, target)),
                        None if self.verifier.strict => return Err(self.error(from, target)),
                        None => {
                            *instr = Instruction::CheckedAddrSpaceCast {
                                result,
                                ptr: ptr.clone(),
                                target,
                                result_type: result_type.clone(),
                            };
                            self.runtime_checks += 1;
                        }
                    },
                    _ => return Err(self.error(from, target)),
                }

                let provenance = if target.is_generic() { provenance.or(Some(from)) } else { Some(target) };
                self.define(result, result_type, provenance.filter(|s| s.is_specific()));
            }

            Instruction::CheckedAddrSpaceCast { result, target, result_type, .. } => {
                let target = *target;
                self.define(*result, result_type.clone(), Some(target).filter(|s| s.is_specific()));
            }

            Instruction::IsInAddressSpace { result, ptr, space } => {
                let result = *result;
                let known = if space.is_generic() {
                    Some(true)
                } else {
                    self.provenance_of(ptr)
                        .or_else(|| self.static_space(ptr).filter(|s| s.is_specific()))
                        .map(|proven| proven == *space)
                        .or_else(|| {
                            let segments = self.verifier.segments?;
                            let addr = self.constant_address(ptr)?;
                            Some(segments.is_in_address_space(addr, *space))
                        })
                };
                if let Some(answer) = known {
                    *instr = Instruction::Cast {
                        result,
                        value: Value::Constant(i64::from(answer)),
                        target_type: IrType::I1,
                    };
                    self.folded_tests += 1;
                }
                self.define(result, IrType::I1, None);
            }

            Instruction::Select { result, true_value, false_value, result_type, .. } => {
                let (a, b) = (self.static_space(true_value), self.static_space(false_value));
                self.expect_same(a, b)?;
                if result_type.is_pointer() {
                    self.expect_same(a.or(b), result_type.address_space())?;
                }
                let provenance = match (self.provenance_of(true_value), self.provenance_of(false_value)) {
                    (Some(a), Some(b)) if a == b => Some(a),
                    _ => None,
                };
                self.define(*result, result_type.clone(), provenance);
            }

            Instruction::Phi { result, incoming, result_type } => {
                if result_type.is_pointer() {
                    for (value, _) in incoming.iter() {
                        self.expect_same(self.static_space(value), result_type.address_space())?;
                    }
                }
                self.define(*result, result_type.clone(), None);
            }

            Instruction::Return(Some(value)) => {
                if self.function.return_type.is_pointer() {
                    self.expect_same(self.static_space(value), self.function.return_type.address_space())?;
                }
            }

            Instruction::Binary { result, lhs, rhs, result_type, .. } => {
                if let Some(target) = result_type.address_space() {
                    self.expect_same(self.static_space(lhs), Some(target))?;
                    self.expect_same(self.static_space(rhs), Some(target))?;
                }
                let provenance = self.provenance_of(lhs).or_else(|| self.provenance_of(rhs));
                if let Some(target) = result_type.address_space().filter(|s| s.is_specific()) {
                    self.expect_same(provenance, Some(target))?;
                }
                self.define(*result, result_type.clone(), provenance);
            }

            Instruction::Call { result, function, args, result_type } => {
                let params = function
                    .symbol_name()
                    .and_then(|name| self.verifier.spaces.parameter_types(name))
                    .unwrap_or_default();
                for (arg, param) in args.iter().zip(&params) {
                    if param.is_pointer() {
                        self.expect_same(self.static_space(arg), param.address_space())?;
                    }
                }
                if let Some(result) = result {
                    self.define(*result, result_type.clone(), None);
                }
            }

            Instruction::DispatchCall { result: Some(result), result_type, .. } => {
                self.define(*result, result_type.clone(), None);
            }

            Instruction::DispatchCall { result: None, .. }
            | Instruction::Return(None)
            | Instruction::Branch(_)
            | Instruction::BranchCond { .. }
            | Instruction::Comment(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
