// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type verifier.
//!
//! The verifier instantiates the [dataflow engine](crate::analysis::dataflow) with verification
//! types as abstract values. Every reachable path through a function is interpreted; any contract
//! violation rejects the function outright.
//!
//! Values on the abstract stack are *stack types*: verification types with the 8- and 16-bit
//! integer classes widened to `int32` (see [`TypeTable::stack_type`]).

use core::fmt;

use log::{debug, warn};

use crate::analysis::bitset::BitSet;
use crate::analysis::dataflow::{self, Flow, Target, Transfer};
use crate::analysis::stack::AbstractStack;
use crate::diagnostics::{Diagnostic, DiagnosticCategory};
use crate::instr::{
    AccessOp, BranchOp, Constant, FieldRef, FuncOp, Instr, Label, NoneOp, TypeOp,
};
use crate::program::{FuncRef, FunctionDef, FunctionKind, ModuleId, Program};
use crate::types::{TypeId, TypeKind, TypeTable};

/// Diagnostic code for an unreachable instruction.
pub const UNREACHABLE_CODE: u16 = 2100;

/// Verifier limits and switches.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VerifyConfig {
    /// Maximum number of instructions in one function body.
    pub max_instructions: u32,
    /// Whether unreachable instructions produce warnings.
    pub report_unreachable: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_instructions: 65_536,
            report_unreachable: true,
        }
    }
}

/// What an instruction required of an operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    /// Assignable to this declared type.
    Type(TypeId),
    /// `int32`, `int64`, `float32` or `float64`.
    Numeric,
    /// `int32` or `int64`.
    Integer,
    /// Numeric, reference or null.
    NumericOrReference,
    /// An integer, reference or null branch condition.
    Condition,
    /// `ref<array>` or `span`.
    Container,
    /// A function type.
    Function,
    /// A reference.
    Reference,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => write!(f, "a value assignable to t{}", t.0),
            Self::Numeric => f.write_str("a numeric value"),
            Self::Integer => f.write_str("an integer value"),
            Self::NumericOrReference => f.write_str("a numeric or reference value"),
            Self::Condition => f.write_str("an integer or reference condition"),
            Self::Container => f.write_str("an array reference or span"),
            Self::Function => f.write_str("a function type"),
            Self::Reference => f.write_str("a reference"),
        }
    }
}

/// A construct rejected because it would need lifetime analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unsupported {
    /// Returning a reference or span.
    ReturnAddress,
    /// Storing a reference or span through memory (indirect, field or element store).
    StoreAddress,
    /// Taking the address of a reference- or span-typed location.
    AddressOfAddress,
}

/// A verification failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The function body exceeds [`VerifyConfig::max_instructions`].
    TooManyInstructions {
        /// Function.
        func: FuncRef,
        /// Body length.
        len: usize,
    },
    /// An instruction popped from an empty stack.
    StackUnderflow {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
    },
    /// An operand had the wrong type.
    TypeMismatch {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// What was required.
        expected: Expected,
        /// The operand's stack type.
        found: TypeId,
    },
    /// A call found fewer operands than the callee declares.
    ArityMismatch {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// Declared parameter count.
        expected: usize,
        /// Available stack depth.
        found: usize,
    },
    /// `newobj` named a function that is not a constructor.
    NotConstructor {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The callee.
        callee: FuncRef,
    },
    /// `ret` left values on the stack.
    StackNotEmpty {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// Remaining depth.
        depth: usize,
    },
    /// Two paths reach an instruction with different stack heights.
    StackHeightMismatch {
        /// Function.
        func: FuncRef,
        /// Join index.
        index: usize,
        /// Height already recorded.
        recorded: usize,
        /// Incoming height.
        incoming: usize,
    },
    /// Two paths reach an instruction with incompatible operand types.
    IncompatibleJoin {
        /// Function.
        func: FuncRef,
        /// Join index.
        index: usize,
        /// Type already recorded.
        recorded: TypeId,
        /// Incoming type.
        incoming: TypeId,
    },
    /// Execution can run past the last instruction.
    FallsOffEnd {
        /// Function.
        func: FuncRef,
        /// Index of the last instruction.
        index: usize,
    },
    /// A branch target does not resolve.
    BadBranchTarget {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The label.
        label: Label,
    },
    /// A construct that is deliberately not supported.
    Unsupported {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The construct.
        what: Unsupported,
    },
    /// A symbol did not resolve (the program was not bound).
    Unbound {
        /// Function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
    },
}

impl VerifyError {
    /// Returns the function the error occurred in.
    #[must_use]
    pub fn func(&self) -> FuncRef {
        match self {
            Self::TooManyInstructions { func, .. }
            | Self::StackUnderflow { func, .. }
            | Self::TypeMismatch { func, .. }
            | Self::ArityMismatch { func, .. }
            | Self::NotConstructor { func, .. }
            | Self::StackNotEmpty { func, .. }
            | Self::StackHeightMismatch { func, .. }
            | Self::IncompatibleJoin { func, .. }
            | Self::FallsOffEnd { func, .. }
            | Self::BadBranchTarget { func, .. }
            | Self::Unsupported { func, .. }
            | Self::Unbound { func, .. } => *func,
        }
    }

    /// Returns the instruction index, if the error has one.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::TooManyInstructions { .. } => None,
            Self::StackUnderflow { index, .. }
            | Self::TypeMismatch { index, .. }
            | Self::ArityMismatch { index, .. }
            | Self::NotConstructor { index, .. }
            | Self::StackNotEmpty { index, .. }
            | Self::StackHeightMismatch { index, .. }
            | Self::IncompatibleJoin { index, .. }
            | Self::FallsOffEnd { index, .. }
            | Self::BadBranchTarget { index, .. }
            | Self::Unsupported { index, .. }
            | Self::Unbound { index, .. } => Some(*index),
        }
    }

    /// Renders the error as a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            Self::TooManyInstructions { .. } => 2001,
            Self::StackUnderflow { .. } => 2002,
            Self::TypeMismatch { .. } => 2003,
            Self::ArityMismatch { .. } => 2004,
            Self::NotConstructor { .. } => 2005,
            Self::StackNotEmpty { .. } => 2006,
            Self::StackHeightMismatch { .. } => 2007,
            Self::IncompatibleJoin { .. } => 2008,
            Self::FallsOffEnd { .. } => 2009,
            Self::BadBranchTarget { .. } => 2010,
            Self::Unsupported { .. } => 2011,
            Self::Unbound { .. } => 2012,
        };
        Diagnostic::error(DiagnosticCategory::Verification, code, self.to_string())
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyInstructions { func, len } => {
                write!(f, "{func}: body has too many instructions ({len})")
            }
            Self::StackUnderflow { func, index } => write!(f, "{func}@{index}: stack underflow"),
            Self::TypeMismatch {
                func,
                index,
                expected,
                found,
            } => write!(f, "{func}@{index}: expected {expected}, found t{}", found.0),
            Self::ArityMismatch {
                func,
                index,
                expected,
                found,
            } => write!(
                f,
                "{func}@{index}: call needs {expected} arguments, stack holds {found}"
            ),
            Self::NotConstructor { func, index, callee } => {
                write!(f, "{func}@{index}: {callee} is not a constructor")
            }
            Self::StackNotEmpty { func, index, depth } => {
                write!(f, "{func}@{index}: {depth} values left on the stack at return")
            }
            Self::StackHeightMismatch {
                func,
                index,
                recorded,
                incoming,
            } => write!(
                f,
                "{func}@{index}: stack height {incoming} does not match {recorded} at join"
            ),
            Self::IncompatibleJoin {
                func,
                index,
                recorded,
                incoming,
            } => write!(
                f,
                "{func}@{index}: incompatible operand types at control-flow join (t{} vs t{})",
                recorded.0, incoming.0
            ),
            Self::FallsOffEnd { func, index } => {
                write!(f, "{func}@{index}: control falls off the end of the body")
            }
            Self::BadBranchTarget { func, index, label } => {
                write!(f, "{func}@{index}: unresolved branch target L{}", label.0)
            }
            Self::Unsupported { func, index, what } => {
                let what = match what {
                    Unsupported::ReturnAddress => "returning a reference or span",
                    Unsupported::StoreAddress => "storing a reference or span through memory",
                    Unsupported::AddressOfAddress => {
                        "taking the address of a reference or span location"
                    }
                };
                write!(f, "{func}@{index}: unsupported: {what}")
            }
            Self::Unbound { func, index } => write!(f, "{func}@{index}: unbound symbol"),
        }
    }
}

impl core::error::Error for VerifyError {}

/// A verified instruction with its resolved operand and result stack types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedInstr {
    /// The instruction.
    pub instr: Instr,
    /// Popped operands, bottom to top.
    pub operands: Vec<TypeId>,
    /// Pushed results, bottom to top.
    pub results: Vec<TypeId>,
}

/// The verifier's output for one function.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedFunction {
    /// The verified function.
    pub func: FuncRef,
    /// Stack before each instruction; `None` for unreachable instructions.
    pub states: Vec<Option<AbstractStack<TypeId>>>,
    /// Annotated instructions; `None` for unreachable instructions.
    pub instrs: Vec<Option<VerifiedInstr>>,
    /// Non-fatal findings, by instruction index.
    pub diagnostics: Vec<(usize, Diagnostic)>,
}

impl VerifiedFunction {
    /// Returns `true` if instruction `index` is reachable.
    #[must_use]
    pub fn is_reachable(&self, index: usize) -> bool {
        self.states.get(index).is_some_and(Option::is_some)
    }
}

/// Verified functions of a whole program, indexed like [`Program::modules`].
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedProgram {
    /// `modules[m][f]` is function `f` of module `m`.
    pub modules: Vec<Vec<VerifiedFunction>>,
}

impl VerifiedProgram {
    /// Returns the verified form of `func`.
    #[must_use]
    pub fn function(&self, func: FuncRef) -> Option<&VerifiedFunction> {
        self.modules
            .get(func.module.0 as usize)?
            .get(func.index as usize)
    }
}

/// Best-effort verification result.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifyReport {
    /// Functions that verified.
    pub verified: Vec<VerifiedFunction>,
    /// Errors and warnings across all functions.
    pub diagnostics: Vec<Diagnostic>,
}

impl VerifyReport {
    /// Returns `true` if no error was recorded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Returns `true` if a stack value of type `source` may be stored into a location of declared
/// type `target`.
#[must_use]
pub fn assignable(types: &TypeTable, source: TypeId, target: TypeId) -> bool {
    let target = types.verification_type(target);
    source == target
        || (source == TypeId::NULL && types.is_reference(target))
        || (source == TypeId::I32
            && (target == TypeId::I8 || target == TypeId::I16 || target == TypeId::I32))
}

/// Merges two stack types at a control-flow join, or returns `None` if they are incompatible.
#[must_use]
pub fn phi(types: &TypeTable, a: TypeId, b: TypeId) -> Option<TypeId> {
    if a == b {
        Some(a)
    } else if a == TypeId::NULL && types.is_reference(b) {
        Some(b)
    } else if b == TypeId::NULL && types.is_reference(a) {
        Some(a)
    } else {
        None
    }
}

fn is_numeric(t: TypeId) -> bool {
    t == TypeId::I32 || t == TypeId::I64 || t == TypeId::F32 || t == TypeId::F64
}

fn is_integer(t: TypeId) -> bool {
    t == TypeId::I32 || t == TypeId::I64
}

fn is_conversion_target(t: TypeId) -> bool {
    (TypeId::I8.0..=TypeId::F64.0).contains(&t.0)
}

struct Checker<'p> {
    program: &'p Program,
    types: &'p TypeTable,
    func: FuncRef,
    def: &'p FunctionDef,
}

impl Checker<'_> {
    fn pop(&self, flow: &mut Flow<'_, TypeId>) -> Result<TypeId, VerifyError> {
        flow.pop().ok_or(VerifyError::StackUnderflow {
            func: self.func,
            index: flow.index(),
        })
    }

    fn mismatch(&self, index: usize, expected: Expected, found: TypeId) -> VerifyError {
        VerifyError::TypeMismatch {
            func: self.func,
            index,
            expected,
            found,
        }
    }

    fn unsupported(&self, index: usize, what: Unsupported) -> VerifyError {
        VerifyError::Unsupported {
            func: self.func,
            index,
            what,
        }
    }

    fn expect_assignable(&self, index: usize, value: TypeId, ty: TypeId) -> Result<(), VerifyError> {
        if assignable(self.types, value, ty) {
            Ok(())
        } else {
            Err(self.mismatch(index, Expected::Type(ty), value))
        }
    }

    /// Pops two operands that must have the same type satisfying `class`.
    fn pop_pair(
        &self,
        flow: &mut Flow<'_, TypeId>,
        expected: Expected,
        class: fn(TypeId) -> bool,
    ) -> Result<TypeId, VerifyError> {
        let b = self.pop(flow)?;
        let a = self.pop(flow)?;
        let index = flow.index();
        if !class(a) {
            return Err(self.mismatch(index, expected, a));
        }
        if a != b {
            return Err(self.mismatch(index, Expected::Type(a), b));
        }
        Ok(a)
    }

    /// Pops two operands for an equality test: identical numeric or reference types, or null
    /// against a reference.
    fn pop_equality_pair(&self, flow: &mut Flow<'_, TypeId>) -> Result<(), VerifyError> {
        let b = self.pop(flow)?;
        let a = self.pop(flow)?;
        let index = flow.index();
        let reference_like = |t: TypeId| t == TypeId::NULL || self.types.is_reference(t);
        if !is_numeric(a) && !reference_like(a) {
            return Err(self.mismatch(index, Expected::NumericOrReference, a));
        }
        let null_against_reference = (a == TypeId::NULL && reference_like(b))
            || (b == TypeId::NULL && reference_like(a));
        let compatible = a == b || null_against_reference;
        if !compatible {
            return Err(self.mismatch(index, Expected::Type(a), b));
        }
        Ok(())
    }

    fn pop_args(
        &self,
        flow: &mut Flow<'_, TypeId>,
        params: &[TypeId],
    ) -> Result<(), VerifyError> {
        let index = flow.index();
        if flow.stack().len() < params.len() {
            return Err(VerifyError::ArityMismatch {
                func: self.func,
                index,
                expected: params.len(),
                found: flow.stack().len(),
            });
        }
        for &param in params.iter().rev() {
            let arg = self.pop(flow)?;
            self.expect_assignable(index, arg, param)?;
        }
        Ok(())
    }

    fn push_value(&self, flow: &mut Flow<'_, TypeId>, ty: TypeId) {
        if ty != TypeId::VOID {
            flow.push(self.types.stack_type(ty));
        }
    }

    fn push_address_of(&self, flow: &mut Flow<'_, TypeId>, ty: TypeId) -> Result<(), VerifyError> {
        let index = flow.index();
        if self.types.carries_address(ty) {
            return Err(self.unsupported(index, Unsupported::AddressOfAddress));
        }
        let reference = self
            .types
            .reference_to(ty)
            .ok_or(VerifyError::Unbound {
                func: self.func,
                index,
            })?;
        flow.push(self.types.stack_type(reference));
        Ok(())
    }

    /// Handles load/store/address-of on a variable of declared type `ty`.
    fn access(
        &self,
        flow: &mut Flow<'_, TypeId>,
        op: AccessOp,
        ty: TypeId,
    ) -> Result<(), VerifyError> {
        match op {
            AccessOp::Load => self.push_value(flow, ty),
            AccessOp::Store => {
                let value = self.pop(flow)?;
                self.expect_assignable(flow.index(), value, ty)?;
            }
            AccessOp::Address => self.push_address_of(flow, ty)?,
        }
        flow.fall_through();
        Ok(())
    }

    /// Pops an element container and returns its element verification type.
    fn pop_container(&self, flow: &mut Flow<'_, TypeId>) -> Result<TypeId, VerifyError> {
        let container = self.pop(flow)?;
        let element = match self.types.kind(container) {
            TypeKind::Span(e) => Some(*e),
            TypeKind::Reference(target) => match self.types.kind(*target) {
                TypeKind::Array { element, .. } => Some(*element),
                _ => None,
            },
            _ => None,
        };
        element.ok_or_else(|| self.mismatch(flow.index(), Expected::Container, container))
    }

    fn pop_index(&self, flow: &mut Flow<'_, TypeId>) -> Result<(), VerifyError> {
        let index = self.pop(flow)?;
        if index != TypeId::I32 {
            return Err(self.mismatch(flow.index(), Expected::Type(TypeId::I32), index));
        }
        Ok(())
    }

    /// Checks that a location of type `location` can be accessed as `ty`.
    fn expect_location(&self, index: usize, location: TypeId, ty: TypeId) -> Result<(), VerifyError> {
        let location = self.types.verification_type(location);
        if assignable(self.types, location, ty) {
            Ok(())
        } else {
            Err(self.mismatch(index, Expected::Type(ty), location))
        }
    }

    fn function_type(&self, index: usize, ty: TypeId) -> Result<(&[TypeId], TypeId), VerifyError> {
        match self.types.kind(ty) {
            TypeKind::Function { params, ret } => Ok((params.as_slice(), *ret)),
            _ => Err(self.mismatch(index, Expected::Function, ty)),
        }
    }
}

impl Transfer for Checker<'_> {
    type Value = TypeId;
    type Error = VerifyError;

    fn none(&mut self, flow: &mut Flow<'_, TypeId>, op: NoneOp) -> Result<(), VerifyError> {
        let index = flow.index();
        match op {
            NoneOp::Nop => {}
            NoneOp::Add | NoneOp::Sub | NoneOp::Mul | NoneOp::Div | NoneOp::Rem => {
                let t = self.pop_pair(flow, Expected::Numeric, is_numeric)?;
                flow.push(t);
            }
            NoneOp::DivUn
            | NoneOp::RemUn
            | NoneOp::And
            | NoneOp::Or
            | NoneOp::Xor
            | NoneOp::Shl
            | NoneOp::Shr
            | NoneOp::ShrUn => {
                let t = self.pop_pair(flow, Expected::Integer, is_integer)?;
                flow.push(t);
            }
            NoneOp::Neg => {
                let t = self.pop(flow)?;
                if !is_numeric(t) {
                    return Err(self.mismatch(index, Expected::Numeric, t));
                }
                flow.push(t);
            }
            NoneOp::Not => {
                let t = self.pop(flow)?;
                if !is_integer(t) {
                    return Err(self.mismatch(index, Expected::Integer, t));
                }
                flow.push(t);
            }
            NoneOp::Ceq => {
                self.pop_equality_pair(flow)?;
                flow.push(TypeId::I32);
            }
            NoneOp::Cgt | NoneOp::Clt => {
                self.pop_pair(flow, Expected::Numeric, is_numeric)?;
                flow.push(TypeId::I32);
            }
            NoneOp::CgtUn | NoneOp::CltUn => {
                self.pop_pair(flow, Expected::Integer, is_integer)?;
                flow.push(TypeId::I32);
            }
            NoneOp::Dup => {
                let t = self.pop(flow)?;
                flow.push(t);
                flow.push(t);
            }
            NoneOp::Pop => {
                self.pop(flow)?;
            }
            NoneOp::LdNull => flow.push(TypeId::NULL),
            NoneOp::Ret => {
                let ret = self.def.ret;
                if ret != TypeId::VOID {
                    if self.types.carries_address(ret) {
                        return Err(self.unsupported(index, Unsupported::ReturnAddress));
                    }
                    let value = self.pop(flow)?;
                    self.expect_assignable(index, value, ret)?;
                }
                let depth = flow.stack().len();
                if depth != 0 {
                    return Err(VerifyError::StackNotEmpty {
                        func: self.func,
                        index,
                        depth,
                    });
                }
                return Ok(());
            }
        }
        flow.fall_through();
        Ok(())
    }

    fn constant(&mut self, flow: &mut Flow<'_, TypeId>, value: Constant) -> Result<(), VerifyError> {
        flow.push(match value {
            Constant::I32(_) => TypeId::I32,
            Constant::I64(_) => TypeId::I64,
            Constant::F32(_) => TypeId::F32,
            Constant::F64(_) => TypeId::F64,
        });
        flow.fall_through();
        Ok(())
    }

    fn argument(
        &mut self,
        flow: &mut Flow<'_, TypeId>,
        op: AccessOp,
        index: u16,
    ) -> Result<(), VerifyError> {
        let Some(param) = self.def.params.get(usize::from(index)) else {
            return Err(VerifyError::Unbound {
                func: self.func,
                index: flow.index(),
            });
        };
        self.access(flow, op, param.ty)
    }

    fn local(
        &mut self,
        flow: &mut Flow<'_, TypeId>,
        op: AccessOp,
        index: u16,
    ) -> Result<(), VerifyError> {
        let Some(local) = self.def.locals.get(usize::from(index)) else {
            return Err(VerifyError::Unbound {
                func: self.func,
                index: flow.index(),
            });
        };
        self.access(flow, op, local.ty)
    }

    fn field(
        &mut self,
        flow: &mut Flow<'_, TypeId>,
        op: AccessOp,
        field: FieldRef,
    ) -> Result<(), VerifyError> {
        let index = flow.index();
        let unbound = VerifyError::Unbound {
            func: self.func,
            index,
        };
        let Some(def) = self.types.field(field.owner, field.index) else {
            return Err(unbound);
        };
        let Some(owner_ref) = self.types.reference_to(field.owner) else {
            return Err(unbound);
        };
        let value = if op == AccessOp::Store {
            if self.types.carries_address(def.ty) {
                return Err(self.unsupported(index, Unsupported::StoreAddress));
            }
            Some(self.pop(flow)?)
        } else {
            None
        };
        let object = self.pop(flow)?;
        self.expect_assignable(index, object, owner_ref)?;
        match op {
            AccessOp::Load => self.push_value(flow, def.ty),
            AccessOp::Store => {
                if let Some(value) = value {
                    self.expect_assignable(index, value, def.ty)?;
                }
            }
            AccessOp::Address => self.push_address_of(flow, def.ty)?,
        }
        flow.fall_through();
        Ok(())
    }

    fn function(
        &mut self,
        flow: &mut Flow<'_, TypeId>,
        op: FuncOp,
        func: FuncRef,
    ) -> Result<(), VerifyError> {
        let index = flow.index();
        let Some(callee) = self.program.function(func) else {
            return Err(VerifyError::Unbound {
                func: self.func,
                index,
            });
        };
        let params: Vec<TypeId> = callee.param_types().collect();
        match op {
            FuncOp::Call => {
                self.pop_args(flow, &params)?;
                self.push_value(flow, callee.ret);
            }
            FuncOp::NewObj => {
                let this = params
                    .first()
                    .and_then(|&p| self.types.referent(p))
                    .filter(|_| callee.ret == TypeId::VOID);
                let Some(this) = this else {
                    return Err(VerifyError::NotConstructor {
                        func: self.func,
                        index,
                        callee: func,
                    });
                };
                self.pop_args(flow, &params[1..])?;
                self.push_value(flow, this);
            }
            FuncOp::LdFtn => flow.push(self.types.stack_type(callee.signature)),
        }
        flow.fall_through();
        Ok(())
    }

    fn typed(
        &mut self,
        flow: &mut Flow<'_, TypeId>,
        op: TypeOp,
        ty: TypeId,
    ) -> Result<(), VerifyError> {
        let index = flow.index();
        match op {
            TypeOp::Conv => {
                let value = self.pop(flow)?;
                if !is_numeric(value) {
                    return Err(self.mismatch(index, Expected::Numeric, value));
                }
                if !is_conversion_target(ty) {
                    return Err(self.mismatch(index, Expected::Numeric, ty));
                }
                self.push_value(flow, ty);
            }
            TypeOp::LdInd => {
                let address = self.pop(flow)?;
                let Some(location) = self.types.referent(address) else {
                    return Err(self.mismatch(index, Expected::Reference, address));
                };
                self.expect_location(index, location, ty)?;
                self.push_value(flow, ty);
            }
            TypeOp::StInd => {
                if self.types.carries_address(ty) {
                    return Err(self.unsupported(index, Unsupported::StoreAddress));
                }
                let value = self.pop(flow)?;
                let address = self.pop(flow)?;
                let Some(location) = self.types.referent(address) else {
                    return Err(self.mismatch(index, Expected::Reference, address));
                };
                self.expect_location(index, location, ty)?;
                self.expect_assignable(index, value, ty)?;
            }
            TypeOp::LdElem => {
                self.pop_index(flow)?;
                let element = self.pop_container(flow)?;
                self.expect_location(index, element, ty)?;
                self.push_value(flow, ty);
            }
            TypeOp::StElem => {
                if self.types.carries_address(ty) {
                    return Err(self.unsupported(index, Unsupported::StoreAddress));
                }
                let value = self.pop(flow)?;
                self.pop_index(flow)?;
                let element = self.pop_container(flow)?;
                self.expect_location(index, element, ty)?;
                self.expect_assignable(index, value, ty)?;
            }
            TypeOp::LdElemA => {
                self.pop_index(flow)?;
                let element = self.pop_container(flow)?;
                self.expect_location(index, element, ty)?;
                self.push_address_of(flow, element)?;
            }
            TypeOp::CallI => {
                let (params, ret) = self.function_type(index, ty)?;
                let target = self.pop(flow)?;
                self.expect_assignable(index, target, ty)?;
                self.pop_args(flow, params)?;
                self.push_value(flow, ret);
            }
        }
        flow.fall_through();
        Ok(())
    }

    fn branch(
        &mut self,
        flow: &mut Flow<'_, TypeId>,
        op: BranchOp,
        target: Label,
    ) -> Result<(), VerifyError> {
        let index = flow.index();
        match op {
            BranchOp::Br => {
                flow.branch_to(target);
                return Ok(());
            }
            BranchOp::BrTrue | BranchOp::BrFalse => {
                let cond = self.pop(flow)?;
                let ok = is_integer(cond) || cond == TypeId::NULL || self.types.is_reference(cond);
                if !ok {
                    return Err(self.mismatch(index, Expected::Condition, cond));
                }
            }
            BranchOp::Beq | BranchOp::Bne => self.pop_equality_pair(flow)?,
            op if op.is_unsigned() => {
                self.pop_pair(flow, Expected::Integer, is_integer)?;
            }
            _ => {
                self.pop_pair(flow, Expected::Numeric, is_numeric)?;
            }
        }
        flow.branch_to(target);
        flow.fall_through();
        Ok(())
    }

    fn merge(
        &mut self,
        target: usize,
        recorded: &AbstractStack<TypeId>,
        incoming: &AbstractStack<TypeId>,
    ) -> Result<AbstractStack<TypeId>, VerifyError> {
        if recorded == incoming {
            return Ok(recorded.clone());
        }
        if recorded.len() != incoming.len() {
            return Err(VerifyError::StackHeightMismatch {
                func: self.func,
                index: target,
                recorded: recorded.len(),
                incoming: incoming.len(),
            });
        }
        recorded
            .iter()
            .zip(incoming.iter())
            .map(|(&a, &b)| {
                phi(self.types, a, b).ok_or(VerifyError::IncompatibleJoin {
                    func: self.func,
                    index: target,
                    recorded: a,
                    incoming: b,
                })
            })
            .collect()
    }

    fn unresolved(&mut self, index: usize, target: Target) -> VerifyError {
        match target {
            Target::End => VerifyError::FallsOffEnd {
                func: self.func,
                index,
            },
            Target::Label(label) => VerifyError::BadBranchTarget {
                func: self.func,
                index,
                label,
            },
        }
    }
}

/// Verifies one function of a bound program.
pub fn verify_function(
    program: &Program,
    func: FuncRef,
    cfg: &VerifyConfig,
) -> Result<VerifiedFunction, VerifyError> {
    let Some(def) = program.function(func) else {
        return Err(VerifyError::Unbound { func, index: 0 });
    };
    if let FunctionKind::Syscall(_) = def.kind {
        return Ok(VerifiedFunction {
            func,
            states: Vec::new(),
            instrs: Vec::new(),
            diagnostics: Vec::new(),
        });
    }
    if def.body.len() > cfg.max_instructions as usize {
        return Err(VerifyError::TooManyInstructions {
            func,
            len: def.body.len(),
        });
    }

    let mut checker = Checker {
        program,
        types: &program.types,
        func,
        def,
    };
    let mut solution = dataflow::solve(&def.body, &def.labels, &mut checker)?;

    let mut reachable = BitSet::new_empty(def.body.len());
    let mut instrs = Vec::with_capacity(def.body.len());
    let effects = core::mem::take(&mut solution.effects);
    for (index, (instr, effect)) in def.body.iter().zip(&effects).enumerate() {
        match effect {
            Some(effect) => {
                reachable.set(index);
                instrs.push(Some(VerifiedInstr {
                    instr: *instr,
                    operands: effect.popped.iter().rev().copied().collect(),
                    results: effect.pushed.clone(),
                }));
            }
            None => {
                instrs.push(None);
                if cfg.report_unreachable {
                    warn!("{func}@{index}: unreachable instruction `{instr}`");
                    solution.add_error(
                        index,
                        Diagnostic::warning(
                            DiagnosticCategory::Verification,
                            UNREACHABLE_CODE,
                            format!("{func}@{index}: unreachable instruction `{instr}`"),
                        ),
                    );
                }
            }
        }
    }
    debug!(
        "verified {}: {} instructions, {} reachable",
        program.qualified_name(func),
        def.body.len(),
        reachable.count()
    );

    Ok(VerifiedFunction {
        func,
        states: solution.states,
        instrs,
        diagnostics: solution.errors,
    })
}

/// Verifies every function; stops at the first failure.
pub fn verify_program(program: &Program, cfg: &VerifyConfig) -> Result<VerifiedProgram, VerifyError> {
    let mut modules = Vec::with_capacity(program.modules.len());
    for (m, module) in program.modules.iter().enumerate() {
        let module_id = ModuleId(u32::try_from(m).unwrap_or(u32::MAX));
        let mut functions = Vec::with_capacity(module.functions.len());
        for i in 0..module.functions.len() {
            let func = FuncRef {
                module: module_id,
                index: u32::try_from(i).unwrap_or(u32::MAX),
            };
            functions.push(verify_function(program, func, cfg)?);
        }
        modules.push(functions);
    }
    Ok(VerifiedProgram { modules })
}

/// Verifies every function, continuing past failures, and collects all diagnostics.
#[must_use]
pub fn verify_program_report(program: &Program, cfg: &VerifyConfig) -> VerifyReport {
    let mut report = VerifyReport {
        verified: Vec::new(),
        diagnostics: Vec::new(),
    };
    for (func, _) in program.functions() {
        match verify_function(program, func, cfg) {
            Ok(verified) => {
                report
                    .diagnostics
                    .extend(verified.diagnostics.iter().map(|(_, d)| d.clone()));
                report.verified.push(verified);
            }
            Err(e) => report.diagnostics.push(e.to_diagnostic()),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{FunctionSig, ProgramBuilder};
    use crate::diagnostics::Severity;

    fn at(index: u32) -> FuncRef {
        FuncRef {
            module: ModuleId(0),
            index,
        }
    }

    fn verify_single(pb: ProgramBuilder) -> Result<VerifiedFunction, VerifyError> {
        let program = pb.build().unwrap();
        verify_function(&program, at(0), &VerifyConfig::default())
    }

    #[test]
    fn add_verifies_to_an_empty_stack() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let sig = FunctionSig::new("add", TypeId::I32)
            .param("a", TypeId::I32)
            .param("b", TypeId::I32);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).ldarg(1).add().ret();
        pb.define(f).unwrap();

        let v = verify_single(pb).unwrap();
        let depths: Vec<_> = v.states.iter().map(|s| s.as_ref().unwrap().len()).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);
        let add = v.instrs[2].as_ref().unwrap();
        assert_eq!(add.operands, vec![TypeId::I32, TypeId::I32]);
        assert_eq!(add.results, vec![TypeId::I32]);
        assert_eq!(v.instrs[3].as_ref().unwrap().operands, vec![TypeId::I32]);
        assert!(v.diagnostics.is_empty());
    }

    #[test]
    fn comparing_int_with_reference_is_a_type_mismatch() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let ref_i32 = pb.types_mut().reference(TypeId::I32).unwrap();
        let sig = FunctionSig::new("f", TypeId::VOID)
            .param("a", TypeId::I32)
            .param("p", ref_i32);
        let mut f = pb.function(m, sig).unwrap();
        let l = f.label();
        f.ldarg(0).ldarg(1).beq(l);
        f.place(l).unwrap();
        f.ret();
        pb.define(f).unwrap();

        let err = verify_single(pb).unwrap_err();
        assert_eq!(
            err,
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Type(TypeId::I32),
                found: ref_i32,
            }
        );
        assert_eq!(err.to_diagnostic().severity, Severity::Error);
    }

    /// `f(p, q)` loading both params and running `op` on them.
    fn compare_params(
        p: impl Fn(&mut crate::types::TypeTable) -> TypeId,
        q: impl Fn(&mut crate::types::TypeTable) -> TypeId,
        op: impl Fn(&mut crate::asm::FunctionBuilder),
    ) -> (Result<VerifiedFunction, VerifyError>, TypeId, TypeId) {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let p = p(pb.types_mut());
        let q = q(pb.types_mut());
        let sig = FunctionSig::new("f", TypeId::VOID).param("p", p).param("q", q);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).ldarg(1);
        op(&mut f);
        f.ret();
        pb.define(f).unwrap();
        (verify_single(pb), p, q)
    }

    #[test]
    fn equality_needs_identical_reference_types() {
        let ref_i32 = |t: &mut crate::types::TypeTable| t.reference(TypeId::I32).unwrap();
        let ref_i64 = |t: &mut crate::types::TypeTable| t.reference(TypeId::I64).unwrap();
        let beq = |f: &mut crate::asm::FunctionBuilder| {
            let l = f.label();
            f.beq(l);
            f.place(l).unwrap();
        };
        let ceq = |f: &mut crate::asm::FunctionBuilder| {
            f.ceq().pop();
        };

        let (r, p, q) = compare_params(ref_i32, ref_i64, beq);
        assert_eq!(
            r.unwrap_err(),
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Type(p),
                found: q,
            }
        );
        let (r, p, q) = compare_params(ref_i32, ref_i64, ceq);
        assert_eq!(
            r.unwrap_err(),
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Type(p),
                found: q,
            }
        );
        assert!(compare_params(ref_i32, ref_i32, beq).0.is_ok());
        assert!(compare_params(ref_i64, ref_i64, ceq).0.is_ok());
    }

    #[test]
    fn null_compares_against_any_reference() {
        for null_first in [false, true] {
            let mut pb = ProgramBuilder::new();
            let m = pb.module("m");
            let ref_i64 = pb.types_mut().reference(TypeId::I64).unwrap();
            let sig = FunctionSig::new("f", TypeId::VOID).param("p", ref_i64);
            let mut f = pb.function(m, sig).unwrap();
            let l = f.label();
            if null_first {
                f.ldnull().ldarg(0);
            } else {
                f.ldarg(0).ldnull();
            }
            f.bne(l);
            f.place(l).unwrap();
            f.ldarg(0).ldnull().ceq().pop().ret();
            pb.define(f).unwrap();
            assert!(verify_single(pb).is_ok());
        }

        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::VOID)).unwrap();
        f.ldnull().ldc_i32(0).ceq().pop().ret();
        pb.define(f).unwrap();
        assert_eq!(
            verify_single(pb).unwrap_err(),
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Type(TypeId::NULL),
                found: TypeId::I32,
            }
        );
    }

    #[test]
    fn ordered_comparisons_take_matching_numbers() {
        let ty = |t: TypeId| move |_: &mut crate::types::TypeTable| t;
        let cgt = |f: &mut crate::asm::FunctionBuilder| {
            f.cgt().pop();
        };
        let clt = |f: &mut crate::asm::FunctionBuilder| {
            f.clt().pop();
        };
        let clt_un = |f: &mut crate::asm::FunctionBuilder| {
            f.clt_un().pop();
        };

        let v = compare_params(ty(TypeId::F64), ty(TypeId::F64), cgt).0.unwrap();
        assert_eq!(v.instrs[2].as_ref().unwrap().results, vec![TypeId::I32]);
        assert!(compare_params(ty(TypeId::I64), ty(TypeId::I64), clt_un).0.is_ok());

        let (r, _, _) = compare_params(ty(TypeId::I32), ty(TypeId::I64), clt);
        assert_eq!(
            r.unwrap_err(),
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Type(TypeId::I32),
                found: TypeId::I64,
            }
        );
        let (r, _, _) = compare_params(ty(TypeId::F32), ty(TypeId::F32), clt_un);
        assert_eq!(
            r.unwrap_err(),
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Integer,
                found: TypeId::F32,
            }
        );
        let ref_i32 = |t: &mut crate::types::TypeTable| t.reference(TypeId::I32).unwrap();
        let (r, p, _) = compare_params(ref_i32, ref_i32, cgt);
        assert_eq!(
            r.unwrap_err(),
            VerifyError::TypeMismatch {
                func: at(0),
                index: 2,
                expected: Expected::Numeric,
                found: p,
            }
        );
    }

    #[test]
    fn narrow_values_widen_on_the_stack_and_store_back() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let sig = FunctionSig::new("f", TypeId::U8)
            .param("a", TypeId::U8)
            .local("b", TypeId::I16);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).stloc(0).ldloc(0).ret();
        pb.define(f).unwrap();

        let v = verify_single(pb).unwrap();
        assert_eq!(v.states[1].as_ref().unwrap().top(), Some(&TypeId::I32));
    }

    #[test]
    fn int64_does_not_narrow() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let sig = FunctionSig::new("f", TypeId::VOID).local("x", TypeId::I32);
        let mut f = pb.function(m, sig).unwrap();
        f.ldc_i64(1).stloc(0).ret();
        pb.define(f).unwrap();

        assert!(matches!(
            verify_single(pb),
            Err(VerifyError::TypeMismatch {
                index: 1,
                found: TypeId::I64,
                ..
            })
        ));
    }

    #[test]
    fn null_merges_with_a_reference_at_a_join() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let ref_i64 = pb.types_mut().reference(TypeId::I64).unwrap();
        let sig = FunctionSig::new("f", TypeId::VOID)
            .param("c", TypeId::I32)
            .param("p", ref_i64)
            .local("q", ref_i64);
        let mut f = pb.function(m, sig).unwrap();
        let else_ = f.label();
        let join = f.label();
        f.ldarg(0).brfalse(else_);
        f.ldnull().br(join);
        f.place(else_).unwrap();
        f.ldarg(1);
        f.place(join).unwrap();
        f.stloc(0).ret();
        pb.define(f).unwrap();

        let v = verify_single(pb).unwrap();
        assert_eq!(v.states[5].as_ref().unwrap().top(), Some(&ref_i64));
        assert_eq!(
            v.instrs[5].as_ref().unwrap().operands,
            vec![ref_i64],
            "the store sees the merged type"
        );
    }

    #[test]
    fn divergent_types_at_a_join_are_fatal() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let sig = FunctionSig::new("f", TypeId::VOID).param("c", TypeId::I32);
        let mut f = pb.function(m, sig).unwrap();
        let else_ = f.label();
        let join = f.label();
        f.ldarg(0).brfalse(else_);
        f.ldc_i32(1).br(join);
        f.place(else_).unwrap();
        f.ldc_f64(1.0);
        f.place(join).unwrap();
        f.pop().ret();
        pb.define(f).unwrap();

        assert_eq!(
            verify_single(pb).unwrap_err(),
            VerifyError::IncompatibleJoin {
                func: at(0),
                index: 5,
                recorded: TypeId::F64,
                incoming: TypeId::I32,
            }
        );
    }

    #[test]
    fn returning_a_reference_is_unsupported() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let ref_i32 = pb.types_mut().reference(TypeId::I32).unwrap();
        let sig = FunctionSig::new("f", ref_i32).param("p", ref_i32);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).ret();
        pb.define(f).unwrap();

        assert_eq!(
            verify_single(pb).unwrap_err(),
            VerifyError::Unsupported {
                func: at(0),
                index: 1,
                what: Unsupported::ReturnAddress
            }
        );
    }

    #[test]
    fn storing_a_span_through_a_field_is_unsupported() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let span = pb.types_mut().span(TypeId::U8).unwrap();
        let holder = pb
            .types_mut()
            .declare_struct("Holder", &[("s", span)])
            .unwrap();
        let holder_ref = pb.types_mut().reference(holder).unwrap();
        let sig = FunctionSig::new("f", TypeId::VOID)
            .param("h", holder_ref)
            .param("s", span);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).ldarg(1).stfld(holder, 0).ret();
        pb.define(f).unwrap();

        assert_eq!(
            verify_single(pb).unwrap_err(),
            VerifyError::Unsupported {
                func: at(0),
                index: 2,
                what: Unsupported::StoreAddress
            }
        );
    }

    #[test]
    fn underflow_and_fall_off_end() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::VOID)).unwrap();
        f.pop().ret();
        pb.define(f).unwrap();
        assert_eq!(
            verify_single(pb).unwrap_err(),
            VerifyError::StackUnderflow {
                func: at(0),
                index: 0
            }
        );

        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::VOID)).unwrap();
        f.nop();
        pb.define(f).unwrap();
        assert_eq!(
            verify_single(pb).unwrap_err(),
            VerifyError::FallsOffEnd {
                func: at(0),
                index: 0
            }
        );
    }

    #[test]
    fn calls_check_arity_and_argument_types() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let caller = pb.function(m, FunctionSig::new("caller", TypeId::I64)).unwrap();
        let callee = pb
            .declare(
                m,
                FunctionSig::new("callee", TypeId::I64)
                    .param("x", TypeId::I64)
                    .param("y", TypeId::I8),
            )
            .unwrap();
        let mut f = caller;
        f.ldc_i64(1).ldc_i32(2).call(callee).ret();
        pb.define(f).unwrap();
        let mut g = pb.body(callee);
        g.ldarg(0).ret();
        pb.define(g).unwrap();
        let program = pb.build().unwrap();
        let v = verify_function(&program, at(0), &VerifyConfig::default()).unwrap();
        assert_eq!(v.states[3].as_ref().unwrap().top(), Some(&TypeId::I64));

        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut f = pb.function(m, FunctionSig::new("caller", TypeId::VOID)).unwrap();
        let callee = pb
            .declare(m, FunctionSig::new("callee", TypeId::VOID).param("x", TypeId::I32))
            .unwrap();
        f.call(callee).ret();
        pb.define(f).unwrap();
        let mut g = pb.body(callee);
        g.ret();
        pb.define(g).unwrap();
        let program = pb.build().unwrap();
        assert_eq!(
            verify_function(&program, at(0), &VerifyConfig::default()).unwrap_err(),
            VerifyError::ArityMismatch {
                func: at(0),
                index: 0,
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn array_elements_and_addresses() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let arr = pb.types_mut().array(TypeId::U16, 8).unwrap();
        let arr_ref = pb.types_mut().reference(arr).unwrap();
        let sig = FunctionSig::new("f", TypeId::I32).param("a", arr_ref);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0)
            .ldc_i32(3)
            .ldarg(0)
            .ldc_i32(2)
            .ldelem(TypeId::U16)
            .stelem(TypeId::I16)
            .ldarg(0)
            .ldc_i32(0)
            .ldelema(TypeId::U16)
            .ldind(TypeId::U16)
            .ret();
        pb.define(f).unwrap();

        let v = verify_single(pb).unwrap();
        let ref_i16 = v.instrs[8].as_ref().unwrap().results[0];
        assert_eq!(ref_i16, v.instrs[9].as_ref().unwrap().operands[0]);
    }

    #[test]
    fn unreachable_code_is_a_warning() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::VOID)).unwrap();
        f.ret().nop().ret();
        pb.define(f).unwrap();
        let program = pb.build().unwrap();

        let v = verify_function(&program, at(0), &VerifyConfig::default()).unwrap();
        assert!(!v.is_reachable(1));
        assert_eq!(v.diagnostics.len(), 2);
        assert_eq!(v.diagnostics[0].1.code, UNREACHABLE_CODE);
        assert_eq!(v.diagnostics[0].1.severity, Severity::Warning);

        let quiet = VerifyConfig {
            report_unreachable: false,
            ..VerifyConfig::default()
        };
        let v = verify_function(&program, at(0), &quiet).unwrap();
        assert!(v.diagnostics.is_empty());
    }

    #[test]
    fn report_keeps_going_after_a_failure() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut bad = pb.function(m, FunctionSig::new("bad", TypeId::VOID)).unwrap();
        bad.add().ret();
        pb.define(bad).unwrap();
        let mut good = pb.function(m, FunctionSig::new("good", TypeId::VOID)).unwrap();
        good.ret();
        pb.define(good).unwrap();
        let program = pb.build().unwrap();

        let report = verify_program_report(&program, &VerifyConfig::default());
        assert!(!report.is_ok());
        assert_eq!(report.verified.len(), 1);
        assert_eq!(report.verified[0].func, at(1));
        assert_eq!(report.diagnostics[0].code, 2002);
        assert!(verify_program(&program, &VerifyConfig::default()).is_err());
    }

    #[test]
    fn merge_laws() {
        let mut types = TypeTable::new();
        let r = types.reference(TypeId::I32).unwrap();
        for t in [TypeId::I32, TypeId::I64, TypeId::F64, r, TypeId::NULL] {
            assert_eq!(phi(&types, t, t), Some(t));
        }
        assert_eq!(phi(&types, TypeId::NULL, r), Some(r));
        assert_eq!(phi(&types, r, TypeId::NULL), Some(r));
        assert_eq!(phi(&types, TypeId::I32, TypeId::F32), None);
        assert_eq!(
            phi(&types, TypeId::I32, TypeId::I64),
            phi(&types, TypeId::I64, TypeId::I32)
        );
        assert_eq!(phi(&types, TypeId::NULL, TypeId::I32), None);
    }

    #[test]
    fn assignability_rules() {
        let mut types = TypeTable::new();
        let r = types.reference(TypeId::U32).unwrap();
        assert!(assignable(&types, TypeId::I32, TypeId::U8));
        assert!(assignable(&types, TypeId::I32, TypeId::BOOL));
        assert!(assignable(&types, TypeId::I32, TypeId::U32));
        assert!(!assignable(&types, TypeId::I32, TypeId::I64));
        assert!(assignable(&types, TypeId::NULL, r));
        assert!(!assignable(&types, TypeId::NULL, TypeId::I32));
        assert!(assignable(&types, types.stack_type(r), r));
    }
}
