// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bound instruction set.
//!
//! Instructions are a closed sum over operand categories; each variant carries only the operands
//! that category needs. Labels are not instructions: a [`Label`] names an instruction index
//! through the owning function's label table.

use core::fmt;

use crate::program::FuncRef;
use crate::types::TypeId;

/// A branch target, resolved through [`FunctionDef::labels`](crate::program::FunctionDef::labels).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// A reference to field `index` of the structured type `owner`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// The structured type declaring the field.
    pub owner: TypeId,
    /// Field index in declaration order.
    pub index: u16,
}

/// Operand category of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// No operand.
    None,
    /// Literal operand.
    Constant,
    /// Parameter operand.
    Argument,
    /// Local variable operand.
    Local,
    /// Field operand.
    Field,
    /// Function operand.
    Function,
    /// Type operand.
    Type,
    /// Label operand.
    Branch,
}

/// Operand-free operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoneOp {
    /// `nop`.
    Nop,
    /// `add`.
    Add,
    /// `sub`.
    Sub,
    /// `mul`.
    Mul,
    /// `div`.
    Div,
    /// `div.un` (unsigned integer division).
    DivUn,
    /// `rem`.
    Rem,
    /// `rem.un`.
    RemUn,
    /// `and`.
    And,
    /// `or`.
    Or,
    /// `xor`.
    Xor,
    /// `shl`.
    Shl,
    /// `shr` (arithmetic).
    Shr,
    /// `shr.un` (logical).
    ShrUn,
    /// `neg`.
    Neg,
    /// `not` (bitwise complement).
    Not,
    /// `ceq`.
    Ceq,
    /// `cgt`.
    Cgt,
    /// `cgt.un`.
    CgtUn,
    /// `clt`.
    Clt,
    /// `clt.un`.
    CltUn,
    /// `dup`.
    Dup,
    /// `pop`.
    Pop,
    /// `ret`.
    Ret,
    /// `ldnull`.
    LdNull,
}

/// A literal pushed by a constant instruction. Floats are stored as raw IEEE bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    /// `ldc.i4`.
    I32(i32),
    /// `ldc.i8`.
    I64(i64),
    /// `ldc.r4`.
    F32(u32),
    /// `ldc.r8`.
    F64(u64),
}

/// Access mode for arguments, locals and fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessOp {
    /// Push the value.
    Load,
    /// Pop a value and store it.
    Store,
    /// Push a reference to the storage location.
    Address,
}

/// Operations on a function symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FuncOp {
    /// `call`.
    Call,
    /// `newobj`: construct a value by calling a constructor whose first parameter is `this`.
    NewObj,
    /// `ldftn`: push a function value.
    LdFtn,
}

/// Operations carrying a type operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeOp {
    /// `conv.T`.
    Conv,
    /// `ldind.T`.
    LdInd,
    /// `stind.T`.
    StInd,
    /// `ldelem.T`.
    LdElem,
    /// `stelem.T`.
    StElem,
    /// `ldelema.T`.
    LdElemA,
    /// `calli sig`: call through a function value of the given function type.
    CallI,
}

/// Branch operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BranchOp {
    /// Unconditional branch.
    Br,
    /// Branch if non-zero / non-null.
    BrTrue,
    /// Branch if zero / null.
    BrFalse,
    /// Branch if equal.
    Beq,
    /// Branch if not equal.
    Bne,
    /// Branch if greater or equal.
    Bge,
    /// Unsigned `bge`.
    BgeUn,
    /// Branch if greater.
    Bgt,
    /// Unsigned `bgt`.
    BgtUn,
    /// Branch if less or equal.
    Ble,
    /// Unsigned `ble`.
    BleUn,
    /// Branch if less.
    Blt,
    /// Unsigned `blt`.
    BltUn,
}

impl BranchOp {
    /// Number of operands this branch pops.
    #[must_use]
    pub const fn operand_count(self) -> usize {
        match self {
            Self::Br => 0,
            Self::BrTrue | Self::BrFalse => 1,
            _ => 2,
        }
    }

    /// Returns `true` for the unsigned ordering comparisons.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::BgeUn | Self::BgtUn | Self::BleUn | Self::BltUn
        )
    }

    /// Returns `true` for `beq`/`bne`.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Beq | Self::Bne)
    }
}

/// A bound instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    /// An operand-free operation.
    None(NoneOp),
    /// A literal.
    Constant(Constant),
    /// `ldarg`/`starg`/`ldarga`.
    Argument {
        /// Access mode.
        op: AccessOp,
        /// Parameter index.
        index: u16,
    },
    /// `ldloc`/`stloc`/`ldloca`.
    Local {
        /// Access mode.
        op: AccessOp,
        /// Local index.
        index: u16,
    },
    /// `ldfld`/`stfld`/`ldflda`.
    Field {
        /// Access mode.
        op: AccessOp,
        /// Field symbol.
        field: FieldRef,
    },
    /// `call`/`newobj`/`ldftn`.
    Function {
        /// Operation.
        op: FuncOp,
        /// Callee symbol.
        func: FuncRef,
    },
    /// Conversions, indirect and element access, `calli`.
    Type {
        /// Operation.
        op: TypeOp,
        /// Annotated type.
        ty: TypeId,
    },
    /// Conditional and unconditional branches.
    Branch {
        /// Operation.
        op: BranchOp,
        /// Target label.
        target: Label,
    },
}

impl Instr {
    /// Returns the operand category.
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::None(_) => Category::None,
            Self::Constant(_) => Category::Constant,
            Self::Argument { .. } => Category::Argument,
            Self::Local { .. } => Category::Local,
            Self::Field { .. } => Category::Field,
            Self::Function { .. } => Category::Function,
            Self::Type { .. } => Category::Type,
            Self::Branch { .. } => Category::Branch,
        }
    }

    /// Returns `true` if control never continues to the next instruction.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::None(NoneOp::Ret)
                | Self::Branch {
                    op: BranchOp::Br,
                    ..
                }
        )
    }

    /// Returns the branch target, if any.
    #[must_use]
    pub const fn target(&self) -> Option<Label> {
        match self {
            Self::Branch { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Returns the assembly mnemonic.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::None(op) => match op {
                NoneOp::Nop => "nop",
                NoneOp::Add => "add",
                NoneOp::Sub => "sub",
                NoneOp::Mul => "mul",
                NoneOp::Div => "div",
                NoneOp::DivUn => "div.un",
                NoneOp::Rem => "rem",
                NoneOp::RemUn => "rem.un",
                NoneOp::And => "and",
                NoneOp::Or => "or",
                NoneOp::Xor => "xor",
                NoneOp::Shl => "shl",
                NoneOp::Shr => "shr",
                NoneOp::ShrUn => "shr.un",
                NoneOp::Neg => "neg",
                NoneOp::Not => "not",
                NoneOp::Ceq => "ceq",
                NoneOp::Cgt => "cgt",
                NoneOp::CgtUn => "cgt.un",
                NoneOp::Clt => "clt",
                NoneOp::CltUn => "clt.un",
                NoneOp::Dup => "dup",
                NoneOp::Pop => "pop",
                NoneOp::Ret => "ret",
                NoneOp::LdNull => "ldnull",
            },
            Self::Constant(c) => match c {
                Constant::I32(_) => "ldc.i4",
                Constant::I64(_) => "ldc.i8",
                Constant::F32(_) => "ldc.r4",
                Constant::F64(_) => "ldc.r8",
            },
            Self::Argument { op, .. } => match op {
                AccessOp::Load => "ldarg",
                AccessOp::Store => "starg",
                AccessOp::Address => "ldarga",
            },
            Self::Local { op, .. } => match op {
                AccessOp::Load => "ldloc",
                AccessOp::Store => "stloc",
                AccessOp::Address => "ldloca",
            },
            Self::Field { op, .. } => match op {
                AccessOp::Load => "ldfld",
                AccessOp::Store => "stfld",
                AccessOp::Address => "ldflda",
            },
            Self::Function { op, .. } => match op {
                FuncOp::Call => "call",
                FuncOp::NewObj => "newobj",
                FuncOp::LdFtn => "ldftn",
            },
            Self::Type { op, .. } => match op {
                TypeOp::Conv => "conv",
                TypeOp::LdInd => "ldind",
                TypeOp::StInd => "stind",
                TypeOp::LdElem => "ldelem",
                TypeOp::StElem => "stelem",
                TypeOp::LdElemA => "ldelema",
                TypeOp::CallI => "calli",
            },
            Self::Branch { op, .. } => match op {
                BranchOp::Br => "br",
                BranchOp::BrTrue => "brtrue",
                BranchOp::BrFalse => "brfalse",
                BranchOp::Beq => "beq",
                BranchOp::Bne => "bne",
                BranchOp::Bge => "bge",
                BranchOp::BgeUn => "bge.un",
                BranchOp::Bgt => "bgt",
                BranchOp::BgtUn => "bgt.un",
                BranchOp::Ble => "ble",
                BranchOp::BleUn => "ble.un",
                BranchOp::Blt => "blt",
                BranchOp::BltUn => "blt.un",
            },
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match self {
            Self::None(_) => Ok(()),
            Self::Constant(c) => match *c {
                Constant::I32(v) => write!(f, " {v}"),
                Constant::I64(v) => write!(f, " {v}"),
                Constant::F32(bits) => write!(f, " {}", f32::from_bits(bits)),
                Constant::F64(bits) => write!(f, " {}", f64::from_bits(bits)),
            },
            Self::Argument { index, .. } | Self::Local { index, .. } => write!(f, " {index}"),
            Self::Field { field, .. } => write!(f, " t{}.{}", field.owner.0, field.index),
            Self::Function { func, .. } => write!(f, " m{}.f{}", func.module.0, func.index),
            Self::Type { ty, .. } => write!(f, " t{}", ty.0),
            Self::Branch { target, .. } => write!(f, " L{}", target.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ModuleId;

    #[test]
    fn terminators() {
        assert!(Instr::None(NoneOp::Ret).is_terminator());
        assert!(
            Instr::Branch {
                op: BranchOp::Br,
                target: Label(0)
            }
            .is_terminator()
        );
        assert!(
            !Instr::Branch {
                op: BranchOp::Beq,
                target: Label(0)
            }
            .is_terminator()
        );
        assert!(!Instr::None(NoneOp::Add).is_terminator());
    }

    #[test]
    fn display_uses_mnemonics() {
        let call = Instr::Function {
            op: FuncOp::Call,
            func: FuncRef {
                module: ModuleId(1),
                index: 2,
            },
        };
        assert_eq!(call.to_string(), "call m1.f2");
        assert_eq!(Instr::Constant(Constant::I32(-3)).to_string(), "ldc.i4 -3");
        assert_eq!(
            Instr::Branch {
                op: BranchOp::BgeUn,
                target: Label(4)
            }
            .to_string(),
            "bge.un L4"
        );
    }
}
