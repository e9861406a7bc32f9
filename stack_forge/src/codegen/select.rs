// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode selection: maps each verified instruction to a short sequence of target operations,
//! choosing width and signedness variants from the verified operand types.

use crate::codegen::EncodeError;
use crate::codegen::frame::FrameLayout;
use crate::instr::{AccessOp, BranchOp, Constant, FieldRef, FuncOp, Instr, Label, NoneOp, TypeOp};
use crate::opcode::Opcode;
use crate::program::{FuncRef, FunctionDef, Program};
use crate::types::{TypeId, TypeKind, TypeTable};
use crate::verifier::VerifiedInstr;

/// The operand of a selected operation, before tokens and branch displacements are resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Operand {
    None,
    U8(u8),
    U16(u16),
    Func(FuncRef),
    FuncSlots(FuncRef, u8),
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    Slot(u8),
    SlotCount(u8, u8),
    Offset(u16),
    OffsetSize(u16, u16),
    Size(u16),
    Branch(Label),
}

/// One target operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Op {
    /// For branches, the short form until layout picks the final form.
    pub(crate) opcode: Opcode,
    pub(crate) operand: Operand,
}

impl Op {
    const fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    const fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Longest encoding this operation can end up with.
    pub(crate) fn max_len(&self) -> usize {
        match self.opcode.long_form() {
            Some(long) => long.len(),
            None => self.opcode.len(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Class {
    W32,
    W64,
    F32,
    F64,
}

/// Move width of a stack value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Width {
    W32,
    W64,
    Block(u8),
}

/// Memory access variant; the table order of every load family.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Load {
    I8,
    U8,
    I16,
    U16,
    W32,
    W64,
    Block(u16),
}

/// The table order of every store family.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Store {
    W8,
    W16,
    W32,
    W64,
    Block(u16),
}

use Opcode as O;

const LDIND: [Opcode; 7] = [
    O::LdIndI8,
    O::LdIndU8,
    O::LdIndI16,
    O::LdIndU16,
    O::LdInd32,
    O::LdInd64,
    O::LdIndBlock,
];
const STIND: [Opcode; 5] = [O::StInd8, O::StInd16, O::StInd32, O::StInd64, O::StIndBlock];
const LDFLD: [Opcode; 7] = [
    O::LdFldI8,
    O::LdFldU8,
    O::LdFldI16,
    O::LdFldU16,
    O::LdFld32,
    O::LdFld64,
    O::LdFldBlock,
];
const STFLD: [Opcode; 5] = [O::StFld8, O::StFld16, O::StFld32, O::StFld64, O::StFldBlock];
const LDELEM: [Opcode; 7] = [
    O::LdElemI8,
    O::LdElemU8,
    O::LdElemI16,
    O::LdElemU16,
    O::LdElem32,
    O::LdElem64,
    O::LdElemBlock,
];
const STELEM: [Opcode; 5] = [O::StElem8, O::StElem16, O::StElem32, O::StElem64, O::StElemBlock];
const LDSPAN: [Opcode; 7] = [
    O::LdSpanElemI8,
    O::LdSpanElemU8,
    O::LdSpanElemI16,
    O::LdSpanElemU16,
    O::LdSpanElem32,
    O::LdSpanElem64,
    O::LdSpanElemBlock,
];
const STSPAN: [Opcode; 5] = [
    O::StSpanElem8,
    O::StSpanElem16,
    O::StSpanElem32,
    O::StSpanElem64,
    O::StSpanElemBlock,
];

impl Load {
    fn pick(self, family: &[Opcode; 7]) -> Opcode {
        family[match self {
            Self::I8 => 0,
            Self::U8 => 1,
            Self::I16 => 2,
            Self::U16 => 3,
            Self::W32 => 4,
            Self::W64 => 5,
            Self::Block(_) => 6,
        }]
    }
}

impl Store {
    fn pick(self, family: &[Opcode; 5]) -> Opcode {
        family[match self {
            Self::W8 => 0,
            Self::W16 => 1,
            Self::W32 => 2,
            Self::W64 => 3,
            Self::Block(_) => 4,
        }]
    }
}

/// Selects operations for the instructions of one function.
pub(crate) struct Selector<'a> {
    pub(crate) program: &'a Program,
    pub(crate) types: &'a TypeTable,
    pub(crate) func: FuncRef,
    pub(crate) def: &'a FunctionDef,
    pub(crate) frame: &'a FrameLayout,
}

impl Selector<'_> {
    /// Appends the operations for instruction `index` to `out`.
    pub(crate) fn select(
        &self,
        index: usize,
        vi: &VerifiedInstr,
        out: &mut Vec<Op>,
    ) -> Result<(), EncodeError> {
        match vi.instr {
            Instr::None(op) => self.none(index, op, vi, out)?,
            Instr::Constant(c) => out.push(match c {
                Constant::I32(v) => Op::new(O::LdcI32, Operand::I32(v)),
                Constant::I64(v) => Op::new(O::LdcI64, Operand::I64(v)),
                Constant::F32(bits) => Op::new(O::LdcF32, Operand::F32(bits)),
                Constant::F64(bits) => Op::new(O::LdcF64, Operand::F64(bits)),
            }),
            Instr::Argument { op, index: arg } => {
                let slot = self.frame.param_slot(arg).ok_or(self.unbound(index))?;
                let ty = self.def.params[usize::from(arg)].ty;
                out.push(self.slot_access(index, op, slot, ty)?);
            }
            Instr::Local { op, index: local } => {
                let slot = self.frame.local_slot(local).ok_or(self.unbound(index))?;
                let ty = self.def.locals[usize::from(local)].ty;
                out.push(self.slot_access(index, op, slot, ty)?);
            }
            Instr::Field { op, field } => out.push(self.field(index, op, field)?),
            Instr::Function { op, func } => out.push(match op {
                FuncOp::Call => Op::new(O::Call, Operand::Func(func)),
                FuncOp::LdFtn => Op::new(O::LdFtn, Operand::Func(func)),
                FuncOp::NewObj => {
                    let object = self
                        .program
                        .function(func)
                        .and_then(|ctor| ctor.params.first())
                        .and_then(|this| self.types.referent(this.ty))
                        .ok_or(self.unbound(index))?;
                    let slots = self.count(index, self.types.slots(object))?;
                    Op::new(O::NewObj, Operand::FuncSlots(func, slots))
                }
            }),
            Instr::Type { op, ty } => self.typed(index, op, ty, vi, out)?,
            Instr::Branch { op, target } => self.branch(index, op, target, vi, out)?,
        }
        Ok(())
    }

    fn none(
        &self,
        index: usize,
        op: NoneOp,
        vi: &VerifiedInstr,
        out: &mut Vec<Op>,
    ) -> Result<(), EncodeError> {
        let operand = vi.operands.first().copied().unwrap_or(TypeId::VOID);
        let opcode = match op {
            NoneOp::Nop => O::Nop,
            NoneOp::LdNull => O::LdNull,
            NoneOp::Add => self.numeric(index, operand, [O::AddI32, O::AddI64, O::AddF32, O::AddF64])?,
            NoneOp::Sub => self.numeric(index, operand, [O::SubI32, O::SubI64, O::SubF32, O::SubF64])?,
            NoneOp::Mul => self.numeric(index, operand, [O::MulI32, O::MulI64, O::MulF32, O::MulF64])?,
            NoneOp::Div => self.numeric(index, operand, [O::DivI32, O::DivI64, O::DivF32, O::DivF64])?,
            NoneOp::Rem => self.numeric(index, operand, [O::RemI32, O::RemI64, O::RemF32, O::RemF64])?,
            NoneOp::Neg => self.numeric(index, operand, [O::NegI32, O::NegI64, O::NegF32, O::NegF64])?,
            NoneOp::Ceq => self.numeric(index, operand, [O::CeqI32, O::CeqI64, O::CeqF32, O::CeqF64])?,
            NoneOp::Cgt => self.numeric(index, operand, [O::CgtI32, O::CgtI64, O::CgtF32, O::CgtF64])?,
            NoneOp::Clt => self.numeric(index, operand, [O::CltI32, O::CltI64, O::CltF32, O::CltF64])?,
            NoneOp::DivUn => self.integer(index, operand, [O::DivUnI32, O::DivUnI64])?,
            NoneOp::RemUn => self.integer(index, operand, [O::RemUnI32, O::RemUnI64])?,
            NoneOp::And => self.integer(index, operand, [O::AndI32, O::AndI64])?,
            NoneOp::Or => self.integer(index, operand, [O::OrI32, O::OrI64])?,
            NoneOp::Xor => self.integer(index, operand, [O::XorI32, O::XorI64])?,
            NoneOp::Shl => self.integer(index, operand, [O::ShlI32, O::ShlI64])?,
            NoneOp::Shr => self.integer(index, operand, [O::ShrI32, O::ShrI64])?,
            NoneOp::ShrUn => self.integer(index, operand, [O::ShrUnI32, O::ShrUnI64])?,
            NoneOp::Not => self.integer(index, operand, [O::NotI32, O::NotI64])?,
            NoneOp::CgtUn => self.integer(index, operand, [O::CgtUnI32, O::CgtUnI64])?,
            NoneOp::CltUn => self.integer(index, operand, [O::CltUnI32, O::CltUnI64])?,
            NoneOp::Dup => {
                out.push(match self.width(index, operand)? {
                    Width::W32 => Op::bare(O::Dup32),
                    Width::W64 => Op::bare(O::Dup64),
                    Width::Block(n) => Op::new(O::DupBlock, Operand::U8(n)),
                });
                return Ok(());
            }
            NoneOp::Pop => {
                out.push(match self.width(index, operand)? {
                    Width::W32 => Op::bare(O::Pop32),
                    Width::W64 => Op::bare(O::Pop64),
                    Width::Block(n) => Op::new(O::PopBlock, Operand::U8(n)),
                });
                return Ok(());
            }
            NoneOp::Ret => {
                let ret = ret_op_for(self.types, self.def.ret)
                    .ok_or_else(|| self.too_large(index, self.types.slots(self.def.ret)))?;
                out.push(ret);
                return Ok(());
            }
        };
        out.push(Op::bare(opcode));
        Ok(())
    }

    fn slot_access(
        &self,
        index: usize,
        op: AccessOp,
        slot: u8,
        ty: TypeId,
    ) -> Result<Op, EncodeError> {
        Ok(match op {
            AccessOp::Address => Op::new(O::LdSlotAddr, Operand::Slot(slot)),
            AccessOp::Load => match self.width(index, ty)? {
                Width::W32 => Op::new(O::LdSlot32, Operand::Slot(slot)),
                Width::W64 => Op::new(O::LdSlot64, Operand::Slot(slot)),
                Width::Block(n) => Op::new(O::LdSlotBlock, Operand::SlotCount(slot, n)),
            },
            AccessOp::Store => {
                let narrow = match self.types.kind(ty) {
                    TypeKind::I8 => Some(O::StSlotI8),
                    TypeKind::U8 | TypeKind::Bool => Some(O::StSlotU8),
                    TypeKind::I16 => Some(O::StSlotI16),
                    TypeKind::U16 => Some(O::StSlotU16),
                    _ => None,
                };
                match (narrow, self.width(index, ty)?) {
                    (Some(opcode), _) => Op::new(opcode, Operand::Slot(slot)),
                    (None, Width::W32) => Op::new(O::StSlot32, Operand::Slot(slot)),
                    (None, Width::W64) => Op::new(O::StSlot64, Operand::Slot(slot)),
                    (None, Width::Block(n)) => Op::new(O::StSlotBlock, Operand::SlotCount(slot, n)),
                }
            }
        })
    }

    fn field(&self, index: usize, op: AccessOp, field: FieldRef) -> Result<Op, EncodeError> {
        let def = self
            .types
            .field(field.owner, field.index)
            .ok_or(self.unbound(index))?;
        let offset = self.u16(index, def.offset)?;
        Ok(match op {
            AccessOp::Address => Op::new(O::LdFldA, Operand::Offset(offset)),
            AccessOp::Load => match self.load(index, def.ty)? {
                Load::Block(size) => Op::new(O::LdFldBlock, Operand::OffsetSize(offset, size)),
                kind => Op::new(kind.pick(&LDFLD), Operand::Offset(offset)),
            },
            AccessOp::Store => match self.store(index, def.ty)? {
                Store::Block(size) => Op::new(O::StFldBlock, Operand::OffsetSize(offset, size)),
                kind => Op::new(kind.pick(&STFLD), Operand::Offset(offset)),
            },
        })
    }

    fn typed(
        &self,
        index: usize,
        op: TypeOp,
        ty: TypeId,
        vi: &VerifiedInstr,
        out: &mut Vec<Op>,
    ) -> Result<(), EncodeError> {
        match op {
            TypeOp::Conv => {
                let source = vi.operands.first().copied().unwrap_or(TypeId::VOID);
                let ops = conversion(source, ty).ok_or(EncodeError::UnsupportedOperand {
                    func: self.func,
                    index,
                    ty: source,
                })?;
                out.extend(ops.into_iter().map(Op::bare));
            }
            TypeOp::LdInd => out.push(match self.load(index, ty)? {
                Load::Block(size) => Op::new(O::LdIndBlock, Operand::Size(size)),
                kind => Op::bare(kind.pick(&LDIND)),
            }),
            TypeOp::StInd => out.push(match self.store(index, ty)? {
                Store::Block(size) => Op::new(O::StIndBlock, Operand::Size(size)),
                kind => Op::bare(kind.pick(&STIND)),
            }),
            TypeOp::LdElem | TypeOp::StElem | TypeOp::LdElemA => {
                let container = vi.operands.first().copied().unwrap_or(TypeId::VOID);
                let (element, span) = self.container(index, container)?;
                let stride = self.u16(index, self.types.layout(element).size)?;
                let stride = Operand::Size(stride);
                out.push(match (op, span) {
                    (TypeOp::LdElemA, false) => Op::new(O::LdElemA, stride),
                    (TypeOp::LdElemA, true) => Op::new(O::LdSpanElemA, stride),
                    (TypeOp::LdElem, false) => Op::new(self.load(index, ty)?.pick(&LDELEM), stride),
                    (TypeOp::LdElem, true) => Op::new(self.load(index, ty)?.pick(&LDSPAN), stride),
                    (_, false) => Op::new(self.store(index, ty)?.pick(&STELEM), stride),
                    (_, true) => Op::new(self.store(index, ty)?.pick(&STSPAN), stride),
                });
            }
            TypeOp::CallI => out.push(Op::bare(O::CallI)),
        }
        Ok(())
    }

    fn branch(
        &self,
        index: usize,
        op: BranchOp,
        target: Label,
        vi: &VerifiedInstr,
        out: &mut Vec<Op>,
    ) -> Result<(), EncodeError> {
        let to = |opcode| Op::new(opcode, Operand::Branch(target));
        if op == BranchOp::Br {
            out.push(to(O::BrS));
            return Ok(());
        }
        // For `null == ref` the reference decides the width; both are 32-bit.
        let operand = vi.operands.first().copied().unwrap_or(TypeId::VOID);
        let class = self.class(index, operand)?;
        let (w32, w64) = match op {
            BranchOp::Br => (O::BrS, O::BrS),
            BranchOp::BrTrue => (O::BrTrue32S, O::BrTrue64S),
            BranchOp::BrFalse => (O::BrFalse32S, O::BrFalse64S),
            BranchOp::Beq => (O::Beq32S, O::Beq64S),
            BranchOp::Bne => (O::Bne32S, O::Bne64S),
            BranchOp::Bge => (O::Bge32S, O::Bge64S),
            BranchOp::BgeUn => (O::BgeUn32S, O::BgeUn64S),
            BranchOp::Bgt => (O::Bgt32S, O::Bgt64S),
            BranchOp::BgtUn => (O::BgtUn32S, O::BgtUn64S),
            BranchOp::Ble => (O::Ble32S, O::Ble64S),
            BranchOp::BleUn => (O::BleUn32S, O::BleUn64S),
            BranchOp::Blt => (O::Blt32S, O::Blt64S),
            BranchOp::BltUn => (O::BltUn32S, O::BltUn64S),
        };
        match class {
            Class::W32 => out.push(to(w32)),
            Class::W64 => out.push(to(w64)),
            Class::F32 | Class::F64 => {
                // Floats compare into an int32 and branch on it. There is no ordered `>=` or
                // `<=` compare, and negating a strict one would branch on NaN, so `bge` and
                // `ble` are rejected.
                let (cmp, jump) = match op {
                    BranchOp::Beq => ([O::CeqF32, O::CeqF64], O::BrTrue32S),
                    BranchOp::Bne => ([O::CeqF32, O::CeqF64], O::BrFalse32S),
                    BranchOp::Bgt => ([O::CgtF32, O::CgtF64], O::BrTrue32S),
                    BranchOp::Blt => ([O::CltF32, O::CltF64], O::BrTrue32S),
                    _ => {
                        return Err(EncodeError::UnsupportedOperand {
                            func: self.func,
                            index,
                            ty: operand,
                        });
                    }
                };
                let cmp = if class == Class::F32 { cmp[0] } else { cmp[1] };
                out.push(Op::bare(cmp));
                out.push(to(jump));
            }
        }
        Ok(())
    }

    fn class(&self, index: usize, ty: TypeId) -> Result<Class, EncodeError> {
        match ty {
            TypeId::I32 | TypeId::NULL => Ok(Class::W32),
            TypeId::I64 => Ok(Class::W64),
            TypeId::F32 => Ok(Class::F32),
            TypeId::F64 => Ok(Class::F64),
            _ if self.types.is_reference(ty) => Ok(Class::W32),
            _ => Err(EncodeError::UnsupportedOperand {
                func: self.func,
                index,
                ty,
            }),
        }
    }

    fn numeric(&self, index: usize, ty: TypeId, family: [Opcode; 4]) -> Result<Opcode, EncodeError> {
        Ok(match self.class(index, ty)? {
            Class::W32 => family[0],
            Class::W64 => family[1],
            Class::F32 => family[2],
            Class::F64 => family[3],
        })
    }

    fn integer(&self, index: usize, ty: TypeId, family: [Opcode; 2]) -> Result<Opcode, EncodeError> {
        match self.class(index, ty)? {
            Class::W32 => Ok(family[0]),
            Class::W64 => Ok(family[1]),
            Class::F32 | Class::F64 => Err(EncodeError::UnsupportedOperand {
                func: self.func,
                index,
                ty,
            }),
        }
    }

    fn width(&self, index: usize, ty: TypeId) -> Result<Width, EncodeError> {
        Ok(match self.types.slots(ty) {
            1 => Width::W32,
            2 => Width::W64,
            n => Width::Block(self.count(index, n)?),
        })
    }

    fn load(&self, index: usize, ty: TypeId) -> Result<Load, EncodeError> {
        let size = self.types.layout(ty).size;
        Ok(match (self.types.kind(ty), size) {
            (TypeKind::I8, _) => Load::I8,
            (TypeKind::I16, _) => Load::I16,
            (_, 1) => Load::U8,
            (_, 2) => Load::U16,
            (_, 4) => Load::W32,
            (_, 8) => Load::W64,
            (_, size) => Load::Block(self.u16(index, size)?),
        })
    }

    fn store(&self, index: usize, ty: TypeId) -> Result<Store, EncodeError> {
        Ok(match self.types.layout(ty).size {
            1 => Store::W8,
            2 => Store::W16,
            4 => Store::W32,
            8 => Store::W64,
            size => Store::Block(self.u16(index, size)?),
        })
    }

    fn container(&self, index: usize, container: TypeId) -> Result<(TypeId, bool), EncodeError> {
        match self.types.kind(container) {
            TypeKind::Span(element) => return Ok((*element, true)),
            TypeKind::Reference(target) => {
                if let TypeKind::Array { element, .. } = self.types.kind(*target) {
                    return Ok((*element, false));
                }
            }
            _ => {}
        }
        Err(EncodeError::UnsupportedOperand {
            func: self.func,
            index,
            ty: container,
        })
    }

    fn u16(&self, index: usize, value: u32) -> Result<u16, EncodeError> {
        u16::try_from(value).map_err(|_| self.too_large(index, value))
    }

    fn count(&self, index: usize, value: u32) -> Result<u8, EncodeError> {
        u8::try_from(value).map_err(|_| self.too_large(index, value))
    }

    fn too_large(&self, index: usize, value: u32) -> EncodeError {
        EncodeError::ValueTooLarge {
            func: self.func,
            index,
            value,
        }
    }

    fn unbound(&self, index: usize) -> EncodeError {
        EncodeError::Unbound {
            func: self.func,
            index,
        }
    }
}

/// The return operation of a function returning `ret`.
pub(crate) fn ret_op_for(types: &TypeTable, ret: TypeId) -> Option<Op> {
    if ret == TypeId::VOID {
        return Some(Op::bare(O::Ret));
    }
    Some(ret_op(match types.slots(types.stack_type(ret)) {
        1 => Width::W32,
        2 => Width::W64,
        n => Width::Block(u8::try_from(n).ok()?),
    }))
}

/// Body of a stub that forwards its arguments to system call `id`.
pub(crate) fn syscall_stub(types: &TypeTable, id: u16, ret: TypeId) -> Option<Vec<Op>> {
    Some(vec![
        Op::new(O::Syscall, Operand::U16(id)),
        ret_op_for(types, ret)?,
    ])
}

fn ret_op(width: Width) -> Op {
    match width {
        Width::W32 => Op::bare(O::RetW32),
        Width::W64 => Op::bare(O::RetW64),
        Width::Block(n) => Op::new(O::RetBlock, Operand::U8(n)),
    }
}

/// Operation sequence converting a `source` stack value to `target`.
fn conversion(source: TypeId, target: TypeId) -> Option<Vec<Opcode>> {
    let narrow = match target {
        TypeId::I8 => Some(O::ConvI32ToI8),
        TypeId::U8 => Some(O::ConvI32ToU8),
        TypeId::I16 => Some(O::ConvI32ToI16),
        TypeId::U16 => Some(O::ConvI32ToU16),
        _ => None,
    };
    if let Some(narrow) = narrow {
        let mut ops = conversion(source, TypeId::I32)?;
        ops.push(narrow);
        return Some(ops);
    }
    let ops: &[Opcode] = match (source, target) {
        (TypeId::I32, TypeId::I32 | TypeId::U32)
        | (TypeId::I64, TypeId::I64 | TypeId::U64)
        | (TypeId::F32, TypeId::F32)
        | (TypeId::F64, TypeId::F64) => &[],
        (TypeId::I32, TypeId::I64) => &[O::ConvI32ToI64],
        (TypeId::I32, TypeId::U64) => &[O::ConvU32ToI64],
        (TypeId::I32, TypeId::F32) => &[O::ConvI32ToF32],
        (TypeId::I32, TypeId::F64) => &[O::ConvI32ToF64],
        (TypeId::I64, TypeId::I32 | TypeId::U32) => &[O::ConvI64ToI32],
        (TypeId::I64, TypeId::F32) => &[O::ConvI64ToF32],
        (TypeId::I64, TypeId::F64) => &[O::ConvI64ToF64],
        (TypeId::F32, TypeId::I32) => &[O::ConvF32ToI32],
        (TypeId::F32, TypeId::U32) => &[O::ConvF32ToI64, O::ConvI64ToI32],
        (TypeId::F32, TypeId::I64 | TypeId::U64) => &[O::ConvF32ToI64],
        (TypeId::F32, TypeId::F64) => &[O::ConvF32ToF64],
        (TypeId::F64, TypeId::I32) => &[O::ConvF64ToI32],
        (TypeId::F64, TypeId::U32) => &[O::ConvF64ToI64, O::ConvI64ToI32],
        (TypeId::F64, TypeId::I64 | TypeId::U64) => &[O::ConvF64ToI64],
        (TypeId::F64, TypeId::F32) => &[O::ConvF64ToF32],
        _ => return None,
    };
    Some(ops.to_vec())
}
