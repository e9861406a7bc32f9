// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layout and encoding.
//!
//! Layout walks a function once, front to back, and fixes the form of every branch. A backward
//! branch targets an instruction whose offset is already final, so the exact displacement
//! decides. A forward branch is short only if the target is within reach even when every
//! intervening branch takes its long form. Since no decision ever depends on a later one, the
//! offsets recorded by layout are exactly the offsets encoding writes to, and encoding never
//! widens a branch.

use log::trace;

use crate::codegen::EncodeError;
use crate::codegen::ImportFixup;
use crate::codegen::select::{Op, Operand};
use crate::format::{Descriptor, THIS_MODULE, Token, Writer};
use crate::instr::Label;
use crate::opcode::{Features, Shape};
use crate::program::{FuncRef, ModuleDef, ModuleId};

/// Selected operations for one function, grouped by source instruction.
#[derive(Clone, Debug)]
pub(crate) struct FunctionCode {
    pub(crate) func: FuncRef,
    pub(crate) descriptor: Descriptor,
    /// `instrs[i]` is empty for unreachable instructions.
    pub(crate) instrs: Vec<Vec<Op>>,
    /// Label id to instruction index.
    pub(crate) labels: Vec<u32>,
}

impl FunctionCode {
    fn target(&self, index: usize, label: Label) -> Result<usize, EncodeError> {
        self.labels
            .get(label.0 as usize)
            .map(|&t| t as usize)
            .filter(|&t| t < self.instrs.len())
            .ok_or(EncodeError::Unbound {
                func: self.func,
                index,
            })
    }

    /// Union of the capabilities of every operation.
    pub(crate) fn features(&self) -> Features {
        self.instrs
            .iter()
            .flatten()
            .fold(Features::NONE, |acc, op| acc | op.opcode.features())
    }
}

/// Fixes branch forms and returns instruction offsets relative to the start of the code, with
/// one extra trailing entry holding the code length.
pub(crate) fn layout(code: &mut FunctionCode) -> Result<Vec<u32>, EncodeError> {
    let max_lens: Vec<usize> = code
        .instrs
        .iter()
        .map(|ops| ops.iter().map(Op::max_len).sum())
        .collect();
    let mut offsets: Vec<usize> = Vec::with_capacity(code.instrs.len() + 1);
    let mut pos = 0_usize;

    for i in 0..code.instrs.len() {
        offsets.push(pos);
        let mut rest = max_lens[i];
        for k in 0..code.instrs[i].len() {
            let op = code.instrs[i][k];
            rest -= op.max_len();
            if let Operand::Branch(label) = op.operand {
                let target = code.target(i, label)?;
                let short_end = pos + op.opcode.len();
                let short = if target <= i {
                    i8::try_from(offsets[target] as i64 - short_end as i64).is_ok()
                } else {
                    let reach = rest + max_lens[i + 1..target].iter().sum::<usize>();
                    reach <= i8::MAX as usize
                };
                if !short {
                    let long = op.opcode.long_form().ok_or(EncodeError::Unbound {
                        func: code.func,
                        index: i,
                    })?;
                    trace!("{}@{i}: long branch to L{}", code.func, label.0);
                    code.instrs[i][k].opcode = long;
                }
            }
            pos += code.instrs[i][k].opcode.len();
        }
    }
    offsets.push(pos);

    offsets
        .into_iter()
        .map(|o| {
            u32::try_from(o).map_err(|_| EncodeError::FunctionOffsetOverflow {
                func: code.func,
                offset: o,
            })
        })
        .collect()
}

/// Writes functions of one module, resolving tokens against its function table.
pub(crate) struct Emitter<'a> {
    pub(crate) module: ModuleId,
    pub(crate) def: &'a ModuleDef,
    pub(crate) function_offsets: &'a [u32],
    pub(crate) fixups: Vec<ImportFixup>,
}

impl Emitter<'_> {
    /// Encodes `code` (descriptor included) at the end of `w`. `offsets` comes from [`layout`].
    pub(crate) fn function(
        &mut self,
        w: &mut Writer,
        code: &FunctionCode,
        offsets: &[u32],
    ) -> Result<(), EncodeError> {
        code.descriptor.write(w);
        let base = w.len();
        for (i, ops) in code.instrs.iter().enumerate() {
            debug_assert_eq!(w.len(), base + offsets[i] as usize);
            for op in ops {
                self.op(w, code, offsets, base, i, op)?;
            }
        }
        Ok(())
    }

    fn op(
        &mut self,
        w: &mut Writer,
        code: &FunctionCode,
        offsets: &[u32],
        base: usize,
        index: usize,
        op: &Op,
    ) -> Result<(), EncodeError> {
        w.write_opcode(op.opcode);
        match op.operand {
            Operand::None => {}
            Operand::U8(v) | Operand::Slot(v) => w.write_u8(v),
            Operand::U16(v) | Operand::Offset(v) | Operand::Size(v) => w.write_u16_le(v),
            Operand::Func(f) => {
                let token = self.token(w.len(), code.func, index, f)?;
                w.write_token(token);
            }
            Operand::FuncSlots(f, slots) => {
                let token = self.token(w.len(), code.func, index, f)?;
                w.write_token(token);
                w.write_u8(slots);
            }
            Operand::I32(v) => w.write_i32_le(v),
            Operand::I64(v) => w.write_i64_le(v),
            Operand::F32(bits) => w.write_u32_le(bits),
            Operand::F64(bits) => w.write_u64_le(bits),
            Operand::SlotCount(slot, n) => {
                w.write_u8(slot);
                w.write_u8(n);
            }
            Operand::OffsetSize(offset, size) => {
                w.write_u16_le(offset);
                w.write_u16_le(size);
            }
            Operand::Branch(label) => {
                let target = base + offsets[code.target(index, label)?] as usize;
                let end = w.len() + op.opcode.shape().operand_len();
                let displacement = target as i64 - end as i64;
                let overflow = EncodeError::BranchOverflow {
                    func: code.func,
                    index,
                    displacement,
                };
                match op.opcode.shape() {
                    Shape::Rel8 => w.write_i8(i8::try_from(displacement).map_err(|_| overflow)?),
                    _ => w.write_i16_le(i16::try_from(displacement).map_err(|_| overflow)?),
                }
            }
        }
        Ok(())
    }

    /// Token for `callee`, as referenced from instruction `index` of `func`. Calls into imports
    /// get a zero offset and a fixup for the linker.
    fn token(
        &mut self,
        at: usize,
        func: FuncRef,
        index: usize,
        callee: FuncRef,
    ) -> Result<Token, EncodeError> {
        if callee.module == self.module {
            let offset = self
                .function_offsets
                .get(callee.index as usize)
                .and_then(|&o| u16::try_from(o).ok())
                .ok_or(EncodeError::Unbound { func, index })?;
            return Ok(Token {
                module: THIS_MODULE,
                offset,
            });
        }
        let import = self
            .def
            .import_index(callee.module)
            .and_then(|i| u8::try_from(i).ok())
            .ok_or(EncodeError::NotImported {
                func,
                index,
                module: callee.module,
            })?;
        self.fixups.push(ImportFixup {
            at,
            import,
            target: callee,
        });
        Ok(Token {
            module: import,
            offset: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn code(instrs: Vec<Vec<Op>>, labels: Vec<u32>) -> FunctionCode {
        FunctionCode {
            func: FuncRef {
                module: ModuleId(0),
                index: 0,
            },
            descriptor: Descriptor::default(),
            instrs,
            labels,
        }
    }

    fn nop() -> Op {
        Op {
            opcode: Opcode::Nop,
            operand: Operand::None,
        }
    }

    fn br(label: u32) -> Op {
        Op {
            opcode: Opcode::BrS,
            operand: Operand::Branch(Label(label)),
        }
    }

    #[test]
    fn near_forward_branch_stays_short() {
        let mut c = code(vec![vec![br(0)], vec![nop()], vec![nop()]], vec![2]);
        let offsets = layout(&mut c).unwrap();
        assert_eq!(c.instrs[0][0].opcode, Opcode::BrS);
        assert_eq!(offsets, vec![0, 2, 3, 4]);
    }

    #[test]
    fn forward_branch_counts_intervening_branches_as_long() {
        // 62 short branches need 124 bytes, but could grow to 186.
        let mut instrs = vec![vec![br(0)]];
        instrs.extend((0..62).map(|_| vec![br(1)]));
        instrs.push(vec![nop()]);
        let mut c = code(instrs, vec![63, 63]);
        layout(&mut c).unwrap();
        assert_eq!(c.instrs[0][0].opcode, Opcode::Br);
        // From instruction 20 on, at most 42 branches (126 bytes) remain in between.
        assert!(c.instrs[1..20].iter().all(|ops| ops[0].opcode == Opcode::Br));
        assert!(c.instrs[20..63].iter().all(|ops| ops[0].opcode == Opcode::BrS));
    }

    #[test]
    fn backward_branch_uses_exact_distance() {
        // 126 nops then a branch back to the start: displacement -128 fits exactly.
        let mut instrs: Vec<Vec<Op>> = (0..126).map(|_| vec![nop()]).collect();
        instrs.push(vec![br(0)]);
        let mut c = code(instrs.clone(), vec![0]);
        layout(&mut c).unwrap();
        assert_eq!(c.instrs[126][0].opcode, Opcode::BrS);

        instrs.insert(0, vec![nop()]);
        let mut c = code(instrs, vec![0]);
        layout(&mut c).unwrap();
        assert_eq!(c.instrs[127][0].opcode, Opcode::Br);
    }

    fn encode(c: &FunctionCode, offsets: &[u32]) -> Result<Vec<u8>, EncodeError> {
        let def = ModuleDef {
            name: "m".into(),
            imports: Vec::new(),
            functions: Vec::new(),
            entry: None,
        };
        let mut emitter = Emitter {
            module: ModuleId(0),
            def: &def,
            function_offsets: &[0],
            fixups: Vec::new(),
        };
        let mut w = Writer::new();
        emitter.function(&mut w, c, offsets)?;
        Ok(w.as_slice().to_vec())
    }

    #[test]
    fn encoded_displacements_match_layout() {
        let mut c = code(vec![vec![nop()], vec![br(0)], vec![nop()]], vec![0]);
        let offsets = layout(&mut c).unwrap();
        // descriptor, nop, br.s -3, nop
        assert_eq!(
            encode(&c, &offsets).unwrap(),
            vec![0, 0, 0, 0, 0x00, 0xC8, 0xFD, 0x00]
        );
    }

    #[test]
    fn long_branch_out_of_range_is_fatal() {
        let mut instrs = vec![vec![br(0)]];
        instrs.extend((0..40_000).map(|_| vec![nop()]));
        let mut c = code(instrs, vec![40_000]);
        let offsets = layout(&mut c).unwrap();
        assert_eq!(c.instrs[0][0].opcode, Opcode::Br);
        assert_eq!(offsets[40_000], 40_002);
        assert_eq!(
            encode(&c, &offsets),
            Err(EncodeError::BranchOverflow {
                func: c.func,
                index: 0,
                displacement: 39_999,
            })
        );
    }

    #[test]
    fn short_branch_is_never_widened_while_encoding() {
        let mut c = code(vec![vec![br(0)], vec![nop()], vec![nop()]], vec![2]);
        let offsets = layout(&mut c).unwrap();
        // Offsets claiming the target sits 200 bytes away do not turn `br.s` into `br`.
        let stretched = [offsets[0], offsets[1], 202, 203];
        assert_eq!(
            encode(&c, &stretched),
            Err(EncodeError::BranchOverflow {
                func: c.func,
                index: 0,
                displacement: 200,
            })
        );
        assert_eq!(c.instrs[0][0].opcode, Opcode::BrS);
    }
}
