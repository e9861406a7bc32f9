// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler for module images.
//!
//! This module provides:
//! - A structured view (`Disassembly`, `InstrView`) for tooling/tests.
//! - A human-readable text format via [`core::fmt::Display`].
//!
//! Images carry no function table, so the caller supplies the descriptor offsets (as recorded in
//! [`CompiledModule`](crate::codegen::CompiledModule) or
//! [`LinkedModule`](crate::link::LinkedModule)). Branch targets are resolved to absolute
//! offsets and printed as labels.

#![allow(clippy::module_name_repetitions, reason = "public API module")]

use core::fmt;

use crate::format::{DecodeError, Descriptor, Fingerprint, Header, Reader, Token};
use crate::opcode::{Opcode, Shape};

/// A decoded instruction operand.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// A slot count.
    U8(u8),
    /// A syscall id.
    U16(u16),
    /// A call target.
    Token(Token),
    /// A constructor token and the slot count of the allocated object.
    TokenSlots(Token, u8),
    /// An `int32` constant.
    I32(i32),
    /// An `int64` constant.
    I64(i64),
    /// A `float32` constant.
    F32(f32),
    /// A `float64` constant.
    F64(f64),
    /// A frame slot.
    Slot(u8),
    /// A frame slot and the number of slots it spans.
    SlotCount(u8, u8),
    /// A field or element byte offset.
    Offset(u16),
    /// A byte offset and a byte size.
    OffsetSize(u16, u16),
    /// A byte size.
    Size(u16),
    /// A branch, resolved to the absolute offset of its target.
    Target(usize),
}

/// A single decoded instruction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InstrView {
    /// Absolute offset within the image.
    pub offset: usize,
    /// The opcode.
    pub opcode: Opcode,
    /// The decoded operand.
    pub operand: Operand,
}

/// One function of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDisassembly {
    /// Offset of the descriptor.
    pub offset: usize,
    /// Frame sizes.
    pub descriptor: Descriptor,
    /// Instructions in code order.
    pub instrs: Vec<InstrView>,
}

impl FunctionDisassembly {
    /// Sorted, deduplicated branch targets.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        let mut targets: Vec<usize> = self
            .instrs
            .iter()
            .filter_map(|iv| match iv.operand {
                Operand::Target(t) => Some(t),
                _ => None,
            })
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }
}

/// A decoded module image.
#[derive(Clone, Debug, PartialEq)]
pub struct Disassembly {
    /// The decoded header.
    pub header: Header,
    /// Import table, in slot order. All zero before linking.
    pub imports: Vec<Fingerprint>,
    /// Functions at the requested offsets.
    pub functions: Vec<FunctionDisassembly>,
}

/// A disassembly error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisasmError {
    /// The underlying data failed to decode.
    Decode(DecodeError),
    /// A function offset points outside the code area or out of order.
    BadFunctionOffset {
        /// The offending offset.
        offset: usize,
    },
    /// An instruction straddles the end of its function.
    Truncated {
        /// Offset of the instruction.
        offset: usize,
    },
}

impl From<DecodeError> for DisasmError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl fmt::Display for DisasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::BadFunctionOffset { offset } => write!(f, "bad function offset {offset}"),
            Self::Truncated { offset } => {
                write!(f, "instruction at {offset} runs past the end of its function")
            }
        }
    }
}

impl core::error::Error for DisasmError {}

/// Decodes `image`, whose function descriptors start at `function_offsets`.
pub fn disassemble(image: &[u8], function_offsets: &[u32]) -> Result<Disassembly, DisasmError> {
    let header = Header::read(image)?;
    let imports = (0..header.import_count)
        .map(|i| Header::import(image, i))
        .collect::<Result<Vec<_>, _>>()?;

    let mut functions = Vec::with_capacity(function_offsets.len());
    let mut floor = header.code_start();
    for (i, &start) in function_offsets.iter().enumerate() {
        let start = start as usize;
        let end = function_offsets
            .get(i + 1)
            .map_or(image.len(), |&o| o as usize);
        if start < floor || end < start || end > image.len() {
            return Err(DisasmError::BadFunctionOffset { offset: start });
        }
        functions.push(function(&image[..end], start)?);
        floor = end;
    }
    Ok(Disassembly {
        header,
        imports,
        functions,
    })
}

/// Decodes the function whose descriptor is at `start`, up to the end of `image`.
fn function(image: &[u8], start: usize) -> Result<FunctionDisassembly, DisasmError> {
    let mut r = Reader::at(image, start)?;
    let descriptor = Descriptor::read(&mut r)?;
    let mut instrs = Vec::new();
    while !r.is_at_end() {
        let offset = r.offset();
        let iv = instr(&mut r).map_err(|e| match e {
            DecodeError::UnexpectedEof => DisasmError::Truncated { offset },
            e => DisasmError::Decode(e),
        })?;
        instrs.push(iv);
    }
    Ok(FunctionDisassembly {
        offset: start,
        descriptor,
        instrs,
    })
}

fn instr(r: &mut Reader<'_>) -> Result<InstrView, DecodeError> {
    let offset = r.offset();
    let opcode = r.read_opcode()?;
    let operand = match opcode.shape() {
        Shape::None => Operand::None,
        Shape::U8 => Operand::U8(r.read_u8()?),
        Shape::U16 => Operand::U16(r.read_u16_le()?),
        Shape::Token => Operand::Token(r.read_token()?),
        Shape::TokenU8 => Operand::TokenSlots(r.read_token()?, r.read_u8()?),
        Shape::I32 => Operand::I32(r.read_i32_le()?),
        Shape::I64 => Operand::I64(r.read_i64_le()?),
        Shape::F32 => Operand::F32(f32::from_bits(r.read_u32_le()?)),
        Shape::F64 => Operand::F64(f64::from_bits(r.read_u64_le()?)),
        Shape::Slot => Operand::Slot(r.read_u8()?),
        Shape::SlotCount => Operand::SlotCount(r.read_u8()?, r.read_u8()?),
        Shape::Offset => Operand::Offset(r.read_u16_le()?),
        Shape::OffsetSize => Operand::OffsetSize(r.read_u16_le()?, r.read_u16_le()?),
        Shape::Size => Operand::Size(r.read_u16_le()?),
        Shape::Rel8 => {
            let rel = i64::from(r.read_i8()?);
            Operand::Target(resolve(r.offset(), rel)?)
        }
        Shape::Rel16 => {
            let rel = i64::from(r.read_i16_le()?);
            Operand::Target(resolve(r.offset(), rel)?)
        }
    };
    Ok(InstrView {
        offset,
        opcode,
        operand,
    })
}

fn resolve(end: usize, rel: i64) -> Result<usize, DecodeError> {
    usize::try_from(end as i64 + rel).map_err(|_| DecodeError::OutOfBounds)
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "; features={} modules={} imports={}",
            self.header.features, self.header.module_count, self.header.import_count
        )?;
        if let Some(entry) = self.header.entry {
            writeln!(f, "; entry={entry}")?;
        }
        for (i, fp) in self.imports.iter().enumerate() {
            writeln!(f, "import{i} {fp}")?;
        }
        for fd in &self.functions {
            writeln!(f)?;
            let d = fd.descriptor;
            write!(
                f,
                "func @{:04x}: ; args={} locals={} max_stack={}",
                fd.offset, d.arg_slots, d.local_slots, d.max_stack
            )?;
            if d.zero_init {
                write!(f, " zero_init")?;
            }
            writeln!(f)?;
            let labels = fd.labels();
            for iv in &fd.instrs {
                if labels.binary_search(&iv.offset).is_ok() {
                    writeln!(f, "  @L{:04x}:", iv.offset)?;
                }
                writeln!(f, "    {iv}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for InstrView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.opcode.mnemonic())?;
        match self.operand {
            Operand::None => Ok(()),
            Operand::U8(v) | Operand::Slot(v) => write!(f, " {v}"),
            Operand::U16(v) | Operand::Size(v) => write!(f, " {v}"),
            Operand::Offset(v) => write!(f, " +{v}"),
            Operand::Token(t) => write!(f, " {t}"),
            Operand::TokenSlots(t, n) => write!(f, " {t}, {n}"),
            Operand::I32(v) => write!(f, " {v}"),
            Operand::I64(v) => write!(f, " {v}"),
            Operand::F32(v) => write!(f, " {v:?}"),
            Operand::F64(v) => write!(f, " {v:?}"),
            Operand::SlotCount(s, n) => write!(f, " {s}, {n}"),
            Operand::OffsetSize(o, s) => write!(f, " +{o}, {s}"),
            Operand::Target(t) => write!(f, " @L{t:04x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{FunctionSig, ProgramBuilder};
    use crate::codegen::{CodegenConfig, CompiledModule, generate_program};
    use crate::types::TypeId;
    use crate::verifier::{VerifyConfig, verify_program};

    fn compile(pb: ProgramBuilder) -> Vec<CompiledModule> {
        let program = pb.build().unwrap();
        let verified = verify_program(&program, &VerifyConfig::default()).unwrap();
        generate_program(&program, &verified, &CodegenConfig::default()).unwrap()
    }

    #[test]
    fn decodes_generated_functions() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("math");
        let sig = FunctionSig::new("add", TypeId::I32)
            .param("a", TypeId::I32)
            .param("b", TypeId::I32);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).ldarg(1).add().ret();
        pb.define(f).unwrap();
        let modules = compile(pb);

        let d = disassemble(&modules[0].image, &modules[0].function_offsets).unwrap();
        assert_eq!(d.header.module_count, 1);
        assert!(d.imports.is_empty());
        assert_eq!(d.functions.len(), 1);
        let func = &d.functions[0];
        assert_eq!(func.descriptor.arg_slots, 2);
        let ops: Vec<Opcode> = func.instrs.iter().map(|iv| iv.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::LdSlot32,
                Opcode::LdSlot32,
                Opcode::AddI32,
                Opcode::RetW32
            ]
        );
        let offsets: Vec<usize> = func.instrs.iter().map(|iv| iv.offset).collect();
        assert_eq!(offsets, vec![12, 14, 16, 17]);
        assert_eq!(func.instrs[1].operand, Operand::Slot(1));
    }

    #[test]
    fn branches_resolve_to_labels() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("main");
        let mut f = pb.function(m, FunctionSig::new("spin", TypeId::VOID)).unwrap();
        let top = f.label();
        f.place(top).unwrap();
        f.nop().br(top);
        pb.define(f).unwrap();
        let modules = compile(pb);

        let d = disassemble(&modules[0].image, &modules[0].function_offsets).unwrap();
        let func = &d.functions[0];
        assert_eq!(func.labels(), vec![12]);
        assert_eq!(func.instrs[1].operand, Operand::Target(12));

        let text = d.to_string();
        assert!(text.contains("  @L000c:\n    000c: nop\n    000d: br.s @L000c\n"));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            disassemble(&[2, 0, 1, 0, 0, 0, 0, 0], &[]),
            Err(DisasmError::Decode(DecodeError::UnsupportedVersion {
                version: 2
            }))
        );
        // An `ldc.i32` cut short by the end of the image.
        let image = [1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x11, 1];
        assert_eq!(
            disassemble(&image, &[8]),
            Err(DisasmError::Truncated { offset: 12 })
        );
        assert_eq!(
            disassemble(&image, &[4]),
            Err(DisasmError::BadFunctionOffset { offset: 4 })
        );
    }
}
