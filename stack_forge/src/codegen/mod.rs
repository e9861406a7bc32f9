// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Code generation: verified functions to module images.
//!
//! Generation runs per module in three steps:
//! 1. [`frame`] assigns parameter and local slots and sizes the operand stack.
//! 2. Selection maps each verified instruction to target operations.
//! 3. Emission fixes branch forms, lays out the functions and encodes the image.
//!
//! The result is a [`CompiledModule`]: its own calls are resolved, and calls into imported
//! modules carry placeholder tokens listed in [`CompiledModule::fixups`] for the linker.

pub mod frame;

mod emit;
mod select;

use core::fmt;

use log::debug;

use crate::diagnostics::{Diagnostic, DiagnosticCategory};
use crate::format::{
    DESCRIPTOR_LEN, Descriptor, HEADER_LEN, Header, IMPORT_SLOT_LEN, MAX_IMPORTS, THIS_MODULE,
    Token, Writer,
};
use crate::opcode::Features;
use crate::program::{FuncRef, FunctionDef, FunctionKind, ModuleId, Program};
use crate::types::TypeId;
use crate::verifier::VerifiedProgram;

use emit::{Emitter, FunctionCode};
use select::Selector;

pub use frame::FrameLayout;

/// Code generation limits.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodegenConfig {
    /// Largest image, in bytes, a module may encode to.
    pub max_image_len: usize,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            max_image_len: 1 << 16,
        }
    }
}

/// The part of a frame whose slot count overflowed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FramePart {
    /// Parameters.
    Params,
    /// Locals.
    Locals,
    /// Peak operand stack depth.
    Stack,
    /// Parameters, locals and stack together.
    Frame,
}

impl fmt::Display for FramePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Params => "parameter",
            Self::Locals => "local",
            Self::Stack => "operand stack",
            Self::Frame => "frame",
        })
    }
}

/// A code generation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// A bytecode function has no (or a stale) verification result.
    Unverified {
        /// The function.
        func: FuncRef,
    },
    /// An instruction refers to something the program does not define.
    Unbound {
        /// The function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
    },
    /// No opcode exists for the operation at this operand type.
    UnsupportedOperand {
        /// The function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The operand type.
        ty: TypeId,
    },
    /// A slot count does not fit in a byte.
    FrameOverflow {
        /// The function.
        func: FuncRef,
        /// Which count overflowed.
        part: FramePart,
        /// The count.
        slots: u32,
    },
    /// An offset, size or slot count operand does not fit its field.
    ValueTooLarge {
        /// The function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The value.
        value: u32,
    },
    /// A branch displacement does not fit its chosen form.
    BranchOverflow {
        /// The function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The displacement.
        displacement: i64,
    },
    /// A function starts beyond the reach of a 16-bit token offset.
    FunctionOffsetOverflow {
        /// The function.
        func: FuncRef,
        /// Its offset.
        offset: usize,
    },
    /// The encoded image exceeds [`CodegenConfig::max_image_len`].
    ImageTooLarge {
        /// The module.
        module: ModuleId,
        /// Encoded length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A module declares more imports than a token can address.
    TooManyImports {
        /// The module.
        module: ModuleId,
        /// Declared imports.
        count: usize,
    },
    /// A call targets a module that is not in the caller's import list.
    NotImported {
        /// The function.
        func: FuncRef,
        /// Instruction index.
        index: usize,
        /// The callee's module.
        module: ModuleId,
    },
    /// The module id is out of range.
    UnknownModule {
        /// The module.
        module: ModuleId,
    },
}

impl EncodeError {
    /// Converts this error into a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            Self::Unverified { .. } => 3001,
            Self::Unbound { .. } => 3002,
            Self::UnsupportedOperand { .. } => 3003,
            Self::FrameOverflow { .. } => 3004,
            Self::ValueTooLarge { .. } => 3005,
            Self::BranchOverflow { .. } => 3006,
            Self::FunctionOffsetOverflow { .. } => 3007,
            Self::ImageTooLarge { .. } => 3008,
            Self::TooManyImports { .. } => 3009,
            Self::NotImported { .. } => 3010,
            Self::UnknownModule { .. } => 3011,
        };
        Diagnostic::error(DiagnosticCategory::Encoding, code, self.to_string())
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unverified { func } => write!(f, "{func}: function was not verified"),
            Self::Unbound { func, index } => write!(f, "{func}@{index}: unbound symbol"),
            Self::UnsupportedOperand { func, index, ty } => {
                write!(f, "{func}@{index}: no opcode for operand type id {}", ty.0)
            }
            Self::FrameOverflow { func, part, slots } => {
                write!(f, "{func}: {part} slots ({slots}) exceed 255")
            }
            Self::ValueTooLarge { func, index, value } => {
                write!(f, "{func}@{index}: operand value {value} does not fit its field")
            }
            Self::BranchOverflow {
                func,
                index,
                displacement,
            } => write!(
                f,
                "{func}@{index}: branch displacement {displacement} out of range"
            ),
            Self::FunctionOffsetOverflow { func, offset } => {
                write!(f, "{func}: function offset {offset} exceeds 16 bits")
            }
            Self::ImageTooLarge { module, len, max } => {
                write!(f, "module {}: image of {len} bytes exceeds {max}", module.0)
            }
            Self::TooManyImports { module, count } => {
                write!(f, "module {}: {count} imports exceed {MAX_IMPORTS}", module.0)
            }
            Self::NotImported {
                func,
                index,
                module,
            } => write!(f, "{func}@{index}: module {} is not imported", module.0),
            Self::UnknownModule { module } => write!(f, "unknown module {}", module.0),
        }
    }
}

impl core::error::Error for EncodeError {}

/// A cross-module token left for the linker to fill in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImportFixup {
    /// Offset of the token in the image.
    pub at: usize,
    /// Import-table index written in the token's module byte.
    pub import: u8,
    /// The callee.
    pub target: FuncRef,
}

/// A generated, not yet linked, module image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledModule {
    /// The source module.
    pub module: ModuleId,
    /// The source module's name.
    pub name: String,
    /// Encoded image with zeroed import slots.
    pub image: Vec<u8>,
    /// Union of the capabilities of every emitted opcode.
    pub features: Features,
    /// Imported modules, in import-table order.
    pub imports: Vec<ModuleId>,
    /// Offset of each function's descriptor.
    pub function_offsets: Vec<u32>,
    /// Per function, offset of each instruction. Unreachable instructions emit nothing and
    /// share the offset of the next emitted one.
    pub instruction_offsets: Vec<Vec<u32>>,
    /// Per function, offset of each label.
    pub label_offsets: Vec<Vec<u32>>,
    /// Tokens that refer to imported modules.
    pub fixups: Vec<ImportFixup>,
}

fn lower(
    program: &Program,
    verified: &VerifiedProgram,
    func: FuncRef,
    def: &FunctionDef,
) -> Result<FunctionCode, EncodeError> {
    let types = &program.types;
    let (frame, instrs) = match def.kind {
        FunctionKind::Syscall(id) => {
            let frame = FrameLayout::stub(types, func, def)?;
            let stub = select::syscall_stub(types, id, def.ret).ok_or(EncodeError::FrameOverflow {
                func,
                part: FramePart::Stack,
                slots: types.slots(def.ret),
            })?;
            (frame, vec![stub])
        }
        FunctionKind::Bytecode => {
            let vf = verified
                .function(func)
                .filter(|vf| vf.instrs.len() == def.body.len())
                .ok_or(EncodeError::Unverified { func })?;
            let frame = FrameLayout::compute(types, func, def, vf)?;
            let selector = Selector {
                program,
                types,
                func,
                def,
                frame: &frame,
            };
            let mut instrs = Vec::with_capacity(vf.instrs.len());
            for (index, vi) in vf.instrs.iter().enumerate() {
                let mut ops = Vec::new();
                if let Some(vi) = vi {
                    selector.select(index, vi, &mut ops)?;
                }
                instrs.push(ops);
            }
            (frame, instrs)
        }
    };
    Ok(FunctionCode {
        func,
        descriptor: Descriptor {
            zero_init: def.zero_init_locals,
            max_stack: frame.max_stack,
            arg_slots: frame.arg_slots,
            local_slots: frame.local_slots,
        },
        instrs,
        labels: def.labels.clone(),
    })
}

/// Generates the image of one module.
pub fn generate_module(
    program: &Program,
    verified: &VerifiedProgram,
    module: ModuleId,
    cfg: &CodegenConfig,
) -> Result<CompiledModule, EncodeError> {
    let def = program
        .module(module)
        .ok_or(EncodeError::UnknownModule { module })?;
    if def.imports.len() > MAX_IMPORTS {
        return Err(EncodeError::TooManyImports {
            module,
            count: def.imports.len(),
        });
    }

    let mut codes = Vec::with_capacity(def.functions.len());
    for (i, f) in def.functions.iter().enumerate() {
        let func = FuncRef {
            module,
            index: u32::try_from(i).unwrap_or(u32::MAX),
        };
        codes.push(lower(program, verified, func, f)?);
    }
    let mut layouts = Vec::with_capacity(codes.len());
    for code in &mut codes {
        layouts.push(emit::layout(code)?);
    }

    let code_start = HEADER_LEN + def.imports.len() * IMPORT_SLOT_LEN;
    let mut function_offsets = Vec::with_capacity(codes.len());
    let mut pos = code_start;
    for (code, offsets) in codes.iter().zip(&layouts) {
        let offset = u16::try_from(pos).map_err(|_| EncodeError::FunctionOffsetOverflow {
            func: code.func,
            offset: pos,
        })?;
        function_offsets.push(u32::from(offset));
        pos += DESCRIPTOR_LEN + offsets.last().copied().unwrap_or(0) as usize;
    }
    if pos > cfg.max_image_len {
        return Err(EncodeError::ImageTooLarge {
            module,
            len: pos,
            max: cfg.max_image_len,
        });
    }

    let features = codes
        .iter()
        .fold(Features::NONE, |acc, code| acc | code.features());
    let entry = def.entry.and_then(|e| function_offsets.get(e as usize));
    let mut w = Writer::new();
    Header {
        features,
        module_count: 1,
        import_count: u8::try_from(def.imports.len()).unwrap_or(u8::MAX),
        entry: entry.map(|&offset| Token {
            module: THIS_MODULE,
            offset: offset as u16,
        }),
    }
    .write(&mut w);
    w.write_bytes(&vec![0; def.imports.len() * IMPORT_SLOT_LEN]);

    let mut emitter = Emitter {
        module,
        def,
        function_offsets: &function_offsets,
        fixups: Vec::new(),
    };
    for (code, offsets) in codes.iter().zip(&layouts) {
        emitter.function(&mut w, code, offsets)?;
    }
    let fixups = emitter.fixups;
    debug_assert_eq!(w.len(), pos);

    let mut instruction_offsets = Vec::with_capacity(codes.len());
    let mut label_offsets = Vec::with_capacity(codes.len());
    for ((code, offsets), &start) in codes.iter().zip(&layouts).zip(&function_offsets) {
        let base = start + DESCRIPTOR_LEN as u32;
        let absolute: Vec<u32> = offsets.iter().map(|o| base + o).collect();
        label_offsets.push(
            code.labels
                .iter()
                .map(|&t| absolute.get(t as usize).copied().unwrap_or(base))
                .collect(),
        );
        instruction_offsets.push(absolute[..code.instrs.len()].to_vec());
    }

    debug!(
        "encoded module {}: {} bytes, {} functions, features {features}",
        def.name,
        w.len(),
        codes.len()
    );
    Ok(CompiledModule {
        module,
        name: def.name.clone(),
        image: w.into_vec(),
        features,
        imports: def.imports.clone(),
        function_offsets,
        instruction_offsets,
        label_offsets,
        fixups,
    })
}

/// Generates every module of `program`, in module order.
pub fn generate_program(
    program: &Program,
    verified: &VerifiedProgram,
    cfg: &CodegenConfig,
) -> Result<Vec<CompiledModule>, EncodeError> {
    (0..program.modules.len())
        .map(|m| {
            let module = ModuleId(u32::try_from(m).unwrap_or(u32::MAX));
            generate_module(program, verified, module, cfg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{FunctionSig, ProgramBuilder};
    use crate::instr::{BranchOp, Instr};
    use crate::verifier::{VerifyConfig, verify_program};

    fn generate(pb: ProgramBuilder) -> Result<Vec<CompiledModule>, EncodeError> {
        let program = pb.build().unwrap();
        let verified = verify_program(&program, &VerifyConfig::default()).unwrap();
        generate_program(&program, &verified, &CodegenConfig::default())
    }

    #[test]
    fn add_selects_int32_ops_and_slots() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("math");
        let sig = FunctionSig::new("add", TypeId::I32)
            .param("a", TypeId::I32)
            .param("b", TypeId::I32);
        let mut f = pb.function(m, sig).unwrap();
        f.ldarg(0).ldarg(1).add().ret();
        pb.define(f).unwrap();

        let modules = generate(pb).unwrap();
        let image = &modules[0].image;
        assert_eq!(
            image.as_slice(),
            &[
                1, 0, 1, 0, 0, 0, 0, 0, // header, no entry
                0, 2, 2, 0, // descriptor
                0x18, 0, // ldslot.w32 0
                0x18, 1, // ldslot.w32 1
                0x30, // add.i32
                0x02, // ret.w32
            ]
        );
        assert_eq!(modules[0].function_offsets, vec![8]);
        assert_eq!(modules[0].instruction_offsets, vec![vec![12, 14, 16, 17]]);
        assert_eq!(modules[0].features, Features::NONE);
    }

    #[test]
    fn same_module_calls_use_this_module_token() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m1");
        let f = pb.declare(m, FunctionSig::new("f", TypeId::VOID)).unwrap();
        let g = pb.declare(m, FunctionSig::new("g", TypeId::VOID)).unwrap();
        let mut body = pb.body(f);
        body.call(g).ret();
        pb.define(body).unwrap();
        let mut body = pb.body(g);
        body.ret();
        pb.define(body).unwrap();
        pb.set_entry(f).unwrap();

        let modules = generate(pb).unwrap();
        let cm = &modules[0];
        assert_eq!(cm.function_offsets, vec![8, 17]);
        // Entry call in the header, then f's call to g.
        assert_eq!(&cm.image[4..8], &[0x0D, 0xFF, 8, 0]);
        assert_eq!(&cm.image[12..17], &[0x0D, 0xFF, 17, 0, 0x01]);
        assert!(cm.fixups.is_empty());
    }

    #[test]
    fn wide_locals_take_two_slots() {
        let mut pb = ProgramBuilder::new();
        let five = pb
            .types_mut()
            .declare_struct(
                "Five",
                &[
                    ("a", TypeId::U8),
                    ("b", TypeId::U8),
                    ("c", TypeId::U8),
                    ("d", TypeId::U8),
                    ("e", TypeId::U8),
                ],
            )
            .unwrap();
        let m = pb.module("m");
        let sig = FunctionSig::new("f", TypeId::VOID)
            .local("s", five)
            .local("n", TypeId::I32)
            .zero_init(true);
        let mut f = pb.function(m, sig).unwrap();
        f.ldc_i32(3).stloc(1).ret();
        pb.define(f).unwrap();

        let modules = generate(pb).unwrap();
        let image = &modules[0].image;
        assert_eq!(&image[8..12], &[1, 1, 0, 3]);
        // `n` lives after the two slots of `s`.
        assert_eq!(&image[12..20], &[0x11, 3, 0, 0, 0, 0x1F, 2, 0x01]);
    }

    #[test]
    fn syscall_stub_forwards_and_sets_feature() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("io");
        pb.syscall(m, FunctionSig::new("print", TypeId::VOID).param("v", TypeId::I32), 7)
            .unwrap();
        let modules = generate(pb).unwrap();
        assert_eq!(
            modules[0].image.as_slice(),
            &[1, 0x20, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0x0C, 7, 0, 0x01]
        );
        assert_eq!(modules[0].features, Features::SYSCALL);
    }

    #[test]
    fn unreachable_code_emits_nothing() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::VOID)).unwrap();
        let end = f.label();
        f.br(end).nop();
        f.place(end).unwrap();
        f.ret();
        pb.define(f).unwrap();

        let modules = generate(pb).unwrap();
        assert_eq!(&modules[0].image[12..], &[0xC8, 0x00, 0x01]);
        assert_eq!(modules[0].instruction_offsets[0], vec![12, 14, 14]);
        assert_eq!(modules[0].label_offsets[0], vec![14]);
    }

    #[test]
    fn cross_module_calls_leave_fixups() {
        let mut pb = ProgramBuilder::new();
        let lib = pb.module("lib");
        let app = pb.module("app");
        pb.import(app, lib).unwrap();
        let mut g = pb.function(lib, FunctionSig::new("g", TypeId::I64)).unwrap();
        let g_ref = g.func();
        g.ldc_i64(1).ret();
        pb.define(g).unwrap();
        let mut f = pb.function(app, FunctionSig::new("f", TypeId::VOID)).unwrap();
        f.call(g_ref).pop().ret();
        pb.define(f).unwrap();

        let modules = generate(pb).unwrap();
        let app = &modules[1];
        assert_eq!(app.imports, vec![lib]);
        assert_eq!(app.function_offsets, vec![20]);
        assert_eq!(&app.image[20..], &[0, 2, 0, 0, 0x0D, 0, 0, 0, 0x09, 0x01]);
        assert_eq!(
            app.fixups,
            vec![ImportFixup {
                at: 25,
                import: 0,
                target: g_ref,
            }]
        );
        assert_eq!(modules[0].features, Features::INT64);
    }

    /// `f(x: float64)` comparing `x` with `0.0` using `op`.
    fn float_branch(op: BranchOp) -> Result<Vec<CompiledModule>, EncodeError> {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("m");
        let sig = FunctionSig::new("f", TypeId::VOID).param("x", TypeId::F64);
        let mut f = pb.function(m, sig).unwrap();
        let target = f.label();
        f.ldarg(0).ldc_f64(0.0).push(Instr::Branch { op, target });
        f.place(target).unwrap();
        f.ret();
        pb.define(f).unwrap();
        generate(pb)
    }

    #[test]
    fn float_branches_lower_to_compare_and_test() {
        let modules = float_branch(BranchOp::Bgt).unwrap();
        let code = &modules[0].image[12..];
        assert_eq!(&code[0..2], &[0x19, 0]);
        assert_eq!(code[2], 0x14);
        // cgt.f64, brtrue.w32.s +0, ret
        assert_eq!(&code[11..], &[0x67, 0xC9, 0x00, 0x01]);
        assert_eq!(modules[0].features, Features::FLOAT64);
    }

    #[test]
    fn float_ordering_branches_without_an_ordered_compare_are_rejected() {
        let func = FuncRef {
            module: ModuleId(0),
            index: 0,
        };
        for op in [BranchOp::Bge, BranchOp::Ble] {
            assert_eq!(
                float_branch(op),
                Err(EncodeError::UnsupportedOperand {
                    func,
                    index: 2,
                    ty: TypeId::F64,
                })
            );
        }
        assert!(float_branch(BranchOp::Blt).is_ok());
    }

    #[test]
    fn errors_map_to_encoding_diagnostics() {
        let e = EncodeError::TooManyImports {
            module: ModuleId(2),
            count: 300,
        };
        let d = e.to_diagnostic();
        assert_eq!(d.code, 3009);
        assert_eq!(d.category, DiagnosticCategory::Encoding);
        assert!(d.is_error());
    }
}
