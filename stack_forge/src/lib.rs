// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `stack_forge`: verifier, code generator and content-addressed linker for a small
//! stack-machine assembly language.
//!
//! The pipeline is:
//! - [`asm`] builds a [`program::Program`] and [`program::Program::bind`] checks its references.
//! - [`verifier`] abstractly interprets every function over a persistent
//!   [`analysis::AbstractStack`] and records the operand types of each instruction.
//! - [`codegen`] selects opcodes, lays out frames and branch forms, and encodes one image per
//!   module.
//! - [`link`] fingerprints images leaves-first and patches import tables.
//! - [`loader`] hands linked images to a VM, dependencies first.
//!
//! ## Example
//!
//! ```
//! use stack_forge::asm::{FunctionSig, ProgramBuilder};
//! use stack_forge::compile::{CompileConfig, compile_program};
//! use stack_forge::disasm::disassemble;
//! use stack_forge::types::TypeId;
//!
//! let mut pb = ProgramBuilder::new();
//! let lib = pb.module("lib");
//! let app = pb.module("app");
//! pb.import(app, lib)?;
//!
//! let mut twice = pb.function(lib, FunctionSig::new("twice", TypeId::I32).param("x", TypeId::I32))?;
//! let twice_ref = twice.func();
//! twice.ldarg(0).ldarg(0).add().ret();
//! pb.define(twice)?;
//!
//! let mut main = pb.function(app, FunctionSig::new("main", TypeId::I32))?;
//! let main_ref = main.func();
//! main.ldc_i32(21).call(twice_ref).ret();
//! pb.define(main)?;
//! pb.set_entry(main_ref)?;
//!
//! let program = pb.build()?;
//! let linked = compile_program(&program, &CompileConfig::default()).unwrap();
//! let app_image = &linked[1];
//! assert_eq!(app_image.module_count, 2);
//! assert_eq!(app_image.import_fingerprints, vec![linked[0].fingerprint]);
//!
//! let listing = disassemble(&app_image.image, &app_image.function_offsets).unwrap();
//! println!("{listing}");
//! # Ok::<(), stack_forge::asm::BuildError>(())
//! ```

pub mod analysis;
pub mod asm;
pub mod codegen;
pub mod compile;
pub mod diagnostics;
pub mod disasm;
pub mod format;
pub mod instr;
pub mod link;
pub mod loader;
pub mod opcode;
pub mod program;
pub mod types;
pub mod verifier;
