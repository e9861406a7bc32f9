// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler example.
//!
//! Run with:
//! `cargo run -p stack_forge --example disasm`

use stack_forge::asm::{FunctionSig, ProgramBuilder};
use stack_forge::compile::{CompileConfig, compile_program};
use stack_forge::disasm::disassemble;
use stack_forge::types::TypeId;

fn main() {
    let mut pb = ProgramBuilder::new();
    let lib = pb.module("lib");
    let app = pb.module("app");
    pb.import(app, lib).unwrap();

    // i32 max(i32 a, i32 b) { if a >= b { a } else { b } }
    let sig = FunctionSig::new("max", TypeId::I32)
        .param("a", TypeId::I32)
        .param("b", TypeId::I32);
    let mut f = pb.function(lib, sig).unwrap();
    let max = f.func();
    let l_else = f.label();
    f.ldarg(0).ldarg(1).blt(l_else);
    f.ldarg(0).ret();
    f.place(l_else).unwrap();
    f.ldarg(1).ret();
    pb.define(f).unwrap();

    let mut main = pb.function(app, FunctionSig::new("main", TypeId::I32)).unwrap();
    let entry = main.func();
    main.ldc_i32(3).ldc_i32(4).call(max).ret();
    pb.define(main).unwrap();
    pb.set_entry(entry).unwrap();

    let program = pb.build().unwrap();
    let linked = compile_program(&program, &CompileConfig::default()).unwrap();
    for module in &linked {
        println!("; module \"{}\" {}", module.name, module.fingerprint);
        let listing = disassemble(&module.image, &module.function_offsets).unwrap();
        println!("{listing}");
    }
}
