// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "benchmark crate")]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use stack_forge::asm::{FunctionSig, ProgramBuilder};
use stack_forge::codegen::{CodegenConfig, generate_program};
use stack_forge::compile::{CompileConfig, compile_program};
use stack_forge::link::Linker;
use stack_forge::program::Program;
use stack_forge::types::TypeId;
use stack_forge::verifier::{VerifyConfig, verify_program};

fn bench_compile(c: &mut Criterion) {
    bench_verify_add_chain(c);
    bench_codegen_branchy(c);
    bench_link_chain(c);
    bench_compile_end_to_end(c);
}

fn bench_verify_add_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_add_chain");
    for &len in &[10_u32, 100, 1000] {
        let p = build_add_chain(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &p, |b, p| {
            b.iter(|| {
                let v = verify_program(p, &VerifyConfig::default()).unwrap();
                black_box(v);
            });
        });
    }
    group.finish();
}

fn bench_codegen_branchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("codegen_branchy");
    for &blocks in &[10_u32, 100, 500] {
        let p = build_branchy(blocks);
        let v = verify_program(&p, &VerifyConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &(p, v), |b, (p, v)| {
            b.iter(|| {
                let m = generate_program(p, v, &CodegenConfig::default()).unwrap();
                black_box(m);
            });
        });
    }
    group.finish();
}

fn bench_link_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("link_chain");
    for &depth in &[2_u32, 16, 64] {
        let p = build_module_chain(depth);
        let v = verify_program(&p, &VerifyConfig::default()).unwrap();
        let compiled = generate_program(&p, &v, &CodegenConfig::default()).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(depth),
            &compiled,
            |b, compiled| {
                b.iter(|| {
                    let linked = Linker::new(compiled.clone()).link_all().unwrap();
                    black_box(linked);
                });
            },
        );
    }
    group.finish();
}

fn bench_compile_end_to_end(c: &mut Criterion) {
    let p = build_module_chain(16);
    c.bench_function("compile_module_chain_16", |b| {
        b.iter(|| {
            let linked = compile_program(&p, &CompileConfig::default()).unwrap();
            black_box(linked);
        });
    });
}

/// `i64 f(i64 x) { return x + x + ... + x; }`
fn build_add_chain(len: u32) -> Program {
    let mut pb = ProgramBuilder::new();
    let m = pb.module("chain");
    let sig = FunctionSig::new("f", TypeId::I64).param("x", TypeId::I64);
    let mut f = pb.function(m, sig).unwrap();
    f.ldarg(0);
    for _ in 0..len {
        f.ldarg(0).add();
    }
    f.ret();
    pb.define(f).unwrap();
    pb.build().unwrap()
}

/// A chain of `if (x < k) x = x + k;` blocks, so forward branches straddle each other.
fn build_branchy(blocks: u32) -> Program {
    let mut pb = ProgramBuilder::new();
    let m = pb.module("branchy");
    let sig = FunctionSig::new("f", TypeId::I32).param("x", TypeId::I32);
    let mut f = pb.function(m, sig).unwrap();
    for k in 0..blocks {
        let k = i32::try_from(k).unwrap();
        let skip = f.label();
        f.ldarg(0).ldc_i32(k).bge(skip);
        f.ldarg(0).ldc_i32(k).add().starg(0);
        f.place(skip).unwrap();
    }
    f.ldarg(0).ret();
    pb.define(f).unwrap();
    pb.build().unwrap()
}

/// `depth` modules, each importing and calling the previous one.
fn build_module_chain(depth: u32) -> Program {
    let mut pb = ProgramBuilder::new();
    let mut prev = None;
    for i in 0..depth {
        let m = pb.module(&format!("m{i}"));
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::I32)).unwrap();
        let func = f.func();
        match prev {
            Some(callee) => {
                f.call(callee).ldc_i32(1).add().ret();
            }
            None => {
                f.ldc_i32(0).ret();
            }
        }
        if let Some(callee) = prev {
            pb.import(m, callee.module).unwrap();
        }
        pb.define(f).unwrap();
        prev = Some(func);
    }
    pb.build().unwrap()
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
