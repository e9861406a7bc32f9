// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame slot layout: `[params][locals][operand stack]`, all in 32-bit slots.

use crate::codegen::{EncodeError, FramePart};
use crate::program::{FuncRef, FunctionDef, Variable};
use crate::types::TypeTable;
use crate::verifier::VerifiedFunction;

/// Slot assignment for one function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    /// Total slots taken by parameters.
    pub arg_slots: u8,
    /// Total slots taken by locals.
    pub local_slots: u8,
    /// Peak operand stack depth, in slots.
    pub max_stack: u8,
    param_offsets: Vec<u8>,
    local_offsets: Vec<u8>,
}

impl FrameLayout {
    /// Lays out `def` using the stack states recorded by the verifier.
    pub fn compute(
        types: &TypeTable,
        func: FuncRef,
        def: &FunctionDef,
        verified: &VerifiedFunction,
    ) -> Result<Self, EncodeError> {
        let (param_offsets, arg_slots) = assign(types, func, &def.params, FramePart::Params)?;
        let (local_offsets, local_slots) =
            assign(types, func, &def.locals, FramePart::Locals)?;
        // Local slot indices continue after the parameters.
        let local_offsets = local_offsets
            .into_iter()
            .map(|o| {
                let slot = add(func, FramePart::Frame, u32::from(o), arg_slots)?;
                fit(func, FramePart::Frame, slot)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let max_stack = verified
            .states
            .iter()
            .flatten()
            .map(|stack| {
                stack
                    .iter()
                    .try_fold(0_u32, |acc, &t| add(func, FramePart::Stack, acc, types.slots(t)))
            })
            .try_fold(0_u32, |peak, depth| depth.map(|d| peak.max(d)))?;

        let frame = Self {
            arg_slots: fit(func, FramePart::Params, arg_slots)?,
            local_slots: fit(func, FramePart::Locals, local_slots)?,
            max_stack: fit(func, FramePart::Stack, max_stack)?,
            param_offsets,
            local_offsets,
        };
        let total = add(func, FramePart::Frame, arg_slots, local_slots)?;
        fit(func, FramePart::Frame, add(func, FramePart::Frame, total, max_stack)?)?;
        Ok(frame)
    }

    /// Layout of a syscall stub: arguments in, result on the stack.
    pub fn stub(types: &TypeTable, func: FuncRef, def: &FunctionDef) -> Result<Self, EncodeError> {
        let (param_offsets, arg_slots) = assign(types, func, &def.params, FramePart::Params)?;
        let ret_slots = types.slots(def.ret);
        fit(func, FramePart::Frame, add(func, FramePart::Frame, arg_slots, ret_slots)?)?;
        Ok(Self {
            arg_slots: fit(func, FramePart::Params, arg_slots)?,
            local_slots: 0,
            max_stack: fit(func, FramePart::Stack, ret_slots)?,
            param_offsets,
            local_offsets: Vec::new(),
        })
    }

    /// First slot of parameter `index`.
    #[must_use]
    pub fn param_slot(&self, index: u16) -> Option<u8> {
        self.param_offsets.get(usize::from(index)).copied()
    }

    /// First slot of local `index`.
    #[must_use]
    pub fn local_slot(&self, index: u16) -> Option<u8> {
        self.local_offsets.get(usize::from(index)).copied()
    }
}

fn assign(
    types: &TypeTable,
    func: FuncRef,
    vars: &[Variable],
    part: FramePart,
) -> Result<(Vec<u8>, u32), EncodeError> {
    let mut next = 0_u32;
    let mut offsets = Vec::with_capacity(vars.len());
    for var in vars {
        offsets.push(fit(func, part, next)?);
        next = add(func, part, next, types.slots(var.ty))?;
    }
    Ok((offsets, next))
}

fn add(func: FuncRef, part: FramePart, a: u32, b: u32) -> Result<u32, EncodeError> {
    a.checked_add(b).ok_or(EncodeError::FrameOverflow {
        func,
        part,
        slots: u32::MAX,
    })
}

fn fit(func: FuncRef, part: FramePart, slots: u32) -> Result<u8, EncodeError> {
    u8::try_from(slots).map_err(|_| EncodeError::FrameOverflow { func, part, slots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{FunctionSig, ProgramBuilder};
    use crate::types::TypeId;
    use crate::verifier::{VerifyConfig, verify_function};

    #[test]
    fn params_then_locals_then_stack() {
        let mut pb = ProgramBuilder::new();
        let bytes = pb
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
        let m = pb.module("main");
        let sig = FunctionSig::new("f", TypeId::I64)
            .param("x", TypeId::I64)
            .param("y", TypeId::I32)
            .local("s", bytes)
            .local("k", TypeId::I16);
        let mut f = pb.function(m, sig).unwrap();
        let func = f.func();
        f.ldarg(0).ldarg(0).add().ret();
        pb.define(f).unwrap();
        let program = pb.build().unwrap();
        let verified = verify_function(&program, func, &VerifyConfig::default()).unwrap();
        let def = program.function(func).unwrap();

        let frame = FrameLayout::compute(&program.types, func, def, &verified).unwrap();
        assert_eq!(frame.arg_slots, 3);
        assert_eq!(frame.local_slots, 3);
        assert_eq!(frame.max_stack, 4);
        assert_eq!(frame.param_slot(0), Some(0));
        assert_eq!(frame.param_slot(1), Some(2));
        assert_eq!(frame.local_slot(0), Some(3));
        assert_eq!(frame.local_slot(1), Some(5));
        assert_eq!(frame.local_slot(2), None);
    }

    #[test]
    fn oversized_locals_are_rejected() {
        let mut pb = ProgramBuilder::new();
        let big = pb.types_mut().array(TypeId::I32, 300).unwrap();
        let m = pb.module("main");
        let mut f = pb
            .function(m, FunctionSig::new("f", TypeId::VOID).local("big", big))
            .unwrap();
        let func = f.func();
        f.ret();
        pb.define(f).unwrap();
        let program = pb.build().unwrap();
        let verified = verify_function(&program, func, &VerifyConfig::default()).unwrap();
        let def = program.function(func).unwrap();

        assert_eq!(
            FrameLayout::compute(&program.types, func, def, &verified),
            Err(EncodeError::FrameOverflow {
                func,
                part: FramePart::Locals,
                slots: 300,
            })
        );
    }

    #[test]
    fn huge_parameters_overflow_without_wrapping() {
        let mut pb = ProgramBuilder::new();
        let huge = pb.types_mut().array(TypeId::I32, (1 << 30) - 1).unwrap();
        let m = pb.module("main");
        let mut sig = FunctionSig::new("f", TypeId::VOID);
        for name in ["a", "b", "c", "d"] {
            sig = sig.param(name, huge);
        }
        let mut f = pb.function(m, sig).unwrap();
        let func = f.func();
        f.ret();
        pb.define(f).unwrap();
        let program = pb.build().unwrap();
        let def = program.function(func).unwrap();

        assert!(matches!(
            assign(&program.types, func, &def.params, FramePart::Params),
            Err(EncodeError::FrameOverflow {
                part: FramePart::Params,
                ..
            })
        ));
        assert_eq!(
            add(func, FramePart::Frame, u32::MAX, 1),
            Err(EncodeError::FrameOverflow {
                func,
                part: FramePart::Frame,
                slots: u32::MAX,
            })
        );
    }

    #[test]
    fn whole_frame_is_limited_even_when_each_part_fits() {
        let mut pb = ProgramBuilder::new();
        let block = pb.types_mut().array(TypeId::I32, 120).unwrap();
        let m = pb.module("main");
        let sig = FunctionSig::new("f", TypeId::VOID)
            .param("p", block)
            .local("l", block);
        let mut f = pb.function(m, sig).unwrap();
        let func = f.func();
        for _ in 0..10 {
            f.ldc_i64(0);
        }
        for _ in 0..10 {
            f.pop();
        }
        f.ret();
        pb.define(f).unwrap();
        let program = pb.build().unwrap();
        let verified = verify_function(&program, func, &VerifyConfig::default()).unwrap();
        let def = program.function(func).unwrap();

        assert_eq!(
            FrameLayout::compute(&program.types, func, def, &verified),
            Err(EncodeError::FrameOverflow {
                func,
                part: FramePart::Frame,
                slots: 260,
            })
        );
    }
}
