// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Worklist fixpoint solver over abstract operand stacks.
//!
//! The engine owns the iteration mechanics: seeding, the worklist, recording one stack per
//! instruction index, and merging at join points. Clients supply the abstract domain and the
//! per-category transfer functions through [`Transfer`].
//!
//! The recorded state at index `i` is the stack *before* instruction `i` runs. Termination relies
//! on [`Transfer::merge`] being monotone and idempotent; the engine does not check this.

use std::collections::VecDeque;

use log::trace;

use crate::analysis::bitset::BitSet;
use crate::analysis::stack::AbstractStack;
use crate::diagnostics::Diagnostic;
use crate::instr::{AccessOp, BranchOp, Constant, FieldRef, FuncOp, Instr, Label, NoneOp, TypeOp};
use crate::program::FuncRef;
use crate::types::TypeId;

/// A control-flow successor that could not be resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A branch label missing from the label table.
    Label(Label),
    /// Fall-through past the last instruction.
    End,
}

/// Client half of the engine: an abstract domain plus transfer functions by category.
///
/// Each transfer method pops and pushes values on `flow` and declares successors with
/// [`Flow::fall_through`] and [`Flow::branch_to`]. Returning an error aborts the run.
pub trait Transfer {
    /// One abstract operand-stack slot.
    type Value: Clone + PartialEq;
    /// Fatal error type.
    type Error;

    /// Operand-free instructions.
    fn none(&mut self, flow: &mut Flow<'_, Self::Value>, op: NoneOp) -> Result<(), Self::Error>;

    /// Literal pushes.
    fn constant(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        value: Constant,
    ) -> Result<(), Self::Error>;

    /// Argument access.
    fn argument(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        op: AccessOp,
        index: u16,
    ) -> Result<(), Self::Error>;

    /// Local access.
    fn local(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        op: AccessOp,
        index: u16,
    ) -> Result<(), Self::Error>;

    /// Field access.
    fn field(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        op: AccessOp,
        field: FieldRef,
    ) -> Result<(), Self::Error>;

    /// Calls, constructors and function addresses.
    fn function(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        op: FuncOp,
        func: FuncRef,
    ) -> Result<(), Self::Error>;

    /// Type-annotated instructions.
    fn typed(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        op: TypeOp,
        ty: TypeId,
    ) -> Result<(), Self::Error>;

    /// Branches.
    fn branch(
        &mut self,
        flow: &mut Flow<'_, Self::Value>,
        op: BranchOp,
        target: Label,
    ) -> Result<(), Self::Error>;

    /// Merges an incoming stack into the one already recorded at `target`.
    fn merge(
        &mut self,
        target: usize,
        recorded: &AbstractStack<Self::Value>,
        incoming: &AbstractStack<Self::Value>,
    ) -> Result<AbstractStack<Self::Value>, Self::Error>;

    /// Builds the error for a successor that does not exist.
    fn unresolved(&mut self, index: usize, target: Target) -> Self::Error;
}

/// Net stack effect of one instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effect<T> {
    /// Values consumed from the incoming stack, in pop order (top first).
    pub popped: Vec<T>,
    /// Values left on the outgoing stack, in push order.
    pub pushed: Vec<T>,
}

/// Per-visit context handed to [`Transfer`] methods.
#[derive(Debug)]
pub struct Flow<'a, T: Clone> {
    index: usize,
    stack: AbstractStack<T>,
    effect: Effect<T>,
    successors: &'a mut Vec<(Option<Label>, AbstractStack<T>)>,
    errors: &'a mut Vec<(usize, Diagnostic)>,
}

impl<T: Clone> Flow<'_, T> {
    /// Index of the instruction being visited.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The current stack.
    #[must_use]
    pub fn stack(&self) -> &AbstractStack<T> {
        &self.stack
    }

    /// Pops the top value, or returns `None` on underflow.
    pub fn pop(&mut self) -> Option<T> {
        let (value, rest) = self.stack.pop()?;
        self.stack = rest;
        if self.effect.pushed.pop().is_none() {
            self.effect.popped.push(value.clone());
        }
        Some(value)
    }

    /// Pushes a value.
    pub fn push(&mut self, value: T) {
        self.effect.pushed.push(value.clone());
        self.stack = self.stack.push(value);
    }

    /// Declares the next instruction as a successor with the current stack.
    pub fn fall_through(&mut self) {
        self.successors.push((None, self.stack.clone()));
    }

    /// Declares `target` as a successor with the current stack.
    pub fn branch_to(&mut self, target: Label) {
        self.successors.push((Some(target), self.stack.clone()));
    }

    /// Declares `target` as a successor with an explicit stack.
    pub fn branch_with(&mut self, target: Label, stack: AbstractStack<T>) {
        self.successors.push((Some(target), stack));
    }

    /// Records a non-fatal finding without stopping the run.
    pub fn add_error(&mut self, index: usize, diagnostic: Diagnostic) {
        self.errors.push((index, diagnostic));
    }
}

/// Fixpoint result.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution<T: Clone> {
    /// Stack before each instruction; `None` for unreachable instructions.
    pub states: Vec<Option<AbstractStack<T>>>,
    /// Stack effect of each instruction under its final recorded state.
    pub effects: Vec<Option<Effect<T>>>,
    /// Non-fatal findings, by instruction index.
    pub errors: Vec<(usize, Diagnostic)>,
}

impl<T: Clone> Solution<T> {
    /// Records a non-fatal finding after the run.
    pub fn add_error(&mut self, index: usize, diagnostic: Diagnostic) {
        self.errors.push((index, diagnostic));
    }
}

/// Runs `transfer` over `body` to a fixpoint, starting at index 0 with the empty stack.
///
/// `labels[l]` is the instruction index of label `l`.
pub fn solve<X: Transfer>(
    body: &[Instr],
    labels: &[u32],
    transfer: &mut X,
) -> Result<Solution<X::Value>, X::Error> {
    let n = body.len();
    let mut states: Vec<Option<AbstractStack<X::Value>>> = vec![None; n];
    let mut effects: Vec<Option<Effect<X::Value>>> = vec![None; n];
    let mut errors = Vec::new();
    if n == 0 {
        return Ok(Solution {
            states,
            effects,
            errors,
        });
    }

    let mut queued = BitSet::new_empty(n);
    let mut work: VecDeque<usize> = VecDeque::new();
    states[0] = Some(AbstractStack::new());
    queued.set(0);
    work.push_back(0);

    let mut successors = Vec::new();
    while let Some(index) = work.pop_front() {
        queued.clear(index);
        let Some(stack) = states[index].clone() else {
            continue;
        };
        trace!("dataflow: visit {index} depth={}", stack.len());

        successors.clear();
        let mut flow = Flow {
            index,
            stack,
            effect: Effect {
                popped: Vec::new(),
                pushed: Vec::new(),
            },
            successors: &mut successors,
            errors: &mut errors,
        };
        match body[index] {
            Instr::None(op) => transfer.none(&mut flow, op)?,
            Instr::Constant(c) => transfer.constant(&mut flow, c)?,
            Instr::Argument { op, index } => transfer.argument(&mut flow, op, index)?,
            Instr::Local { op, index } => transfer.local(&mut flow, op, index)?,
            Instr::Field { op, field } => transfer.field(&mut flow, op, field)?,
            Instr::Function { op, func } => transfer.function(&mut flow, op, func)?,
            Instr::Type { op, ty } => transfer.typed(&mut flow, op, ty)?,
            Instr::Branch { op, target } => transfer.branch(&mut flow, op, target)?,
        }
        // The last visit of an index always sees its final state.
        effects[index] = Some(flow.effect);

        for (label, incoming) in successors.drain(..) {
            let target = match label {
                None if index + 1 < n => index + 1,
                None => return Err(transfer.unresolved(index, Target::End)),
                Some(label) => match labels.get(label.0 as usize) {
                    Some(&t) if (t as usize) < n => t as usize,
                    _ => return Err(transfer.unresolved(index, Target::Label(label))),
                },
            };
            let merged = match &states[target] {
                None => incoming,
                Some(recorded) => transfer.merge(target, recorded, &incoming)?,
            };
            if states[target].as_ref() != Some(&merged) {
                states[target] = Some(merged);
                if !queued.get(target) {
                    queued.set(target);
                    work.push_back(target);
                }
            }
        }
    }

    Ok(Solution {
        states,
        effects,
        errors,
    })
}
