// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generic abstract-interpretation machinery shared by the verifier and tooling.

pub(crate) mod bitset;
pub mod dataflow;
pub mod stack;

pub use dataflow::{Effect, Flow, Solution, Target, Transfer, solve};
pub use stack::AbstractStack;
