// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `stack_forge` live in `benches/`.
