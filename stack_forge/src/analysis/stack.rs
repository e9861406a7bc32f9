// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent abstract operand stack.

use im::Vector;

/// An immutable operand stack of abstract values, bottom first.
///
/// Pushing or popping produces a new stack that shares structure with the old one, so recording
/// one state per instruction index stays cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AbstractStack<T: Clone>(Vector<T>);

impl<T: Clone> Default for AbstractStack<T> {
    fn default() -> Self {
        Self(Vector::new())
    }
}

impl<T: Clone> AbstractStack<T> {
    /// Returns the empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the top value.
    #[must_use]
    pub fn top(&self) -> Option<&T> {
        self.0.last()
    }

    /// Returns a stack with `value` pushed.
    #[must_use]
    pub fn push(&self, value: T) -> Self {
        let mut next = self.0.clone();
        next.push_back(value);
        Self(next)
    }

    /// Returns the top value and the remaining stack.
    #[must_use]
    pub fn pop(&self) -> Option<(T, Self)> {
        let mut rest = self.0.clone();
        let value = rest.pop_back()?;
        Some((value, Self(rest)))
    }

    /// Iterates values bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.0.iter()
    }
}

impl<T: Clone> FromIterator<T> for AbstractStack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
