/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Compiler flag sets.

use std::fmt;

use serde::Serialize;

/// An ordered set of compiler flags.
///
/// Merging is an idempotent union: flags keep the position of their first
/// occurrence, and merging the same flags again changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CompilerFlags(Vec<String>);

impl CompilerFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a shell-style flag string on whitespace.
    pub fn parse(flags: &str) -> Self {
        let mut parsed = Self::new();
        for flag in flags.split_whitespace() {
            parsed.insert(flag);
        }
        parsed
    }

    /// Add `flag` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, flag: impl Into<String>) -> bool {
        let flag = flag.into();
        if flag.is_empty() || self.0.contains(&flag) {
            return false;
        }
        self.0.push(flag);
        true
    }

    /// The union of `self` and `other`, leaving both untouched.
    #[must_use]
    pub fn merged(&self, other: &CompilerFlags) -> CompilerFlags {
        let mut merged = self.clone();
        for flag in &other.0 {
            merged.insert(flag.as_str());
        }
        merged
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.iter().any(|f| f == flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for CompilerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for CompilerFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut flags = CompilerFlags::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}
