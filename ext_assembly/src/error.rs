/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Errors raised while assembling an extension.
//!
//! Every error here is a configuration-time failure: the environment is
//! missing something or is misconfigured. None of them are retried.

use std::path::PathBuf;

/// The error type for the assembly pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AssemblyError {
    /// A dependency lookup failed: the interpreter exited with an
    /// unexpected status, could not be spawned, or printed nothing usable.
    #[error("failed to locate {dependency} (query {expression:?}): {diagnostic}")]
    DependencyDiscovery {
        dependency: String,
        expression: String,
        diagnostic: String,
    },

    /// A required toolkit or native package was not found.
    #[error("{toolkit} not found: {detail}")]
    ToolchainMissing { toolkit: String, detail: String },

    /// The artifact cannot be assembled from the inputs given.
    #[error("cannot assemble artifact: {0}")]
    ArtifactAssembly(String),

    /// A configuration value was rejected.
    #[error("invalid configuration {key}={value:?}: {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error("io error on {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
}

impl AssemblyError {
    pub(crate) fn toolchain_missing(toolkit: impl Into<String>, detail: impl ToString) -> Self {
        AssemblyError::ToolchainMissing {
            toolkit: toolkit.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AssemblyError::Config {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
