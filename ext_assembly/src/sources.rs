/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Source discovery.

use std::path::Path;
use std::path::PathBuf;

use glob::glob;
use serde::Serialize;

use crate::config::BuildConfig;
use crate::config::ConfigKey;
use crate::config::KERNEL_FILE;
use crate::config::SOURCE_EXT;
use crate::error::AssemblyError;
use crate::error::Result;

/// The source inputs of one extension, each collection in lexical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSet {
    /// Hand-written sources in the source directory.
    pub native: Vec<PathBuf>,
    /// Generated binding sources in the sibling bindings directory.
    pub bindings: Vec<PathBuf>,
    /// GPU kernel sources in the source directory.
    pub kernels: Vec<PathBuf>,
}

impl SourceSet {
    /// Discover the sources described by `config`.
    ///
    /// A missing bindings directory or kernel file yields an empty
    /// collection. An empty native collection is not an error here; the
    /// artifact assembler rejects it.
    pub fn discover(config: &BuildConfig) -> Result<Self> {
        let source_dir = config.source_dir()?;
        let source_pattern = format!("*.{}", config.source_extension);

        let sources = SourceSet {
            native: find_sources(&source_dir, &source_pattern, SOURCE_EXT)?,
            bindings: find_sources(&config.bindings_dir()?, &source_pattern, SOURCE_EXT)?,
            kernels: find_sources(&source_dir, &config.kernel_file, KERNEL_FILE)?,
        };

        tracing::info!(
            native = sources.native.len(),
            bindings = sources.bindings.len(),
            kernels = sources.kernels.len(),
            "discovered sources"
        );
        Ok(sources)
    }

    /// Number of compilation units across all collections.
    pub fn len(&self) -> usize {
        self.native.len() + self.bindings.len() + self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Files in `dir` matching `pattern`, sorted. A missing directory has no
/// files. A bad pattern is reported against `key`.
fn find_sources(dir: &Path, pattern: &str, key: ConfigKey) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "source directory does not exist");
        return Ok(Vec::new());
    }

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let entries = glob(&full_pattern).map_err(|e| {
        AssemblyError::config(
            key.env,
            pattern,
            format!("bad source pattern: {}", e),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            AssemblyError::Io(path, e.into_error())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
