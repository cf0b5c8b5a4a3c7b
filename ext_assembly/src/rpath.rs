/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Runtime search paths.
//!
//! An artifact that links the ahead-of-time kernel archive gets two kinds
//! of rpath entries: the loader token for "the directory of this module",
//! so an installed copy finds libraries shipped next to it, and the
//! absolute link directories, so the build-tree copy finds the archive's
//! dependencies where they were linked from. Neither kind alone covers
//! both cases.

use crate::artifact::Artifact;
use crate::artifact::RuntimePath;
use crate::error::AssemblyError;
use crate::error::Result;

/// Loader token for the directory containing the loaded object.
#[cfg(target_os = "macos")]
pub const ORIGIN_TOKEN: &str = "@loader_path";
#[cfg(not(target_os = "macos"))]
pub const ORIGIN_TOKEN: &str = "$ORIGIN";

/// Embed the self-relative and absolute runtime search paths into
/// `artifact`.
pub fn embed_runtime_path(artifact: &mut Artifact) -> Result<()> {
    let absolute: Vec<_> = artifact
        .link_dirs()
        .iter()
        .filter(|dir| dir.is_absolute())
        .cloned()
        .collect();
    if absolute.is_empty() {
        return Err(AssemblyError::ArtifactAssembly(format!(
            "{} links the ahead-of-time kernel archive but has no absolute library directory to embed",
            artifact.name()
        )));
    }

    let runtime_path = RuntimePath {
        relative: vec![ORIGIN_TOKEN.to_string()],
        absolute,
    };
    tracing::info!(rpath = ?runtime_path.entries(), "embedding runtime search path");
    artifact.set_runtime_path(runtime_path);
    Ok(())
}
