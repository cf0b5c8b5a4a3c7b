/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Optional linking of the ahead-of-time kernel archive.

use std::path::PathBuf;

use serde::Serialize;

use crate::artifact::Artifact;
use crate::artifact::LibraryHandle;
use crate::config::BuildConfig;
use crate::error::Result;
use crate::feature::FeatureFlag;

/// A separately built archive of precompiled GPU kernels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AotKernelArchive {
    pub name: String,
    /// Absolute directories holding the archive and its own link
    /// dependencies.
    pub lib_dirs: Vec<PathBuf>,
}

impl AotKernelArchive {
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        Ok(Self {
            name: config.aot_archive.clone(),
            lib_dirs: config.aot_lib_dirs()?,
        })
    }
}

/// Link `archive` into `artifact` when `flag` is enabled. Returns whether
/// the archive was linked; when disabled the artifact is left untouched.
pub fn link_aot_archive(
    artifact: &mut Artifact,
    flag: FeatureFlag,
    archive: &AotKernelArchive,
) -> bool {
    if !flag.is_enabled() {
        tracing::debug!(archive = %archive.name, "ahead-of-time kernels disabled");
        return false;
    }

    // The archive may be produced later in the same build, so a missing
    // file is only worth a warning.
    if build_utils::find_library(&archive.name, &archive.lib_dirs).is_err() {
        tracing::warn!(
            archive = %archive.name,
            dirs = ?archive.lib_dirs,
            "ahead-of-time kernel archive not found yet"
        );
    }

    artifact.link(LibraryHandle::named(archive.name.clone()));
    for dir in &archive.lib_dirs {
        artifact.add_link_dir(dir);
    }

    // Re-apply the link directories as read back from the artifact.
    let link_dirs = artifact.link_dirs().to_vec();
    artifact.set_link_dirs(link_dirs);

    tracing::info!(
        archive = %archive.name,
        link_dirs = ?artifact.link_dirs(),
        "linked ahead-of-time kernel archive"
    );
    true
}
