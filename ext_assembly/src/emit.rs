/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Handing the assembled artifact to a compiler and linker.
//!
//! Nothing here compiles. The artifact is rendered as a JSON build
//! description, as cargo build-script directives, or as configured
//! `cc::Build`s that the caller may choose to run.

use std::path::Path;

use crate::artifact::Artifact;
use crate::artifact::LibraryHandle;
use crate::artifact::LinkKind;
use crate::artifact::UnitKind;

/// Pretty-printed JSON build description.
pub fn to_json(artifact: &Artifact) -> serde_json::Result<String> {
    serde_json::to_string_pretty(artifact)
}

/// Link name of a library file: `libtorch.so.2` is `torch`,
/// `libcudart_static.a` is `cudart_static`.
pub fn link_name(file: &Path) -> Option<String> {
    let file_name = file.file_name()?.to_str()?;
    let stem = file_name
        .split_once(".so")
        .map(|(stem, _)| stem)
        .or_else(|| file_name.strip_suffix(".a"))
        .or_else(|| file_name.strip_suffix(".dylib"))
        .or_else(|| file_name.strip_suffix(".lib"))?;
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    (!stem.is_empty()).then(|| stem.to_string())
}

fn library_directives(library: &LibraryHandle, directives: &mut Vec<String>) {
    match library.kind {
        LinkKind::Named => {
            directives.push(format!("cargo:rustc-link-lib={}", library.name));
        }
        LinkKind::Shared | LinkKind::Static => {
            let modifier = if library.kind == LinkKind::Static {
                "static"
            } else {
                "dylib"
            };
            for file in &library.files {
                if let Some(dir) = file.parent() {
                    let search = format!("cargo:rustc-link-search=native={}", dir.display());
                    if !directives.contains(&search) {
                        directives.push(search);
                    }
                }
                if let Some(name) = link_name(file) {
                    directives.push(format!("cargo:rustc-link-lib={}={}", modifier, name));
                }
            }
        }
    }
}

/// Cargo build-script directives linking the artifact's libraries and
/// embedding its runtime search path.
pub fn cargo_directives(artifact: &Artifact) -> Vec<String> {
    let mut directives = Vec::new();
    for unit in artifact.units() {
        directives.push(format!("cargo:rerun-if-changed={}", unit.path.display()));
    }
    for dir in artifact.link_dirs() {
        directives.push(format!("cargo:rustc-link-search=native={}", dir.display()));
    }
    for library in artifact.libraries() {
        library_directives(library, &mut directives);
    }
    if let Some(runtime_path) = artifact.runtime_path() {
        for arg in runtime_path.linker_args() {
            directives.push(format!("cargo:rustc-link-arg={}", arg));
        }
    }
    directives
}

/// Print [`cargo_directives`] from a build script.
pub fn emit_cargo_directives(artifact: &Artifact) {
    println!(
        "cargo:warning=ext_assembly: {} with {} compilation units",
        artifact.filename(),
        artifact.units().len()
    );
    for directive in cargo_directives(artifact) {
        println!("{}", directive);
    }
}

/// Configure `cc` builds for the artifact: one for the C++ sources and,
/// when there are kernel sources, one for CUDA.
pub fn cc_builds(artifact: &Artifact) -> (cc::Build, Option<cc::Build>) {
    let include_dirs = artifact.include_dirs();

    let mut host = cc::Build::new();
    host.cpp(true).pic(true).std("c++17");
    host.files(artifact.units_of(UnitKind::Native));
    host.files(artifact.units_of(UnitKind::Binding));
    host.includes(&include_dirs);
    for flag in artifact.compile_flags().iter() {
        host.flag(flag);
    }

    let mut kernels = artifact.units_of(UnitKind::Kernel).peekable();
    let cuda = kernels.peek().is_some().then(|| {
        let mut cuda = cc::Build::new();
        cuda.cuda(true).pic(true);
        cuda.files(kernels);
        cuda.includes(&include_dirs);
        // Host-only flags would confuse nvcc; defines are understood by both.
        for flag in artifact.compile_flags().iter().filter(|f| f.starts_with("-D")) {
            cuda.flag(flag);
        }
        cuda
    });

    (host, cuda)
}
