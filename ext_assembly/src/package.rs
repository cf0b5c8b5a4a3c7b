/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Native package discovery.
//!
//! Packages installed by pip ship a CMake package-config file
//! (`TorchConfig.cmake`, `pybind11Config.cmake`) next to their headers and
//! libraries. Given a list of search hints, [`ConfigFileFinder`] finds that
//! file, walks up to the install prefix, and derives the include
//! directories, libraries and compiler flags from the prefix layout.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use regex::Regex;
use serde::Serialize;

use crate::error::AssemblyError;
use crate::error::Result;
use crate::flags::CompilerFlags;

/// What a package looks like once installed.
#[derive(Debug, Clone, Copy)]
pub struct PackageSpec {
    pub name: &'static str,
    pub config_file: &'static str,
    /// Include directories relative to the prefix. The first is required.
    pub include_subdirs: &'static [&'static str],
    pub required_libs: &'static [&'static str],
    pub optional_libs: &'static [&'static str],
    /// Variable in the config file holding extra compiler flags.
    pub flags_variable: Option<&'static str>,
}

pub const TORCH: PackageSpec = PackageSpec {
    name: "Torch",
    config_file: "TorchConfig.cmake",
    include_subdirs: &["include", "include/torch/csrc/api/include"],
    required_libs: &["torch", "c10"],
    optional_libs: &["torch_cpu", "torch_cuda", "c10_cuda"],
    flags_variable: Some("TORCH_CXX_FLAGS"),
};

pub const PYBIND11: PackageSpec = PackageSpec {
    name: "pybind11",
    config_file: "pybind11Config.cmake",
    include_subdirs: &["include"],
    required_libs: &[],
    optional_libs: &[],
    flags_variable: None,
};

/// Ordered, duplicate-free list of directories searched for packages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SearchHints(Vec<PathBuf>);

impl SearchHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.0.contains(&dir) {
            tracing::debug!(hint = %dir.display(), "registered package search hint");
            self.0.push(dir);
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.0
    }
}

/// A package found by native discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativePackage {
    pub name: String,
    pub config_file: PathBuf,
    pub prefix: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub libraries: Vec<PathBuf>,
    pub cxx_flags: CompilerFlags,
}

/// Finds installed native packages.
pub trait PackageFinder {
    /// Find `spec` using `hints`, or fail with
    /// [`AssemblyError::ToolchainMissing`].
    fn find(&self, spec: &PackageSpec, hints: &SearchHints) -> Result<NativePackage>;
}

/// Finds packages by their CMake package-config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigFileFinder;

impl ConfigFileFinder {
    fn config_candidates(spec: &PackageSpec, hint: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![hint.join(spec.config_file)];
        for name in [spec.name.to_string(), spec.name.to_ascii_lowercase()] {
            candidates.push(hint.join(&name).join(spec.config_file));
            candidates.push(hint.join("share/cmake").join(&name).join(spec.config_file));
            candidates.push(hint.join("lib/cmake").join(&name).join(spec.config_file));
        }
        candidates
    }

    fn find_config_file(spec: &PackageSpec, hints: &SearchHints) -> Option<PathBuf> {
        hints
            .dirs()
            .iter()
            .flat_map(|hint| Self::config_candidates(spec, hint))
            .find(|candidate| candidate.is_file())
    }

    fn read_flags(spec: &PackageSpec, config_file: &Path) -> Result<CompilerFlags> {
        let Some(variable) = spec.flags_variable else {
            return Ok(CompilerFlags::new());
        };
        let contents =
            fs::read_to_string(config_file).map_err(|e| AssemblyError::Io(config_file.into(), e))?;
        Ok(parse_flags_variable(&contents, variable))
    }
}

impl PackageFinder for ConfigFileFinder {
    fn find(&self, spec: &PackageSpec, hints: &SearchHints) -> Result<NativePackage> {
        let config_file = Self::find_config_file(spec, hints).ok_or_else(|| {
            AssemblyError::toolchain_missing(
                spec.name,
                format!("no {} under {:?}", spec.config_file, hints.dirs()),
            )
        })?;

        let primary_include = spec.include_subdirs.first().copied().unwrap_or("include");
        let prefix = config_file
            .ancestors()
            .skip(1)
            .find(|dir| dir.join(primary_include).is_dir())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                AssemblyError::toolchain_missing(
                    spec.name,
                    format!(
                        "found {} but no {} directory above it",
                        config_file.display(),
                        primary_include
                    ),
                )
            })?;

        let include_dirs: Vec<PathBuf> = spec
            .include_subdirs
            .iter()
            .map(|subdir| prefix.join(subdir))
            .filter(|dir| dir.is_dir())
            .collect();

        let lib_dirs: Vec<PathBuf> = ["lib", "lib64"]
            .iter()
            .map(|subdir| prefix.join(subdir))
            .filter(|dir| dir.is_dir())
            .collect();

        let mut libraries = Vec::new();
        for name in spec.required_libs {
            let library = build_utils::find_library(name, &lib_dirs)
                .map_err(|e| AssemblyError::toolchain_missing(spec.name, e))?;
            libraries.push(library);
        }
        for name in spec.optional_libs {
            if let Ok(library) = build_utils::find_library(name, &lib_dirs) {
                libraries.push(library);
            }
        }

        let cxx_flags = Self::read_flags(spec, &config_file)?;

        tracing::info!(
            package = spec.name,
            prefix = %prefix.display(),
            libraries = libraries.len(),
            "found native package"
        );

        Ok(NativePackage {
            name: spec.name.to_string(),
            config_file,
            prefix,
            include_dirs,
            lib_dirs,
            libraries,
            cxx_flags,
        })
    }
}

/// Extract the value of `set(<variable> "<value>")` from a CMake file.
/// Later assignments win, as they would when CMake evaluates the file.
fn parse_flags_variable(contents: &str, variable: &str) -> CompilerFlags {
    let pattern = format!(r#"set\(\s*{}\s+"([^"]*)"\s*\)"#, regex::escape(variable));
    let Ok(re) = Regex::new(&pattern) else {
        return CompilerFlags::new();
    };
    re.captures_iter(contents)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|value| CompilerFlags::parse(value.as_str()))
        .unwrap_or_default()
}
