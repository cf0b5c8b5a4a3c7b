/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for extension assembly.
//!
//! Every setting has an environment key. Values are read once, when the
//! configuration is built, and parsed into typed fields; nothing downstream
//! consults the environment again.

use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AssemblyError;
use crate::error::Result;
use crate::feature::FeatureFlag;
use crate::flags::CompilerFlags;

/// A configuration key and the environment variable that sets it.
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey {
    pub name: &'static str,
    pub env: &'static str,
}

impl ConfigKey {
    const fn new(name: &'static str, env: &'static str) -> Self {
        Self { name, env }
    }
}

/// Interpreter used for dependency queries.
pub const PYTHON: ConfigKey = ConfigKey::new("python", "PYO3_PYTHON");
/// Directory holding the hand-written native sources and the kernel.
pub const SOURCE_DIR: ConfigKey = ConfigKey::new("source_dir", "EXT_SOURCE_DIR");
/// Name of the generated-bindings directory, a sibling of the source dir.
pub const BINDINGS_DIR: ConfigKey = ConfigKey::new("bindings_dir_name", "EXT_BINDINGS_DIR");
/// File name of the GPU kernel source.
pub const KERNEL_FILE: ConfigKey = ConfigKey::new("kernel_file", "EXT_KERNEL_FILE");
/// Extension matched when discovering native and binding sources.
pub const SOURCE_EXT: ConfigKey = ConfigKey::new("source_extension", "EXT_SOURCE_EXT");
/// Name of the produced module.
pub const MODULE_NAME: ConfigKey = ConfigKey::new("module_name", "EXT_MODULE_NAME");
/// Toggle for linking the ahead-of-time kernel archive.
pub const AOT: ConfigKey = ConfigKey::new("aot", "TRITON_DIST_AOT");
/// Reject unrecognized toggle values instead of treating them as off.
pub const STRICT_FEATURE_FLAGS: ConfigKey =
    ConfigKey::new("strict_feature_flags", "EXT_STRICT_FEATURE_FLAGS");
/// Link name of the ahead-of-time kernel archive.
pub const AOT_ARCHIVE: ConfigKey = ConfigKey::new("aot_archive", "EXT_AOT_ARCHIVE");
/// Directories holding the archive and its link dependencies.
pub const AOT_LIB_DIRS: ConfigKey = ConfigKey::new("aot_lib_dirs", "EXT_AOT_LIB_DIRS");
/// Root of the CUDA toolkit. Unset means "use the usual heuristics".
pub const CUDA_HOME: ConfigKey = ConfigKey::new("cuda_home", "CUDA_HOME");
/// Dependency locator strategy.
pub const LOCATOR: ConfigKey = ConfigKey::new("locator", "EXT_LOCATOR");
/// Manifest consulted by the manifest locator.
pub const MANIFEST: ConfigKey = ConfigKey::new("manifest", "EXT_DEPENDENCY_MANIFEST");
/// Base C++ compiler flags.
pub const CXX_FLAGS: ConfigKey = ConfigKey::new("cxx_flags", "CXXFLAGS");

pub const ALL_KEYS: &[ConfigKey] = &[
    PYTHON,
    SOURCE_DIR,
    BINDINGS_DIR,
    KERNEL_FILE,
    SOURCE_EXT,
    MODULE_NAME,
    AOT,
    STRICT_FEATURE_FLAGS,
    AOT_ARCHIVE,
    AOT_LIB_DIRS,
    CUDA_HOME,
    LOCATOR,
    MANIFEST,
    CXX_FLAGS,
];

/// How dependency directories are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    /// Ask the Python interpreter.
    #[default]
    Interpreter,
    /// Read a JSON manifest.
    Manifest,
    /// Read one environment variable per dependency.
    Env,
}

impl FromStr for LocatorKind {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpreter" | "python" => Ok(LocatorKind::Interpreter),
            "manifest" => Ok(LocatorKind::Manifest),
            "env" | "environment" => Ok(LocatorKind::Env),
            _ => Err(AssemblyError::config(
                LOCATOR.env,
                s,
                "expected one of interpreter, manifest, env",
            )),
        }
    }
}

/// The resolved configuration for one assembly pass.
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    pub python: Option<PathBuf>,
    pub source_dir: PathBuf,
    pub bindings_dir_name: String,
    pub kernel_file: String,
    pub source_extension: String,
    pub module_name: String,
    pub aot: FeatureFlag,
    pub strict_feature_flags: bool,
    pub aot_archive: String,
    /// Empty means `<source_dir>/build/lib`.
    pub aot_lib_dirs: Vec<PathBuf>,
    pub cuda_home: Option<PathBuf>,
    pub locator: LocatorKind,
    pub manifest: Option<PathBuf>,
    pub cxx_flags: CompilerFlags,
    /// How later stages read the environment (CUDA and interpreter probes,
    /// the environment locator).
    #[serde(skip)]
    pub env: EnvLookup,
}

/// Reads one environment variable.
pub type EnvLookup = fn(&str) -> Option<String>;

impl BuildConfig {
    /// A configuration with defaults for everything but the source dir.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: None,
            source_dir: source_dir.into(),
            bindings_dir_name: "pybind".to_string(),
            kernel_file: "kernel.cu".to_string(),
            source_extension: "cc".to_string(),
            module_name: "triton_distributed".to_string(),
            aot: FeatureFlag::Disabled,
            strict_feature_flags: false,
            aot_archive: "triton_distributed_kernel".to_string(),
            aot_lib_dirs: Vec::new(),
            cuda_home: None,
            locator: LocatorKind::Interpreter,
            manifest: None,
            cxx_flags: CompilerFlags::new(),
            env: build_utils::quiet_env,
        }
    }

    /// Build the configuration from the process environment, for build
    /// scripts. Every variable read, here or by a later stage, is reported
    /// with `cargo:rerun-if-env-changed`.
    pub fn from_env() -> Result<Self> {
        Self::with_env(build_utils::rerun_env)
    }

    /// Build the configuration from the process environment without
    /// printing anything.
    pub fn from_process_env() -> Result<Self> {
        Self::with_env(build_utils::quiet_env)
    }

    fn with_env(env: EnvLookup) -> Result<Self> {
        let mut config = Self::from_lookup(env)?;
        config.env = env;
        Ok(config)
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: ConfigKey| lookup(key.env).filter(|value| !value.is_empty());

        let source_dir = match get(SOURCE_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir().map_err(|e| AssemblyError::Io(PathBuf::from("."), e))?,
        };
        let mut config = Self::new(source_dir);

        config.python = get(PYTHON).map(PathBuf::from);
        if let Some(name) = get(BINDINGS_DIR) {
            config.bindings_dir_name = name;
        }
        if let Some(kernel) = get(KERNEL_FILE) {
            config.kernel_file = kernel;
        }
        if let Some(ext) = get(SOURCE_EXT) {
            config.source_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(name) = get(MODULE_NAME) {
            config.module_name = name;
        }
        if let Some(strict) = get(STRICT_FEATURE_FLAGS) {
            config.strict_feature_flags = parse_bool(STRICT_FEATURE_FLAGS, &strict)?;
        }
        config.set_aot(lookup(AOT.env).as_deref())?;
        if let Some(archive) = get(AOT_ARCHIVE) {
            config.aot_archive = archive;
        }
        if let Some(dirs) = get(AOT_LIB_DIRS) {
            config.aot_lib_dirs = env::split_paths(&dirs)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect();
        }
        config.cuda_home = get(CUDA_HOME)
            .or_else(|| lookup("CUDA_PATH").filter(|value| !value.is_empty()))
            .map(PathBuf::from);
        if let Some(locator) = get(LOCATOR) {
            config.locator = locator.parse()?;
        }
        config.manifest = get(MANIFEST).map(PathBuf::from);
        if let Some(flags) = get(CXX_FLAGS) {
            config.cxx_flags = CompilerFlags::parse(&flags);
        }

        Ok(config)
    }

    /// Parse and store the AOT toggle, honoring `strict_feature_flags`.
    pub fn set_aot(&mut self, value: Option<&str>) -> Result<()> {
        self.aot = if self.strict_feature_flags {
            FeatureFlag::parse_strict(AOT.env, value)?
        } else {
            FeatureFlag::parse(value)
        };
        Ok(())
    }

    /// The source directory as an absolute path.
    pub fn source_dir(&self) -> Result<PathBuf> {
        std::path::absolute(&self.source_dir)
            .map_err(|e| AssemblyError::Io(self.source_dir.clone(), e))
    }

    /// The directory above the source directory.
    pub fn parent_dir(&self) -> Result<PathBuf> {
        let source_dir = self.source_dir()?;
        Ok(source_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(source_dir))
    }

    /// The generated-bindings directory, a sibling of the source directory.
    pub fn bindings_dir(&self) -> Result<PathBuf> {
        Ok(self.parent_dir()?.join(&self.bindings_dir_name))
    }

    /// Absolute library directories of the ahead-of-time kernel archive.
    /// Empty entries are ignored.
    pub fn aot_lib_dirs(&self) -> Result<Vec<PathBuf>> {
        let dirs: Vec<&PathBuf> = self
            .aot_lib_dirs
            .iter()
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect();
        if dirs.is_empty() {
            return Ok(vec![self.source_dir()?.join("build").join("lib")]);
        }
        dirs.into_iter()
            .map(|dir| std::path::absolute(dir).map_err(|e| AssemblyError::Io(dir.clone(), e)))
            .collect()
    }
}

fn parse_bool(key: ConfigKey, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(AssemblyError::config(key.env, value, "expected a boolean")),
    }
}
