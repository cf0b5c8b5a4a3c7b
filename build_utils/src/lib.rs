/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Build utilities shared by the extension assembler.
//!
//! This crate holds the low-level environment probes: locating the Python
//! interpreter used for dependency queries, and locating a CUDA toolkit
//! installation through the conventional environment variables and
//! filesystem layouts.

use std::env;
use std::path::Path;
use std::path::PathBuf;

use glob::glob;
use which::which;

/// Configuration structure for CUDA environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudaConfig {
    pub cuda_home: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
}

/// Error type for build utilities
#[derive(Debug)]
pub enum BuildError {
    CudaNotFound,
    PythonNotFound,
    LibraryNotFound { name: String, searched: Vec<PathBuf> },
    PathNotFound(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::CudaNotFound => write!(f, "CUDA installation not found"),
            BuildError::PythonNotFound => write!(f, "Python interpreter not found"),
            BuildError::LibraryNotFound { name, searched } => {
                write!(f, "library {} not found in {:?}", name, searched)
            }
            BuildError::PathNotFound(path) => write!(f, "Path not found: {}", path),
        }
    }
}

impl std::error::Error for BuildError {}

/// Get environment variable with cargo rerun notification
pub fn get_env_var_with_rerun(name: &str) -> Result<String, std::env::VarError> {
    println!("cargo:rerun-if-env-changed={}", name);
    env::var(name)
}

/// Environment lookup for build scripts: like [`get_env_var_with_rerun`].
pub fn rerun_env(name: &str) -> Option<String> {
    get_env_var_with_rerun(name).ok()
}

/// Environment lookup that prints nothing, for tools whose stdout is
/// consumed by other programs.
pub fn quiet_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Finds the python interpreter used for dependency queries.
///
/// This function checks in order:
/// 1. PYO3_PYTHON, read through `env`
/// 2. `python3` on PATH
/// 3. `python` on PATH
pub fn find_python_interpreter(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf, BuildError> {
    if let Some(python) = env("PYO3_PYTHON").filter(|python| !python.is_empty()) {
        return Ok(PathBuf::from(python));
    }
    which("python3")
        .or_else(|_| which("python"))
        .map_err(|_| BuildError::PythonNotFound)
}

/// Find CUDA home directory using various heuristics
///
/// This function attempts to locate CUDA installation through:
/// 1. CUDA_HOME environment variable
/// 2. CUDA_PATH environment variable
/// 3. Finding nvcc in PATH and deriving cuda home
/// 4. Platform-specific default locations
///
/// Environment variables are read through `env`; pass
/// [`rerun_env`] from a build script.
pub fn find_cuda_home(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    // Guess #1: Environment variables
    let cuda_home = env("CUDA_HOME")
        .filter(|home| !home.is_empty())
        .or_else(|| env("CUDA_PATH").filter(|home| !home.is_empty()));
    if let Some(home) = cuda_home {
        return Some(PathBuf::from(home));
    }

    // Guess #2: nvcc lives in CUDA_HOME/bin
    if let Ok(nvcc_path) = which("nvcc") {
        return nvcc_path
            .parent()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf);
    }

    // Guess #3: Platform-specific defaults
    if cfg!(windows) {
        let pattern = r"C:\Program Files\NVIDIA GPU Computing Toolkit\CUDA\v*.*";
        let mut cuda_homes: Vec<_> = glob(pattern)
            .map(|paths| paths.filter_map(Result::ok).collect())
            .unwrap_or_default();
        cuda_homes.sort();
        cuda_homes.pop()
    } else {
        let cuda_candidate = Path::new("/usr/local/cuda");
        cuda_candidate
            .exists()
            .then(|| cuda_candidate.to_path_buf())
    }
}

/// Discover the include and library directories of the CUDA installation
/// rooted at `cuda_home`.
///
/// Both old-style (`include`, `lib64`) and new-style
/// (`targets/x86_64-linux/...`) layouts are recognized. The installation is
/// rejected when it has no include directory at all. `CUDA_LIB_DIR` is read
/// through `env`.
pub fn discover_cuda_config(
    cuda_home: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CudaConfig, BuildError> {
    if !cuda_home.is_dir() {
        return Err(BuildError::CudaNotFound);
    }

    let mut config = CudaConfig {
        cuda_home: cuda_home.to_path_buf(),
        include_dirs: Vec::new(),
        lib_dirs: Vec::new(),
    };

    for include_subdir in &["include", "targets/x86_64-linux/include"] {
        let include_dir = cuda_home.join(include_subdir);
        if include_dir.is_dir() {
            config.include_dirs.push(include_dir);
        }
    }
    if config.include_dirs.is_empty() {
        return Err(BuildError::PathNotFound(format!(
            "CUDA include directory under {}",
            cuda_home.display()
        )));
    }

    // CUDA_LIB_DIR takes precedence over the layout guesses.
    if let Some(cuda_lib_dir) = env("CUDA_LIB_DIR") {
        let lib_dir = PathBuf::from(cuda_lib_dir);
        if lib_dir.is_dir() {
            config.lib_dirs.push(lib_dir);
        }
    }
    for lib_subdir in &["lib64", "lib", "lib/x64", "targets/x86_64-linux/lib"] {
        let lib_dir = cuda_home.join(lib_subdir);
        if lib_dir.is_dir() && !config.lib_dirs.contains(&lib_dir) {
            config.lib_dirs.push(lib_dir);
        }
    }

    Ok(config)
}

/// Locate a library by its link name in `lib_dirs`.
///
/// Shared objects are preferred over static archives; versioned shared
/// objects (`libfoo.so.12`) are accepted when the unversioned symlink is
/// missing. Returns the first match in directory order.
pub fn find_library(name: &str, lib_dirs: &[PathBuf]) -> Result<PathBuf, BuildError> {
    let candidates = [
        format!("lib{}.so", name),
        format!("lib{}.dylib", name),
        format!("{}.lib", name),
        format!("lib{}.a", name),
        format!("lib{}_static.a", name),
    ];
    for lib_dir in lib_dirs {
        for candidate in &candidates {
            let path = lib_dir.join(candidate);
            if path.is_file() {
                return Ok(path);
            }
        }
        let pattern = format!(
            "{}/lib{}.so.*",
            glob::Pattern::escape(&lib_dir.to_string_lossy()),
            name
        );
        if let Ok(paths) = glob(&pattern) {
            let mut versioned: Vec<_> = paths.filter_map(Result::ok).collect();
            versioned.sort();
            if let Some(path) = versioned.into_iter().next() {
                return Ok(path);
            }
        }
    }
    Err(BuildError::LibraryNotFound {
        name: name.to_string(),
        searched: lib_dirs.to_vec(),
    })
}
