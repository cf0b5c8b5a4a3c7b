/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Toolchain resolution.
//!
//! pybind11 and torch are Python packages, so their locations come from
//! the [`DependencyLocator`]; each located directory becomes a search hint
//! for native package discovery. CUDA is a system toolkit and is found
//! through the usual environment variables and install locations only.

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::artifact::LibraryHandle;
use crate::config::EnvLookup;
use crate::error::AssemblyError;
use crate::error::Result;
use crate::flags::CompilerFlags;
use crate::locator::Dependency;
use crate::locator::DependencyLocator;
use crate::package::PackageFinder;
use crate::package::SearchHints;
use crate::package::PYBIND11;
use crate::package::TORCH;

/// Extension suffix used when the locator cannot report one.
pub const DEFAULT_EXTENSION_SUFFIX: &str = ".so";

/// Flags every binding module is compiled with.
const BINDING_MODULE_FLAGS: &[&str] = &["-fvisibility=hidden"];

/// The binding-generation library and the interpreter it binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingLibrary {
    /// Directory reported by the locator.
    pub dir: PathBuf,
    pub prefix: PathBuf,
    /// The library's own headers followed by the interpreter's.
    pub include_dirs: Vec<PathBuf>,
    pub module_flags: CompilerFlags,
    pub extension_suffix: String,
}

/// The tensor runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorRuntime {
    /// Directory reported by the locator.
    pub dir: PathBuf,
    pub prefix: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub library: LibraryHandle,
    /// The runtime's Python binding library (`torch_python`).
    pub binding_library: LibraryHandle,
    pub cxx_flags: CompilerFlags,
}

/// The GPU compute toolkit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CudaToolkit {
    pub home: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub runtime: LibraryHandle,
}

/// Everything the artifact needs from its environment. Only ever
/// constructed fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedToolchain {
    pub binding: BindingLibrary,
    pub tensor: TensorRuntime,
    pub cuda: CudaToolkit,
    pub search_hints: SearchHints,
}

/// Resolves the toolchain for one assembly pass.
pub struct ToolchainResolver<'a> {
    locator: &'a dyn DependencyLocator,
    finder: &'a dyn PackageFinder,
    cuda_home: Option<PathBuf>,
    env: EnvLookup,
}

impl<'a> ToolchainResolver<'a> {
    pub fn new(locator: &'a dyn DependencyLocator, finder: &'a dyn PackageFinder) -> Self {
        Self {
            locator,
            finder,
            cuda_home: None,
            env: build_utils::quiet_env,
        }
    }

    /// Read CUDA environment variables through `env`.
    #[must_use]
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Use `cuda_home` instead of searching for the toolkit.
    #[must_use]
    pub fn with_cuda_home(mut self, cuda_home: Option<PathBuf>) -> Self {
        self.cuda_home = cuda_home;
        self
    }

    /// Resolve pybind11, torch and CUDA, in that order. The first failure
    /// aborts resolution.
    #[tracing::instrument(skip_all, fields(locator = %self.locator.describe()))]
    pub fn resolve(&self) -> Result<ResolvedToolchain> {
        let mut hints = SearchHints::new();
        let binding = self.resolve_binding_library(&mut hints)?;
        let tensor = self.resolve_tensor_runtime(&mut hints)?;
        let cuda = self.resolve_cuda()?;
        Ok(ResolvedToolchain {
            binding,
            tensor,
            cuda,
            search_hints: hints,
        })
    }

    fn locate_dir(&self, dependency: Dependency) -> Result<PathBuf> {
        let dir = PathBuf::from(self.locator.locate(dependency)?);
        tracing::info!(dependency = %dependency, dir = %dir.display(), "located dependency");
        Ok(dir)
    }

    fn resolve_binding_library(&self, hints: &mut SearchHints) -> Result<BindingLibrary> {
        let dir = self.locate_dir(Dependency::BindingLibrary)?;
        hints.register(&dir);
        let package = self.finder.find(&PYBIND11, hints)?;

        let python_include = self.locate_dir(Dependency::PythonHeaders)?;
        if !python_include.is_dir() {
            return Err(AssemblyError::toolchain_missing(
                Dependency::PythonHeaders.name(),
                format!("{} is not a directory", python_include.display()),
            ));
        }

        let extension_suffix = match self.locator.locate(Dependency::ExtensionSuffix) {
            Ok(suffix) => suffix,
            Err(e) => {
                tracing::warn!(
                    "{}; using {} for the module filename",
                    e,
                    DEFAULT_EXTENSION_SUFFIX
                );
                DEFAULT_EXTENSION_SUFFIX.to_string()
            }
        };

        let mut include_dirs = package.include_dirs;
        include_dirs.push(python_include);

        Ok(BindingLibrary {
            dir,
            prefix: package.prefix,
            include_dirs,
            module_flags: BINDING_MODULE_FLAGS.iter().copied().collect(),
            extension_suffix,
        })
    }

    fn resolve_tensor_runtime(&self, hints: &mut SearchHints) -> Result<TensorRuntime> {
        let dir = self.locate_dir(Dependency::TensorRuntime)?;
        hints.register(&dir);
        let package = self.finder.find(&TORCH, hints)?;

        let torch_python = build_utils::find_library("torch_python", &package.lib_dirs)
            .map_err(|e| AssemblyError::toolchain_missing("torch_python", e))?;

        if !package.cxx_flags.is_empty() {
            tracing::info!(flags = %package.cxx_flags, "tensor runtime requires extra compiler flags");
        }

        Ok(TensorRuntime {
            dir,
            prefix: package.prefix,
            include_dirs: package.include_dirs,
            lib_dirs: package.lib_dirs,
            library: LibraryHandle::from_files("torch", package.libraries),
            binding_library: LibraryHandle::from_files("torch_python", vec![torch_python]),
            cxx_flags: package.cxx_flags,
        })
    }

    fn resolve_cuda(&self) -> Result<CudaToolkit> {
        let home = self
            .cuda_home
            .clone()
            .or_else(|| build_utils::find_cuda_home(self.env))
            .ok_or_else(|| {
                AssemblyError::toolchain_missing(
                    "CUDA toolkit",
                    "set CUDA_HOME or CUDA_PATH, or put nvcc on PATH",
                )
            })?;
        let config = build_utils::discover_cuda_config(&home, self.env)
            .map_err(|e| AssemblyError::toolchain_missing("CUDA toolkit", cuda_detail(&home, e)))?;
        let cudart = build_utils::find_library("cudart", &config.lib_dirs)
            .map_err(|e| AssemblyError::toolchain_missing("CUDA toolkit", e))?;

        tracing::info!(cuda_home = %home.display(), cudart = %cudart.display(), "resolved CUDA toolkit");
        Ok(CudaToolkit {
            home: config.cuda_home,
            include_dirs: config.include_dirs,
            lib_dirs: config.lib_dirs,
            runtime: LibraryHandle::from_files("cudart", vec![cudart]),
        })
    }
}

fn cuda_detail(home: &Path, error: build_utils::BuildError) -> String {
    format!("{} (CUDA_HOME={})", error, home.display())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::io;

    use super::*;
    use crate::locator::InterpreterLocator;
    use crate::locator::QueryOutput;
    use crate::package::ConfigFileFinder;
    use crate::test_utils::FakeInstall;

    #[test]
    fn test_resolve_fake_install() {
        let install = FakeInstall::new();
        let toolchain = install.toolchain();

        assert_eq!(toolchain.binding.dir, install.pybind11_cmake_dir());
        assert_eq!(
            toolchain.binding.include_dirs,
            vec![install.pybind11_dir().join("include"), install.python_include()]
        );
        assert_eq!(
            toolchain.binding.extension_suffix,
            ".cpython-312-x86_64-linux-gnu.so"
        );

        assert_eq!(toolchain.tensor.prefix, install.torch_dir());
        assert_eq!(toolchain.tensor.library.files.len(), 3);
        assert_eq!(
            toolchain.tensor.binding_library.files,
            vec![install.torch_dir().join("lib/libtorch_python.so")]
        );
        assert!(toolchain.tensor.cxx_flags.contains("-D_GLIBCXX_USE_CXX11_ABI=1"));

        assert_eq!(toolchain.cuda.home, install.cuda_home());
        assert_eq!(
            toolchain.cuda.runtime.files,
            vec![install.cuda_home().join("lib64/libcudart.so")]
        );
        assert_eq!(
            toolchain.search_hints.dirs(),
            &[install.pybind11_cmake_dir(), install.torch_cmake_prefix()]
        );
    }

    #[test]
    fn test_binding_query_failure_stops_resolution() {
        let install = FakeInstall::new();
        let asked = RefCell::new(Vec::new());
        let locator = InterpreterLocator::from_fn(|expression| {
            asked.borrow_mut().push(expression.to_string());
            Ok::<_, io::Error>(QueryOutput::failure(
                1,
                "ModuleNotFoundError: No module named 'pybind11'",
            ))
        });
        let err = ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(install.cuda_home()))
            .resolve()
            .unwrap_err();
        match err {
            AssemblyError::DependencyDiscovery { dependency, .. } => {
                assert_eq!(dependency, "pybind11")
            }
            other => panic!("unexpected error {:?}", other),
        }
        // Nothing after the failed lookup ran.
        assert_eq!(asked.borrow().len(), 1);
    }

    #[test]
    fn test_tensor_query_failure_names_torch() {
        let install = FakeInstall::new();
        let locator = install.locator_failing(Dependency::TensorRuntime);
        let err = ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(install.cuda_home()))
            .resolve()
            .unwrap_err();
        assert!(
            matches!(err, AssemblyError::DependencyDiscovery { ref dependency, .. } if dependency == "torch")
        );
    }

    #[test]
    fn test_missing_extension_suffix_falls_back() {
        let install = FakeInstall::new();
        let locator = install.locator_failing(Dependency::ExtensionSuffix);
        let toolchain = ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(install.cuda_home()))
            .resolve()
            .unwrap();
        assert_eq!(toolchain.binding.extension_suffix, DEFAULT_EXTENSION_SUFFIX);
    }

    #[test]
    fn test_missing_torch_python() {
        let install = FakeInstall::new();
        fs::remove_file(install.torch_dir().join("lib/libtorch_python.so")).unwrap();
        let locator = install.locator();
        let err = ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(install.cuda_home()))
            .resolve()
            .unwrap_err();
        assert!(
            matches!(err, AssemblyError::ToolchainMissing { ref toolkit, .. } if toolkit == "torch_python")
        );
    }

    #[test]
    fn test_missing_cuda() {
        let install = FakeInstall::new();
        let locator = install.locator();
        let err = ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(install.root().join("no-cuda-here")))
            .resolve()
            .unwrap_err();
        assert!(
            matches!(err, AssemblyError::ToolchainMissing { ref toolkit, .. } if toolkit == "CUDA toolkit")
        );

        fs::remove_file(install.cuda_home().join("lib64/libcudart.so")).unwrap();
        let err = ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(install.cuda_home()))
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("cudart"), "{}", err);
    }
}
