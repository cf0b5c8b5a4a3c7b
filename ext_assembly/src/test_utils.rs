/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A fake Python environment, CUDA toolkit and project tree on disk.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::BuildConfig;
use crate::locator::Dependency;
use crate::locator::DependencyLocator;
use crate::locator::InterpreterLocator;
use crate::locator::QueryOutput;
use crate::package::ConfigFileFinder;
use crate::toolchain::ResolvedToolchain;
use crate::toolchain::ToolchainResolver;

pub const EXTENSION_SUFFIX: &str = ".cpython-312-x86_64-linux-gnu.so";

const ALL_DEPENDENCIES: [Dependency; 4] = [
    Dependency::BindingLibrary,
    Dependency::TensorRuntime,
    Dependency::PythonHeaders,
    Dependency::ExtensionSuffix,
];

pub struct FakeInstall {
    dir: TempDir,
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

impl FakeInstall {
    pub fn new() -> Self {
        let install = Self {
            dir: tempfile::tempdir().unwrap(),
        };

        touch(&install.pybind11_cmake_dir().join("pybind11Config.cmake"));
        fs::create_dir_all(install.pybind11_dir().join("include/pybind11")).unwrap();

        let torch = install.torch_dir();
        fs::create_dir_all(torch.join("share/cmake/Torch")).unwrap();
        fs::write(
            torch.join("share/cmake/Torch/TorchConfig.cmake"),
            "set(TORCH_CXX_FLAGS \"-D_GLIBCXX_USE_CXX11_ABI=1\")\n",
        )
        .unwrap();
        fs::create_dir_all(torch.join("include/torch/csrc/api/include")).unwrap();
        for lib in ["libtorch.so", "libc10.so", "libtorch_cuda.so", "libtorch_python.so"] {
            touch(&torch.join("lib").join(lib));
        }

        fs::create_dir_all(install.python_include()).unwrap();
        fs::create_dir_all(install.cuda_home().join("include")).unwrap();
        touch(&install.cuda_home().join("lib64/libcudart.so"));
        touch(&install.aot_lib_dir().join("libtriton_distributed_kernel.a"));
        fs::create_dir_all(install.csrc()).unwrap();

        install
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root().join("project")
    }

    pub fn csrc(&self) -> PathBuf {
        self.project_dir().join("csrc")
    }

    pub fn add_native(&self, names: &[&str]) {
        for name in names {
            touch(&self.csrc().join(name));
        }
    }

    pub fn add_bindings(&self, names: &[&str]) {
        for name in names {
            touch(&self.project_dir().join("pybind").join(name));
        }
    }

    pub fn add_kernel(&self) {
        touch(&self.csrc().join("kernel.cu"));
    }

    pub fn pybind11_dir(&self) -> PathBuf {
        self.root().join("site/pybind11")
    }

    pub fn pybind11_cmake_dir(&self) -> PathBuf {
        self.pybind11_dir().join("share/cmake/pybind11")
    }

    pub fn torch_dir(&self) -> PathBuf {
        self.root().join("site/torch")
    }

    pub fn torch_cmake_prefix(&self) -> PathBuf {
        self.torch_dir().join("share/cmake")
    }

    pub fn python_include(&self) -> PathBuf {
        self.root().join("python/include/python3.12")
    }

    pub fn cuda_home(&self) -> PathBuf {
        self.root().join("cuda")
    }

    pub fn aot_lib_dir(&self) -> PathBuf {
        self.root().join("aot/lib")
    }

    pub fn config(&self) -> BuildConfig {
        let mut config = BuildConfig::new(self.csrc());
        config.cuda_home = Some(self.cuda_home());
        config.aot_lib_dirs = vec![self.aot_lib_dir()];
        config
    }

    fn answer(&self, dependency: Dependency) -> String {
        match dependency {
            Dependency::BindingLibrary => self.pybind11_cmake_dir().display().to_string(),
            Dependency::TensorRuntime => self.torch_cmake_prefix().display().to_string(),
            Dependency::PythonHeaders => self.python_include().display().to_string(),
            Dependency::ExtensionSuffix => EXTENSION_SUFFIX.to_string(),
        }
    }

    fn interpreter(&self, failing: Option<Dependency>) -> impl DependencyLocator + 'static {
        let answers: Vec<(&'static str, Option<String>)> = ALL_DEPENDENCIES
            .iter()
            .map(|&dependency| {
                let answer = (Some(dependency) != failing).then(|| self.answer(dependency));
                (dependency.expression(), answer)
            })
            .collect();
        InterpreterLocator::from_fn(move |expression| {
            match answers.iter().find(|(known, _)| *known == expression) {
                Some((_, Some(answer))) => Ok::<_, io::Error>(QueryOutput::success(format!(
                    "{}\n",
                    answer
                ))),
                Some((_, None)) => Ok(QueryOutput::failure(1, "ModuleNotFoundError")),
                None => Ok(QueryOutput::failure(1, format!("unknown query {}", expression))),
            }
        })
    }

    /// An interpreter locator answering every query from this install.
    pub fn locator(&self) -> impl DependencyLocator + 'static {
        self.interpreter(None)
    }

    /// Like [`FakeInstall::locator`], but the query for `dependency` exits
    /// with status 1.
    pub fn locator_failing(&self, dependency: Dependency) -> impl DependencyLocator + 'static {
        self.interpreter(Some(dependency))
    }

    pub fn toolchain(&self) -> ResolvedToolchain {
        let locator = self.locator();
        ToolchainResolver::new(&locator, &ConfigFileFinder)
            .with_cuda_home(Some(self.cuda_home()))
            .resolve()
            .unwrap()
    }

    /// A dependency manifest for this install, with relative paths.
    pub fn manifest_json(&self) -> String {
        serde_json::json!({
            "pybind11": "site/pybind11/share/cmake/pybind11",
            "torch": "site/torch/share/cmake",
            "python_include": self.python_include(),
            "ext_suffix": ".abi3.so",
        })
        .to_string()
    }
}
