/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Dependency locators.
//!
//! A [`DependencyLocator`] answers one question: where is a given
//! dependency installed? The answer is a raw string, usually a path. The
//! default implementation asks the Python interpreter, which knows where
//! pip or conda put each package; the manifest and environment locators
//! serve hermetic builds where no interpreter is available.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use crate::config::BuildConfig;
use crate::config::LocatorKind;
use crate::error::AssemblyError;
use crate::error::Result;

/// Exit status the interpreter must report for a query to succeed.
pub const QUERY_SUCCESS_CODE: i32 = 0;

/// Something the toolchain resolver needs located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dependency {
    /// The binding-generation library's package-discovery directory.
    BindingLibrary,
    /// The tensor runtime's package-discovery prefix.
    TensorRuntime,
    /// The interpreter's C header directory.
    PythonHeaders,
    /// Filename suffix for extension modules, e.g. `.cpython-312-x86_64-linux-gnu.so`.
    ExtensionSuffix,
}

impl Dependency {
    /// Human-readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Dependency::BindingLibrary => "pybind11",
            Dependency::TensorRuntime => "torch",
            Dependency::PythonHeaders => "python headers",
            Dependency::ExtensionSuffix => "extension suffix",
        }
    }

    /// Key in a dependency manifest.
    pub fn manifest_key(self) -> &'static str {
        match self {
            Dependency::BindingLibrary => "pybind11",
            Dependency::TensorRuntime => "torch",
            Dependency::PythonHeaders => "python_include",
            Dependency::ExtensionSuffix => "ext_suffix",
        }
    }

    /// Environment variable read by the environment locator.
    pub fn env_var(self) -> &'static str {
        match self {
            Dependency::BindingLibrary => "EXT_PYBIND11_DIR",
            Dependency::TensorRuntime => "EXT_TORCH_PREFIX",
            Dependency::PythonHeaders => "EXT_PYTHON_INCLUDE",
            Dependency::ExtensionSuffix => "EXT_PYTHON_EXT_SUFFIX",
        }
    }

    /// Python expression printing the dependency's location.
    pub fn expression(self) -> &'static str {
        match self {
            Dependency::BindingLibrary => "import pybind11; print(pybind11.get_cmake_dir())",
            Dependency::TensorRuntime => "import torch; print(torch.utils.cmake_prefix_path)",
            Dependency::PythonHeaders => "import sysconfig; print(sysconfig.get_path('include'))",
            Dependency::ExtensionSuffix => {
                "import sysconfig; print(sysconfig.get_config_var('EXT_SUFFIX'))"
            }
        }
    }

    /// Whether the located value names a filesystem path.
    pub fn is_path(self) -> bool {
        !matches!(self, Dependency::ExtensionSuffix)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An interpreter expression and the exit status that means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyQuery {
    pub dependency: Dependency,
    pub expression: String,
    pub success_code: i32,
}

impl DependencyQuery {
    pub fn new(dependency: Dependency) -> Self {
        Self {
            dependency,
            expression: dependency.expression().to_string(),
            success_code: QUERY_SUCCESS_CODE,
        }
    }

    fn failure(&self, diagnostic: impl Into<String>) -> AssemblyError {
        AssemblyError::DependencyDiscovery {
            dependency: self.dependency.name().to_string(),
            expression: self.expression.clone(),
            diagnostic: diagnostic.into(),
        }
    }
}

/// Captured result of running one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    /// Exit code, or `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl QueryOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(QUERY_SUCCESS_CODE),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    fn diagnostic(&self) -> String {
        let status = match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let output = [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if output.is_empty() {
            status
        } else {
            format!("{}: {}", status, output)
        }
    }
}

/// Runs an expression through an interpreter.
pub trait QueryRunner {
    fn run(&self, expression: &str) -> io::Result<QueryOutput>;
}

impl<F> QueryRunner for F
where
    F: Fn(&str) -> io::Result<QueryOutput>,
{
    fn run(&self, expression: &str) -> io::Result<QueryOutput> {
        self(expression)
    }
}

/// Runs expressions as `<interpreter> -c <expression>`, blocking until the
/// interpreter exits.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    interpreter: PathBuf,
}

impl ProcessRunner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }
}

impl QueryRunner for ProcessRunner {
    fn run(&self, expression: &str) -> io::Result<QueryOutput> {
        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(expression)
            .output()?;
        Ok(QueryOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locates dependencies.
pub trait DependencyLocator {
    /// Return the raw location of `dependency`, or a
    /// [`AssemblyError::DependencyDiscovery`].
    fn locate(&self, dependency: Dependency) -> Result<String>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Locates dependencies by querying an interpreter.
pub struct InterpreterLocator<R = ProcessRunner> {
    runner: R,
    success_code: i32,
}

impl InterpreterLocator<ProcessRunner> {
    /// Query the interpreter at `interpreter`.
    pub fn with_interpreter(interpreter: impl Into<PathBuf>) -> Self {
        Self::new(ProcessRunner::new(interpreter))
    }
}

impl<F> InterpreterLocator<F>
where
    F: Fn(&str) -> io::Result<QueryOutput>,
{
    /// Answer queries with a closure instead of a process.
    pub fn from_fn(runner: F) -> Self {
        Self::new(runner)
    }
}

impl<R: QueryRunner> InterpreterLocator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            success_code: QUERY_SUCCESS_CODE,
        }
    }

    #[must_use]
    pub fn with_success_code(mut self, success_code: i32) -> Self {
        self.success_code = success_code;
        self
    }

    /// Run `query` and return the last non-empty line it printed.
    ///
    /// Importing a package may print warnings to stdout before the
    /// requested value, so only the final line counts.
    pub fn query(&self, query: &DependencyQuery) -> Result<String> {
        tracing::debug!(dependency = %query.dependency, expression = %query.expression, "running dependency query");
        let output = self
            .runner
            .run(&query.expression)
            .map_err(|e| query.failure(format!("failed to run interpreter: {}", e)))?;

        if output.status != Some(query.success_code) {
            return Err(query.failure(output.diagnostic()));
        }

        match output.stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) {
            Some("None") | None => Err(query.failure(format!(
                "query printed no usable value: {:?}",
                output.stdout.trim()
            ))),
            Some(value) => Ok(value.to_string()),
        }
    }
}

impl<R: QueryRunner> DependencyLocator for InterpreterLocator<R> {
    fn locate(&self, dependency: Dependency) -> Result<String> {
        let mut query = DependencyQuery::new(dependency);
        query.success_code = self.success_code;
        self.query(&query)
    }

    fn describe(&self) -> String {
        "interpreter".to_string()
    }
}

/// Locates dependencies from a JSON object mapping manifest keys to
/// locations. Relative paths are taken relative to the manifest.
#[derive(Debug, Clone)]
pub struct ManifestLocator {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ManifestLocator {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = fs::read_to_string(&path).map_err(|e| AssemblyError::Io(path.clone(), e))?;
        let entries = serde_json::from_str(&contents).map_err(|e| {
            AssemblyError::config(
                crate::config::MANIFEST.env,
                path.display().to_string(),
                format!("not a JSON object of strings: {}", e),
            )
        })?;
        Ok(Self { path, entries })
    }
}

impl DependencyLocator for ManifestLocator {
    fn locate(&self, dependency: Dependency) -> Result<String> {
        let key = dependency.manifest_key();
        let value = self
            .entries
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AssemblyError::DependencyDiscovery {
                dependency: dependency.name().to_string(),
                expression: format!("{} in {}", key, self.path.display()),
                diagnostic: "no entry in manifest".to_string(),
            })?;
        if dependency.is_path() && Path::new(value).is_relative() {
            let base = self.path.parent().unwrap_or(Path::new("."));
            return Ok(base.join(value).to_string_lossy().into_owned());
        }
        Ok(value.clone())
    }

    fn describe(&self) -> String {
        format!("manifest {}", self.path.display())
    }
}

/// Locates dependencies from one environment variable each.
pub struct EnvLocator {
    lookup: Box<dyn Fn(&str) -> Option<String>>,
}

impl EnvLocator {
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl DependencyLocator for EnvLocator {
    fn locate(&self, dependency: Dependency) -> Result<String> {
        let var = dependency.env_var();
        (self.lookup)(var)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AssemblyError::DependencyDiscovery {
                dependency: dependency.name().to_string(),
                expression: format!("${}", var),
                diagnostic: "environment variable is not set".to_string(),
            })
    }

    fn describe(&self) -> String {
        "environment".to_string()
    }
}

/// Build the locator selected by `config`.
pub fn locator_from_config(config: &BuildConfig) -> Result<Box<dyn DependencyLocator>> {
    match config.locator {
        LocatorKind::Interpreter => {
            let python = match &config.python {
                Some(python) => python.clone(),
                None => build_utils::find_python_interpreter(config.env).map_err(|e| {
                    AssemblyError::DependencyDiscovery {
                        dependency: "python".to_string(),
                        expression: String::new(),
                        diagnostic: e.to_string(),
                    }
                })?,
            };
            tracing::info!(python = %python.display(), "using interpreter locator");
            Ok(Box::new(InterpreterLocator::with_interpreter(python)))
        }
        LocatorKind::Manifest => {
            let manifest = config.manifest.as_ref().ok_or_else(|| {
                AssemblyError::config(
                    crate::config::MANIFEST.env,
                    "",
                    "the manifest locator needs a manifest path",
                )
            })?;
            Ok(Box::new(ManifestLocator::load(manifest)?))
        }
        LocatorKind::Env => Ok(Box::new(EnvLocator::with_lookup(config.env))),
    }
}
