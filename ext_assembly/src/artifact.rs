/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The produced artifact: one loadable extension module and everything a
//! compiler and linker need to build it.

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::BuildConfig;
use crate::error::AssemblyError;
use crate::error::Result;
use crate::flags::CompilerFlags;
use crate::sources::SourceSet;
use crate::toolchain::ResolvedToolchain;

/// How a library handle is passed to the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Shared objects given by path.
    Shared,
    /// Static archives given by path.
    Static,
    /// A library linked by name and resolved through the link directories.
    Named,
}

/// One linked dependency. A handle may stand for several files, e.g. the
/// tensor runtime is `libtorch` plus `libc10` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryHandle {
    pub name: String,
    pub kind: LinkKind,
    pub files: Vec<PathBuf>,
}

impl LibraryHandle {
    pub fn from_files(name: impl Into<String>, files: Vec<PathBuf>) -> Self {
        let is_static = files
            .first()
            .and_then(|file| file.extension())
            .is_some_and(|ext| ext == "a" || ext == "lib");
        Self {
            name: name.into(),
            kind: if is_static {
                LinkKind::Static
            } else {
                LinkKind::Shared
            },
            files,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LinkKind::Named,
            files: Vec::new(),
        }
    }
}

/// Which source collection a compilation unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Native,
    Binding,
    Kernel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationUnit {
    pub path: PathBuf,
    pub kind: UnitKind,
}

/// One include-directory registration: the tensor runtime's include
/// directories followed by a companion directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeRule {
    pub dirs: Vec<PathBuf>,
}

/// Load-time library search path embedded in the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimePath {
    /// Entries relative to the artifact, e.g. `$ORIGIN`.
    pub relative: Vec<String>,
    pub absolute: Vec<PathBuf>,
}

impl RuntimePath {
    /// All entries, relative first.
    pub fn entries(&self) -> Vec<String> {
        self.relative
            .iter()
            .cloned()
            .chain(
                self.absolute
                    .iter()
                    .map(|dir| dir.to_string_lossy().into_owned()),
            )
            .collect()
    }

    /// Linker arguments embedding every entry.
    pub fn linker_args(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|entry| format!("-Wl,-rpath,{}", entry))
            .collect()
    }
}

/// The extension module being assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    name: String,
    filename: String,
    units: Vec<CompilationUnit>,
    include_rules: Vec<IncludeRule>,
    interface_includes: Vec<PathBuf>,
    compile_flags: CompilerFlags,
    libraries: Vec<LibraryHandle>,
    link_dirs: Vec<PathBuf>,
    runtime_path: Option<RuntimePath>,
}

impl Artifact {
    /// Declare the extension module from a resolved toolchain and a
    /// discovered source set.
    ///
    /// Compilation units are the native, binding and kernel sources in that
    /// order. The tensor runtime's include directories are registered three
    /// times, paired with the source directory, its parent, and the
    /// bindings directory. The module links the tensor runtime, its Python
    /// binding library and the CUDA runtime.
    pub fn assemble(
        config: &BuildConfig,
        toolchain: &ResolvedToolchain,
        sources: &SourceSet,
    ) -> Result<Self> {
        if sources.native.is_empty() {
            return Err(AssemblyError::ArtifactAssembly(format!(
                "no native sources matching *.{} in {}",
                config.source_extension,
                config.source_dir.display()
            )));
        }

        let units = sources
            .native
            .iter()
            .map(|path| (path, UnitKind::Native))
            .chain(sources.bindings.iter().map(|path| (path, UnitKind::Binding)))
            .chain(sources.kernels.iter().map(|path| (path, UnitKind::Kernel)))
            .map(|(path, kind)| CompilationUnit {
                path: path.clone(),
                kind,
            })
            .collect();

        let mut artifact = Artifact {
            name: config.module_name.clone(),
            filename: format!("{}{}", config.module_name, toolchain.binding.extension_suffix),
            units,
            include_rules: Vec::new(),
            interface_includes: toolchain.binding.include_dirs.clone(),
            // Merged here rather than into any shared flag state.
            compile_flags: config
                .cxx_flags
                .merged(&toolchain.tensor.cxx_flags)
                .merged(&toolchain.binding.module_flags),
            libraries: Vec::new(),
            link_dirs: Vec::new(),
            runtime_path: None,
        };

        for companion in [
            config.source_dir()?,
            config.parent_dir()?,
            config.bindings_dir()?,
        ] {
            artifact.add_include_rule(&toolchain.tensor.include_dirs, companion);
        }

        artifact.link(toolchain.tensor.library.clone());
        artifact.link(toolchain.tensor.binding_library.clone());
        artifact.link(toolchain.cuda.runtime.clone());

        tracing::info!(
            artifact = %artifact.filename,
            units = artifact.units.len(),
            libraries = artifact.libraries.len(),
            "assembled artifact"
        );
        Ok(artifact)
    }

    fn add_include_rule(&mut self, tensor_includes: &[PathBuf], companion: PathBuf) {
        let mut dirs = tensor_includes.to_vec();
        dirs.push(companion);
        self.include_rules.push(IncludeRule { dirs });
    }

    pub(crate) fn link(&mut self, library: LibraryHandle) {
        tracing::debug!(library = %library.name, "linking library");
        self.libraries.push(library);
    }

    pub(crate) fn set_link_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.link_dirs = dirs;
    }

    pub(crate) fn add_link_dir(&mut self, dir: &Path) {
        if !self.link_dirs.iter().any(|existing| existing == dir) {
            self.link_dirs.push(dir.to_path_buf());
        }
    }

    pub(crate) fn set_runtime_path(&mut self, runtime_path: RuntimePath) {
        self.runtime_path = Some(runtime_path);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output filename, including the interpreter's extension suffix.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn units_of(&self, kind: UnitKind) -> impl Iterator<Item = &Path> {
        self.units
            .iter()
            .filter(move |unit| unit.kind == kind)
            .map(|unit| unit.path.as_path())
    }

    pub fn include_rules(&self) -> &[IncludeRule] {
        &self.include_rules
    }

    /// Include directories contributed by the binding library.
    pub fn interface_includes(&self) -> &[PathBuf] {
        &self.interface_includes
    }

    /// Every include directory once, in first-registration order:
    /// the registered rules, then the interface includes.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in self
            .include_rules
            .iter()
            .flat_map(|rule| rule.dirs.iter())
            .chain(self.interface_includes.iter())
        {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    pub fn compile_flags(&self) -> &CompilerFlags {
        &self.compile_flags
    }

    pub fn libraries(&self) -> &[LibraryHandle] {
        &self.libraries
    }

    pub fn link_dirs(&self) -> &[PathBuf] {
        &self.link_dirs
    }

    pub fn runtime_path(&self) -> Option<&RuntimePath> {
        self.runtime_path.as_ref()
    }
}
