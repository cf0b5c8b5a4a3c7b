/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The assembly pipeline: resolve the toolchain, discover sources,
//! assemble the artifact, optionally link the kernel archive and embed
//! runtime paths. Runs once per configuration, start to finish, and either
//! returns a complete artifact or nothing.

use crate::artifact::Artifact;
use crate::config::BuildConfig;
use crate::error::Result;
use crate::linker::link_aot_archive;
use crate::linker::AotKernelArchive;
use crate::locator::locator_from_config;
use crate::locator::DependencyLocator;
use crate::package::ConfigFileFinder;
use crate::package::PackageFinder;
use crate::rpath::embed_runtime_path;
use crate::sources::SourceSet;
use crate::toolchain::ResolvedToolchain;
use crate::toolchain::ToolchainResolver;

pub struct Pipeline<'a> {
    config: &'a BuildConfig,
    locator: &'a dyn DependencyLocator,
    finder: &'a dyn PackageFinder,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a BuildConfig,
        locator: &'a dyn DependencyLocator,
        finder: &'a dyn PackageFinder,
    ) -> Self {
        Self {
            config,
            locator,
            finder,
        }
    }

    pub fn resolve_toolchain(&self) -> Result<ResolvedToolchain> {
        ToolchainResolver::new(self.locator, self.finder)
            .with_cuda_home(self.config.cuda_home.clone())
            .with_env(self.config.env)
            .resolve()
    }

    #[tracing::instrument(skip_all, fields(module = %self.config.module_name))]
    pub fn run(&self) -> Result<Artifact> {
        let toolchain = self.resolve_toolchain()?;
        let sources = SourceSet::discover(self.config)?;

        let mut artifact = Artifact::assemble(self.config, &toolchain, &sources)?;
        // The archive's configuration is only read when it is linked.
        if self.config.aot.is_enabled() {
            let archive = AotKernelArchive::from_config(self.config)?;
            if link_aot_archive(&mut artifact, self.config.aot, &archive) {
                embed_runtime_path(&mut artifact)?;
            }
        }
        Ok(artifact)
    }
}

/// Assemble the artifact described by `config` with the configured
/// locator and the default package finder.
pub fn assemble(config: &BuildConfig) -> Result<Artifact> {
    let locator = locator_from_config(config)?;
    Pipeline::new(config, locator.as_ref(), &ConfigFileFinder).run()
}

/// Resolve only the toolchain described by `config`.
pub fn resolve_toolchain(config: &BuildConfig) -> Result<ResolvedToolchain> {
    let locator = locator_from_config(config)?;
    Pipeline::new(config, locator.as_ref(), &ConfigFileFinder).resolve_toolchain()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::artifact::UnitKind;
    use crate::config::LocatorKind;
    use crate::error::AssemblyError;
    use crate::feature::FeatureFlag;
    use crate::locator::Dependency;
    use crate::rpath::ORIGIN_TOKEN;
    use crate::test_utils::FakeInstall;

    #[test]
    fn test_scenario_full_build_with_aot() {
        let install = FakeInstall::new();
        install.add_native(&["gemm.cc", "allgather.cc", "utils.cc"]);
        install.add_bindings(&["module.cc", "ops.cc"]);
        install.add_kernel();
        let mut config = install.config();
        config.set_aot(Some("ON")).unwrap();

        let locator = install.locator();
        let artifact = Pipeline::new(&config, &locator, &ConfigFileFinder)
            .run()
            .unwrap();

        let units: Vec<_> = artifact.units().iter().map(|u| u.path.clone()).collect();
        assert_eq!(
            units,
            vec![
                install.csrc().join("allgather.cc"),
                install.csrc().join("gemm.cc"),
                install.csrc().join("utils.cc"),
                install.project_dir().join("pybind/module.cc"),
                install.project_dir().join("pybind/ops.cc"),
                install.csrc().join("kernel.cu"),
            ]
        );
        assert_eq!(artifact.libraries().len(), 4);
        let runtime_path = artifact.runtime_path().unwrap();
        assert_eq!(runtime_path.relative, vec![ORIGIN_TOKEN.to_string()]);
        assert!(!runtime_path.absolute.is_empty());
        assert!(runtime_path.absolute.iter().all(|dir| dir.is_absolute()));
    }

    #[test]
    fn test_scenario_minimal_build() {
        let install = FakeInstall::new();
        install.add_native(&["only.cc"]);
        let config = install.config();
        assert_eq!(config.aot, FeatureFlag::Disabled);

        let locator = install.locator();
        let artifact = Pipeline::new(&config, &locator, &ConfigFileFinder)
            .run()
            .unwrap();
        assert_eq!(artifact.units().len(), 1);
        assert_eq!(artifact.units()[0].kind, UnitKind::Native);
        assert_eq!(artifact.libraries().len(), 3);
        assert!(artifact.runtime_path().is_none());
        assert!(artifact.link_dirs().is_empty());
    }

    #[test]
    fn test_scenario_empty_native_dir() {
        let install = FakeInstall::new();
        install.add_bindings(&["module.cc"]);
        install.add_kernel();
        let mut config = install.config();
        config.set_aot(Some("true")).unwrap();

        let locator = install.locator();
        let result = Pipeline::new(&config, &locator, &ConfigFileFinder).run();
        assert!(matches!(result, Err(AssemblyError::ArtifactAssembly(_))));
    }

    #[test]
    fn test_binding_query_failure_aborts_before_assembly() {
        let install = FakeInstall::new();
        install.add_native(&["a.cc"]);
        let config = install.config();
        let locator = install.locator_failing(Dependency::BindingLibrary);
        let result = Pipeline::new(&config, &locator, &ConfigFileFinder).run();
        assert!(matches!(
            result,
            Err(AssemblyError::DependencyDiscovery { ref dependency, .. }) if dependency == "pybind11"
        ));
    }

    #[test]
    fn test_unrecognized_flag_skips_archive() {
        for value in ["off", "On ", "TRUE2", ""] {
            let install = FakeInstall::new();
            install.add_native(&["a.cc"]);
            let mut config = install.config();
            config.set_aot(Some(value)).unwrap();
            let locator = install.locator();
            let artifact = Pipeline::new(&config, &locator, &ConfigFileFinder)
                .run()
                .unwrap();
            assert_eq!(artifact.libraries().len(), 3, "{value:?}");
            assert!(artifact.runtime_path().is_none(), "{value:?}");
        }
    }

    #[test]
    fn test_disabled_archive_ignores_its_lib_dirs() {
        let install = FakeInstall::new();
        install.add_native(&["a.cc"]);
        let mut config = install.config();
        config.aot_lib_dirs = vec![install.aot_lib_dir(), PathBuf::new()];
        assert_eq!(config.aot, FeatureFlag::Disabled);

        let locator = install.locator();
        let artifact = Pipeline::new(&config, &locator, &ConfigFileFinder)
            .run()
            .unwrap();
        assert_eq!(artifact.libraries().len(), 3);
        assert!(artifact.link_dirs().is_empty());
        assert!(artifact.runtime_path().is_none());

        config.set_aot(Some("1")).unwrap();
        let artifact = Pipeline::new(&config, &locator, &ConfigFileFinder)
            .run()
            .unwrap();
        assert_eq!(artifact.link_dirs(), &[install.aot_lib_dir()]);
    }

    #[test]
    fn test_env_locator_reads_through_config_lookup() {
        let install = FakeInstall::new();
        install.add_native(&["a.cc"]);
        let mut config = install.config();
        config.locator = LocatorKind::Env;
        // No dependency variables are visible through this lookup.
        config.env = |_| None;
        assert!(matches!(
            assemble(&config),
            Err(AssemblyError::DependencyDiscovery { ref dependency, .. }) if dependency == "pybind11"
        ));
    }

    #[test]
    fn test_manifest_locator_end_to_end() {
        let install = FakeInstall::new();
        install.add_native(&["a.cc"]);
        let manifest = install.root().join("deps.json");
        fs::write(&manifest, install.manifest_json()).unwrap();

        let mut config = install.config();
        config.locator = LocatorKind::Manifest;
        config.manifest = Some(manifest);
        let artifact = assemble(&config).unwrap();
        assert_eq!(artifact.filename(), "triton_distributed.abi3.so");
        assert_eq!(artifact.libraries().len(), 3);
    }

    #[test]
    fn test_manifest_locator_requires_path() {
        let install = FakeInstall::new();
        let mut config = install.config();
        config.locator = LocatorKind::Manifest;
        assert!(matches!(
            resolve_toolchain(&config),
            Err(AssemblyError::Config { .. })
        ));
    }
}
