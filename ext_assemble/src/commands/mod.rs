/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

pub mod config;
pub mod directives;
pub mod plan;
pub mod probe;

use std::path::PathBuf;

use anyhow::Context;
use ext_assembly::config::AOT;
use ext_assembly::BuildConfig;
use ext_assembly::LocatorKind;

/// Overrides applied on top of the environment configuration.
#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Directory holding the native sources (default: current directory)
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Python interpreter used for dependency queries
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Link the ahead-of-time kernel archive ("ON", "1" or "true")
    #[arg(long, global = true)]
    aot: Option<String>,

    /// Dependency locator: interpreter, manifest or env
    #[arg(long, global = true)]
    locator: Option<LocatorKind>,

    /// JSON dependency manifest for the manifest locator
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// CUDA toolkit root (default: CUDA_HOME, CUDA_PATH, nvcc on PATH)
    #[arg(long, global = true)]
    cuda_home: Option<PathBuf>,

    /// Reject unrecognized feature-flag values instead of treating them as off
    #[arg(long, global = true)]
    strict_feature_flags: bool,
}

impl ConfigArgs {
    /// Read the environment configuration and apply the overrides. Nothing
    /// is printed while reading, so stdout carries only command output.
    pub fn load(self) -> anyhow::Result<BuildConfig> {
        let config = BuildConfig::from_process_env().context("reading configuration")?;
        self.apply(config)
    }

    /// Apply the overrides to `config`. Environment values re-read here go
    /// through `config.env`.
    pub fn apply(self, mut config: BuildConfig) -> anyhow::Result<BuildConfig> {
        if let Some(source_dir) = self.source_dir {
            config.source_dir = source_dir;
        }
        if let Some(python) = self.python {
            config.python = Some(python);
        }
        if let Some(locator) = self.locator {
            config.locator = locator;
        }
        if let Some(manifest) = self.manifest {
            config.manifest = Some(manifest);
        }
        if let Some(cuda_home) = self.cuda_home {
            config.cuda_home = Some(cuda_home);
        }
        if self.strict_feature_flags && !config.strict_feature_flags {
            config.strict_feature_flags = true;
            // Re-check the value already read from the environment.
            if self.aot.is_none() {
                let aot = (config.env)(AOT.env);
                config.set_aot(aot.as_deref())?;
            }
        }
        if let Some(aot) = self.aot {
            config.set_aot(Some(&aot))?;
        }
        Ok(config)
    }
}
