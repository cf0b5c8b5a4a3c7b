/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use ext_assembly::BuildConfig;

/// Resolve pybind11, torch and CUDA without looking at any sources.
#[derive(clap::Args, Debug)]
pub struct ProbeCommand {}

impl ProbeCommand {
    pub fn run(self, config: &BuildConfig) -> anyhow::Result<()> {
        let toolchain = ext_assembly::resolve_toolchain(config)?;
        println!("{}", serde_json::to_string_pretty(&toolchain)?);
        Ok(())
    }
}
