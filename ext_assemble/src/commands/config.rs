/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use ext_assembly::config::ALL_KEYS;
use ext_assembly::BuildConfig;

/// Print the effective configuration.
#[derive(clap::Args, Debug)]
pub struct ConfigCommand {
    /// List the environment variables that are read, instead
    #[arg(long)]
    keys: bool,
}

impl ConfigCommand {
    pub fn run(self, config: &BuildConfig) -> anyhow::Result<()> {
        if self.keys {
            for key in ALL_KEYS {
                println!("{:<24} {}", key.env, key.name);
            }
            return Ok(());
        }
        println!("{}", serde_json::to_string_pretty(config)?);
        Ok(())
    }
}
