/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use ext_assembly::BuildConfig;

/// Run the whole pipeline and print the artifact as JSON.
#[derive(clap::Args, Debug)]
pub struct PlanCommand {
    /// Print on one line instead of pretty-printing
    #[arg(long)]
    compact: bool,
}

impl PlanCommand {
    pub fn run(self, config: &BuildConfig) -> anyhow::Result<()> {
        let artifact = ext_assembly::assemble(config)?;
        let json = if self.compact {
            serde_json::to_string(&artifact)?
        } else {
            ext_assembly::emit::to_json(&artifact)?
        };
        println!("{}", json);
        Ok(())
    }
}
