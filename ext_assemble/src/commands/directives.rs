/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use ext_assembly::BuildConfig;

/// Run the whole pipeline and print cargo build-script directives, for
/// build scripts that shell out instead of linking the library.
#[derive(clap::Args, Debug)]
pub struct DirectivesCommand {}

impl DirectivesCommand {
    pub fn run(self, config: &BuildConfig) -> anyhow::Result<()> {
        let artifact = ext_assembly::assemble(config)?;
        for directive in ext_assembly::emit::cargo_directives(&artifact) {
            println!("{}", directive);
        }
        Ok(())
    }
}
