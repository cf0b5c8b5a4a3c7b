/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod commands;

use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::EnvFilter;

use crate::commands::config::ConfigCommand;
use crate::commands::directives::DirectivesCommand;
use crate::commands::plan::PlanCommand;
use crate::commands::probe::ProbeCommand;
use crate::commands::ConfigArgs;

/// Log filter for the CLI, e.g. `EXT_ASSEMBLE_LOG=ext_assembly=debug`.
const LOG_ENV: &str = "EXT_ASSEMBLE_LOG";

#[derive(Parser)]
#[command(about = "Assemble a GPU-accelerated Python extension module")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = "Assemble the extension and print its build description as JSON")]
    Plan(PlanCommand),

    #[clap(about = "Assemble the extension and print cargo build-script directives")]
    Directives(DirectivesCommand),

    #[clap(about = "Resolve the toolchain only and print it as JSON")]
    Probe(ProbeCommand),

    #[clap(about = "Print the effective configuration")]
    Config(ConfigCommand),
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries the command's output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), anyhow::Error> {
    let args = Cli::parse();
    init_logging();

    let config = args.config.load()?;
    match args.command {
        Command::Plan(command) => command.run(&config),
        Command::Directives(command) => command.run(&config),
        Command::Probe(command) => command.run(&config),
        Command::Config(command) => command.run(&config),
    }
}
