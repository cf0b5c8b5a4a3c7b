/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configure-time assembly of a GPU-accelerated Python extension module.
//!
//! Given a project tree and the host's Python environment, this crate
//! decides what goes into the extension: which sources are compiled,
//! which include directories and flags they see, which libraries are
//! linked and which runtime search paths are embedded. It never compiles
//! anything itself; the resulting [`Artifact`] is rendered for a
//! compiler driver by the [`emit`] module.
//!
//! ```no_run
//! let config = ext_assembly::BuildConfig::from_env()?;
//! let artifact = ext_assembly::assemble(&config)?;
//! ext_assembly::emit::emit_cargo_directives(&artifact);
//! # Ok::<(), ext_assembly::AssemblyError>(())
//! ```

pub mod artifact;
pub mod config;
pub mod emit;
pub mod error;
pub mod feature;
pub mod flags;
pub mod linker;
pub mod locator;
pub mod package;
pub mod pipeline;
pub mod rpath;
pub mod sources;
pub mod toolchain;

#[cfg(test)]
mod test_utils;

pub use artifact::Artifact;
pub use artifact::LibraryHandle;
pub use artifact::RuntimePath;
pub use config::BuildConfig;
pub use config::LocatorKind;
pub use error::AssemblyError;
pub use feature::FeatureFlag;
pub use flags::CompilerFlags;
pub use locator::Dependency;
pub use locator::DependencyLocator;
pub use pipeline::assemble;
pub use pipeline::resolve_toolchain;
pub use pipeline::Pipeline;
pub use sources::SourceSet;
pub use toolchain::ResolvedToolchain;
