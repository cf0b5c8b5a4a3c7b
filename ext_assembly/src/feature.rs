/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Feature toggles parsed from configuration strings.

use serde::Serialize;

use crate::error::AssemblyError;
use crate::error::Result;

const ENABLED_VALUES: [&str; 3] = ["on", "1", "true"];
const DISABLED_VALUES: [&str; 3] = ["off", "0", "false"];

/// Whether an optional build feature is turned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFlag {
    Enabled,
    #[default]
    Disabled,
}

impl FeatureFlag {
    /// Parse a toggle permissively. `on`, `1` and `true` (any case) enable
    /// the feature; every other value, including an unset toggle,
    /// disables it. No trimming is applied.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(value)
                if ENABLED_VALUES
                    .iter()
                    .any(|enabled| value.eq_ignore_ascii_case(enabled)) =>
            {
                FeatureFlag::Enabled
            }
            _ => FeatureFlag::Disabled,
        }
    }

    /// Parse a toggle strictly: unset and empty values disable the feature,
    /// `off`/`0`/`false` disable it explicitly, and any other unrecognized
    /// value is rejected.
    pub fn parse_strict(key: &str, value: Option<&str>) -> Result<Self> {
        match value {
            None | Some("") => Ok(FeatureFlag::Disabled),
            Some(value) => match FeatureFlag::parse(Some(value)) {
                FeatureFlag::Enabled => Ok(FeatureFlag::Enabled),
                FeatureFlag::Disabled
                    if DISABLED_VALUES
                        .iter()
                        .any(|disabled| value.eq_ignore_ascii_case(disabled)) =>
                {
                    Ok(FeatureFlag::Disabled)
                }
                FeatureFlag::Disabled => Err(AssemblyError::config(
                    key,
                    value,
                    "expected one of on/1/true or off/0/false",
                )),
            },
        }
    }

    pub fn is_enabled(self) -> bool {
        self == FeatureFlag::Enabled
    }
}
