// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session authorization profiles.

use serde::{Deserialize, Serialize};

/// Authorization level of a registered session.
///
/// Ordered: VIEWER < OPERATOR < MAINTAINER. An operation's minimum
/// profile is satisfied by any session at or above that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityProfile {
    Viewer,
    Operator,
    Maintainer,
}

crate::simple_display! {
    CapabilityProfile {
        Viewer => "viewer",
        Operator => "operator",
        Maintainer => "maintainer",
    }
}

crate::parse_variants! {
    CapabilityProfile {
        "viewer" => Viewer,
        "operator" => Operator,
        "maintainer" => Maintainer,
    }
}

impl CapabilityProfile {
    /// True when this profile satisfies the given minimum.
    pub fn satisfies(self, minimum: CapabilityProfile) -> bool {
        self >= minimum
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
