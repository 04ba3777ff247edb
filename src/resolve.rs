// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use chrono::Duration;

use crate::item::Item;

/// Tolerance within which two modification timestamps count as simultaneous,
/// absorbing clock skew and vendor timestamp truncation.
const TIE_TOLERANCE_SECS: i64 = 10 * 60;

/// Which side of a conflicting pair is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The first item wins; the second is overwritten.
    First,
    /// The second item wins; the first is overwritten.
    Second,
}

/// Policy deciding which side wins when the same logical item changed on both
/// sides since the last run.
///
/// Strategies are stateless; the engine receives one as an explicit
/// configuration parameter rather than looking it up from a global registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Always prefer the first side, ignoring timestamps.
    #[default]
    AlwaysFirst,

    /// Always prefer the second side, ignoring timestamps.
    AlwaysSecond,

    /// Prefer the side modified most recently.
    MostRecentWins,

    /// Prefer the side modified least recently.
    LeastRecentWins,
}

impl ResolutionStrategy {
    /// Decides the winner between two items believed to correspond.
    ///
    /// The timestamp-based strategies read each item's modification timestamp
    /// under the given key. Two timestamps within the tolerance window, or a
    /// missing or unparsable timestamp on either side, fall back to
    /// [`Winner::First`] as an explicit tie-break.
    #[must_use]
    pub fn resolve(
        self,
        first: &Item,
        first_modified_key: &str,
        second: &Item,
        second_modified_key: &str,
    ) -> Winner {
        match self {
            Self::AlwaysFirst => Winner::First,
            Self::AlwaysSecond => Winner::Second,
            Self::MostRecentWins | Self::LeastRecentWins => {
                let (Some(t1), Some(t2)) = (
                    first.timestamp(first_modified_key),
                    second.timestamp(second_modified_key),
                ) else {
                    tracing::warn!(
                        strategy = %self,
                        "missing modification timestamp, falling back to first side"
                    );
                    return Winner::First;
                };

                let delta = t1.signed_duration_since(t2);
                if delta.abs() <= Duration::seconds(TIE_TOLERANCE_SECS) {
                    return Winner::First; // documented tie-break
                }

                let first_is_newer = delta > Duration::zero();
                match (self, first_is_newer) {
                    (Self::MostRecentWins, true) | (Self::LeastRecentWins, false) => Winner::First,
                    _ => Winner::Second,
                }
            }
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AlwaysFirst => "always-first",
            Self::AlwaysSecond => "always-second",
            Self::MostRecentWins => "most-recent-wins",
            Self::LeastRecentWins => "least-recent-wins",
        };
        f.write_str(name)
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always-first" => Ok(Self::AlwaysFirst),
            "always-second" => Ok(Self::AlwaysSecond),
            "most-recent-wins" => Ok(Self::MostRecentWins),
            "least-recent-wins" => Ok(Self::LeastRecentWins),
            _ => Err(format!("unknown resolution strategy: {s:?}")),
        }
    }
}
