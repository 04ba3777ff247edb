// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::resolve::ResolutionStrategy;

/// The name of the application, used for default state paths.
pub const APP_NAME: &str = "tandem";

/// Configuration for one side-pair synchronization.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SyncConfig {
    /// Name of this side pair, namespacing its durable state so independent
    /// pairs (e.g. different calendars) do not collide.
    pub pair_name: String,

    /// Directory for storing engine state.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Conflict resolution strategy.
    #[serde(default)]
    pub strategy: ResolutionStrategy,

    /// Side A fields excluded from the change-detection equality check.
    #[serde(default)]
    pub ignore_keys_a: BTreeSet<String>,

    /// Side B fields excluded from the change-detection equality check.
    #[serde(default)]
    pub ignore_keys_b: BTreeSet<String>,

    /// Fields the integration declares mutable; updates are restricted to
    /// these. `None` sends every converted field except the identity.
    #[serde(default)]
    pub mutable_keys: Option<BTreeSet<String>>,
}

impl SyncConfig {
    /// Creates a configuration with defaults for the given pair name.
    #[must_use]
    pub fn new(pair_name: impl Into<String>) -> Self {
        Self {
            pair_name: pair_name.into(),
            state_dir: None,
            strategy: ResolutionStrategy::default(),
            ignore_keys_a: BTreeSet::new(),
            ignore_keys_b: BTreeSet::new(),
            mutable_keys: None,
        }
    }

    /// Normalize the configuration.
    ///
    /// Expands the state directory path and falls back to the platform state
    /// directory when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for an invalid pair name or when no state
    /// directory can be determined.
    pub fn normalize(&mut self) -> Result<(), SyncError> {
        if self.pair_name.is_empty()
            || !self
                .pair_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(SyncError::Config(format!(
                "invalid pair name: {:?}",
                self.pair_name
            )));
        }

        match &self.state_dir {
            Some(dir) => {
                let dir = expand_path(dir)
                    .map_err(|e| SyncError::Config(format!("invalid state directory: {e}")))?;
                self.state_dir = Some(dir);
            }
            None => match get_state_dir() {
                Some(dir) => self.state_dir = Some(dir.join(APP_NAME)),
                None => {
                    return Err(SyncError::Config(
                        "no state directory configured and no platform default found".to_string(),
                    ));
                }
            },
        }

        Ok(())
    }

    /// Directory holding this pair's durable state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if called before [`Self::normalize`].
    pub fn pair_dir(&self) -> Result<PathBuf, SyncError> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(&self.pair_name))
            .ok_or_else(|| SyncError::Config("state directory not normalized".to_string()))
    }

    /// The ignore list for one side.
    #[must_use]
    pub fn ignore_keys(&self, side: crate::Side) -> &BTreeSet<String> {
        match side {
            crate::Side::A => &self.ignore_keys_a,
            crate::Side::B => &self.ignore_keys_b,
        }
    }
}

/// Handle tilde (~) and environment variables in the path
fn expand_path(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }

    let path = path.to_str().ok_or("Invalid path")?;

    // Handle tilde and home directory
    let home_prefixes: &[&str] = if cfg!(unix) {
        &["~/", "$HOME/", "${HOME}/"]
    } else {
        &[r"~\", "~/", r"%UserProfile%\", r"%UserProfile%/"]
    };
    for prefix in home_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_home_dir()?.join(stripped));
        }
    }

    // Handle state directories
    let state_prefixes: &[&str] = if cfg!(unix) {
        &["$XDG_STATE_HOME/", "${XDG_STATE_HOME}/"]
    } else {
        &[r"%LOCALAPPDATA%\", "%LOCALAPPDATA%/"]
    };
    for prefix in state_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_state_dir().ok_or("User-specific state directory not found")?.join(stripped));
        }
    }

    Ok(path.into())
}

fn get_home_dir() -> Result<PathBuf, String> {
    dirs::home_dir().ok_or_else(|| "User-specific home directory not found".to_string())
}

fn get_state_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    let state_dir = xdg::BaseDirectories::new().get_state_home();
    #[cfg(windows)]
    let state_dir = dirs::data_dir();
    state_dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_home_env() {
        let home = get_home_dir().unwrap();
        let home_prefixes: &[&str] = if cfg!(unix) {
            &["~", "$HOME", "${HOME}"]
        } else {
            &[r"~", r"%UserProfile%"]
        };
        for prefix in home_prefixes {
            let result = expand_path(&PathBuf::from(format!("{prefix}/state"))).unwrap();
            assert_eq!(result, home.join("state"));
            assert!(result.is_absolute());
        }
    }

    #[test]
    fn test_expand_path_absolute() {
        let absolute_path = PathBuf::from("/var/lib/tandem");
        let result = expand_path(&absolute_path).unwrap();
        assert_eq!(result, absolute_path);
    }

    #[test]
    fn test_normalize_rejects_bad_pair_names() {
        for name in ["", "my pair", "a/b", "x\u{e9}"] {
            let mut config = SyncConfig::new(name);
            config.state_dir = Some(PathBuf::from("/tmp/tandem"));
            assert!(config.normalize().is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn test_normalize_keeps_explicit_state_dir() {
        let mut config = SyncConfig::new("cal-tasks");
        config.state_dir = Some(PathBuf::from("/var/lib/tandem"));
        config.normalize().unwrap();
        assert_eq!(
            config.pair_dir().unwrap(),
            PathBuf::from("/var/lib/tandem/cal-tasks")
        );
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            pair_name = "cal-tasks"
            state_dir = "/var/lib/tandem"
            strategy = "most-recent-wins"
            ignore_keys_a = ["etag"]
            mutable_keys = ["summary", "due"]
            "#,
        )
        .unwrap();

        assert_eq!(config.pair_name, "cal-tasks");
        assert_eq!(config.strategy, ResolutionStrategy::MostRecentWins);
        assert!(config.ignore_keys_a.contains("etag"));
        assert!(config.ignore_keys_b.is_empty());
        assert_eq!(config.mutable_keys.unwrap().len(), 2);
    }
}
