// src/utils/debug_flags.rs
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::LiveResult;

/// Locally persisted developer switches.
///
/// Everything defaults to off, so a missing or broken file always yields the
/// production behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugFlags {
    #[serde(default)]
    pub simulate_tracking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Remote,
    Simulated,
}

impl DebugFlags {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&contents) {
            Ok(flags) => flags,
            Err(e) => {
                tracing::warn!("Ignoring unreadable debug flags at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> LiveResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        if self.simulate_tracking {
            TrackingMode::Simulated
        } else {
            TrackingMode::Remote
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sparrow-live-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_missing_file_defaults_to_remote() {
        let flags = DebugFlags::load(temp_path("missing-does-not-exist"));
        assert_eq!(flags.tracking_mode(), TrackingMode::Remote);
    }

    #[test]
    fn test_garbage_file_defaults_to_remote() {
        let path = temp_path("garbage");
        std::fs::write(&path, "{{{").unwrap();
        assert_eq!(DebugFlags::load(&path).tracking_mode(), TrackingMode::Remote);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_opt_in_round_trip() {
        let path = temp_path("opt-in");
        DebugFlags { simulate_tracking: true }.save(&path).unwrap();
        assert_eq!(DebugFlags::load(&path).tracking_mode(), TrackingMode::Simulated);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unrelated_keys_do_not_opt_in() {
        let path = temp_path("unrelated");
        std::fs::write(&path, r#"{"verbose": true}"#).unwrap();
        assert_eq!(DebugFlags::load(&path).tracking_mode(), TrackingMode::Remote);
        std::fs::remove_file(&path).unwrap();
    }
}
