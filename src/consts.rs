//! Project-wide constants.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Placeholder for a default-filled field that the backend left empty.
pub const SENTINEL: &str = "None yet";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model for single-shot modes.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Model used when issuing realtime voice sessions.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-mini-realtime-preview-2024-12-17";
pub const DEFAULT_VOICE: &str = "alloy";

/// Wait between two run-status checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Upper bound on how long a single job may take before it times out.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;

/// Per-request cap applied by the HTTP client to every backend call.
pub const HTTP_TIMEOUT_SECS: u64 = 60;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ASSISTANT_ID: &str = "OPENAI_ASSISTANT_ID";

/// Default database path: `~/.callpilot/callpilot.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".callpilot").join("callpilot.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_matches_wire_value() {
        assert_eq!(SENTINEL, "None yet");
    }

    #[test]
    fn default_db_path_is_under_dot_dir() {
        if let Ok(path) = default_db_path() {
            assert!(path.ends_with(".callpilot/callpilot.db"));
        }
    }

    #[test]
    fn defaults_are_sane() {
        assert!(DEFAULT_POLL_INTERVAL_MS > 0);
        assert!(DEFAULT_JOB_TIMEOUT_SECS * 1000 > DEFAULT_POLL_INTERVAL_MS);
        assert!((0.0..=2.0).contains(&DEFAULT_TEMPERATURE));
    }
}
