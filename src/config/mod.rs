//! Settings: a persistent key-value store backed by SQLite, plus the
//! resolution of effective [`Settings`] from flags, store, environment
//! and defaults (in that order of precedence).

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::Connection;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::consts::{
    DEFAULT_BASE_URL, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REALTIME_MODEL, DEFAULT_TEMPERATURE, ENV_API_KEY,
    ENV_ASSISTANT_ID,
};
use crate::engine::dispatcher::CompletionConfig;
use crate::engine::job::JobConfig;

/// Keys accepted by the store.
pub const KEYS: &[&str] = &[
    "api_key",
    "base_url",
    "model",
    "temperature",
    "max_tokens",
    "assistant_id",
    "poll_interval_ms",
    "job_timeout_secs",
    "max_polls",
    "realtime_model",
];

pub fn is_known_key(key: &str) -> bool {
    KEYS.contains(&key)
}

/// Persistent key-value configuration store.
pub struct Config {
    conn: Mutex<Connection>,
}

impl Config {
    /// Open or create the config table in the given database.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open config database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .context("failed to create config table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("config database lock poisoned"))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Upsert.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Typed read; malformed values are errors naming the key.
    fn parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .with_context(|| format!("invalid value for `{key}`: {raw:?}")),
            None => Ok(None),
        }
    }
}

/// Command-line overrides; `None` defers to the store.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub assistant_id: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub max_polls: Option<u32>,
}

/// Effective settings for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub assistant_id: Option<String>,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub max_polls: Option<u32>,
    pub realtime_model: String,
}

impl Settings {
    /// Resolve against the process environment.
    pub fn resolve(config: &Config, overrides: &Overrides) -> Result<Self> {
        Self::resolve_with(config, overrides, |name| {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        })
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        config: &Config,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = match config.get("api_key")?.or_else(|| env(ENV_API_KEY)) {
            Some(key) => key,
            None => bail!(
                "no API key found. Set {ENV_API_KEY} or run `callpilot config set api_key <key>`."
            ),
        };

        let assistant_id = match &overrides.assistant_id {
            Some(id) => Some(id.clone()),
            None => config.get("assistant_id")?.or_else(|| env(ENV_ASSISTANT_ID)),
        };

        let poll_interval_ms = match overrides.poll_interval_ms {
            Some(ms) => ms,
            None => config
                .parsed("poll_interval_ms")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        };
        if poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }

        let job_timeout_secs = match overrides.job_timeout_secs {
            Some(secs) => secs,
            None => config
                .parsed("job_timeout_secs")?
                .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
        };

        let max_polls = match overrides.max_polls {
            Some(max) => Some(max),
            None => config.parsed("max_polls")?,
        };

        Ok(Self {
            api_key,
            base_url: pick(&overrides.base_url, config.get("base_url")?, DEFAULT_BASE_URL),
            model: pick(&overrides.model, config.get("model")?, DEFAULT_MODEL),
            temperature: config.parsed("temperature")?.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.parsed("max_tokens")?.unwrap_or(DEFAULT_MAX_TOKENS),
            assistant_id,
            poll_interval: Duration::from_millis(poll_interval_ms),
            job_timeout: Duration::from_secs(job_timeout_secs),
            max_polls,
            realtime_model: config
                .get("realtime_model")?
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        })
    }

    pub fn completion(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn job(&self) -> JobConfig {
        JobConfig {
            poll_interval: self.poll_interval,
            timeout: self.job_timeout,
            max_polls: self.max_polls,
        }
    }
}

fn pick(flag: &Option<String>, stored: Option<String>, default: &str) -> String {
    flag.clone()
        .or(stored)
        .unwrap_or_else(|| default.to_string())
}
