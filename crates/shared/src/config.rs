use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::history::{DEFAULT_LOOKBACK_DAYS, DEFAULT_RETENTION_DAYS};
use crate::schedule::DEFAULT_BATCH_SIZE;
use crate::store;

/// Upper bound for the lookback and retention windows
pub const MAX_WINDOW_DAYS: u32 = 3650;

pub const DEFAULT_TRANSLATE_API_URL: &str = "https://api.mymemory.translated.net/get";

#[derive(Debug, Clone)]
pub struct Config {
    pub webhook_url: Option<String>,
    pub data_dir: PathBuf,
    pub force_discovery: bool,
    pub translate_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        let webhook_url = Self::webhook_from_env();

        let data_dir = match env::var("JOURNAL_SNIFFER_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => {
                let dir = PathBuf::from(dir.trim());
                std::fs::create_dir_all(&dir).with_context(|| {
                    format!("Failed to create data directory: {}", dir.display())
                })?;
                dir
            }
            _ => store::get_default_data_dir()?,
        };

        let force_discovery = env::var("FORCE_RSS_UPDATE")
            .map(|v| v.trim() == "1")
            .unwrap_or(false);

        let translate_api_url = env::var("TRANSLATE_API_URL")
            .unwrap_or_else(|_| DEFAULT_TRANSLATE_API_URL.to_string());

        Ok(Self {
            webhook_url,
            data_dir,
            force_discovery,
            translate_api_url,
        })
    }

    /// `PUSH_WEBHOOK_URL` on its own, usable when the rest of the config
    /// failed to load
    pub fn webhook_from_env() -> Option<String> {
        env::var("PUSH_WEBHOOK_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// The webhook URL, or an error explaining how to configure it
    pub fn require_webhook(&self) -> Result<&str> {
        self.webhook_url.as_deref().context(
            "PUSH_WEBHOOK_URL not found.\n\n\
            To fix this, create ~/.config/journal-sniffer/.env with:\n  \
            PUSH_WEBHOOK_URL=https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=...\n\n\
            Or run with --dry-run to print messages instead of sending them.",
        )
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/journal-sniffer/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("journal-sniffer").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}

/// Knobs of one push run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub batch_size: usize,
    pub lookback_days: u32,
    pub retention_days: u32,
    /// Feed polling stops once this much time has passed
    pub polling_deadline: Duration,
    pub translate: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            retention_days: DEFAULT_RETENTION_DAYS,
            polling_deadline: Duration::from_secs(3600),
            translate: true,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be at least 1");
        }
        if self.lookback_days == 0 {
            anyhow::bail!("Lookback must cover at least today (1 day)");
        }
        if self.retention_days > MAX_WINDOW_DAYS {
            anyhow::bail!(
                "Retention ({} days) must not exceed {} days",
                self.retention_days,
                MAX_WINDOW_DAYS
            );
        }
        if self.retention_days <= self.lookback_days {
            anyhow::bail!(
                "Retention ({} days) must exceed the duplicate lookback ({} days)",
                self.retention_days,
                self.lookback_days
            );
        }
        Ok(())
    }
}
