use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

pub const HISTORY_FILE: &str = "pushed_articles.json";
pub const QUEUE_FILE: &str = "push_schedule.json";
pub const STATUS_FILE: &str = "rss_status.json";

/// Load/save access to one piece of persisted state.
///
/// Loading never fails: missing or unreadable state comes back as
/// `T::default()` so a run can always continue.
pub trait Repository<T> {
    fn load(&self) -> T;
    fn save(&self, value: &T) -> Result<()>;
}

/// State kept as a pretty-printed JSON file
pub struct JsonFileRepository<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileRepository<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Repository<T> for JsonFileRepository<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> T {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no saved state, starting empty");
            return T::default();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read state file, starting empty");
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file is corrupted, starting empty");
                T::default()
            }
        }
    }

    fn save(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create state directory: {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(value).context("Failed to serialize state")?;

        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        Ok(())
    }
}

/// In-memory repository, mostly for tests
#[derive(Default)]
pub struct MemoryRepository<T> {
    value: Mutex<Option<T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }
}

impl<T> Repository<T> for MemoryRepository<T>
where
    T: Clone + Default,
{
    fn load(&self) -> T {
        self.value
            .lock()
            .map(|v| v.clone().unwrap_or_default())
            .unwrap_or_default()
    }

    fn save(&self, value: &T) -> Result<()> {
        let mut slot = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repository lock poisoned"))?;
        *slot = Some(value.clone());
        Ok(())
    }
}

/// Get the default directory for persisted state
pub fn get_default_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Could not determine local data directory")?
        .join("journal-sniffer");

    fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    Ok(data_dir)
}
