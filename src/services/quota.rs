//! File-backed registry of quota halts.
//!
//! A JSON object `{ "<platform>": <epoch_seconds> }`. Every operation
//! reloads from disk so multiple processes converge on the same halt;
//! writes go through a temp file and an atomic rename. A missing file reads
//! as "no halts".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{CollectError, Result};

#[derive(Clone)]
pub struct QuotaRegistry {
    path: PathBuf,
}

impl QuotaRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        QuotaRegistry { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let seconds: HashMap<String, i64> = serde_json::from_str(&raw)?;
        let mut halts = HashMap::new();
        for (platform, ts) in seconds {
            let release_at = DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                CollectError::configuration(format!(
                    "quota file holds an invalid timestamp for '{platform}': {ts}"
                ))
            })?;
            halts.insert(platform, release_at);
        }
        Ok(halts)
    }

    pub fn get(&self, platform: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load()?.get(platform).copied())
    }

    pub fn store_quota(&self, platform: &str, release_at: DateTime<Utc>) -> Result<()> {
        let mut halts = self.load()?;
        halts.insert(platform.to_string(), release_at);
        self.write(&halts)
    }

    pub fn remove_quota(&self, platform: &str) -> Result<()> {
        let mut halts = self.load()?;
        if halts.remove(platform).is_some() {
            self.write(&halts)?;
        }
        Ok(())
    }

    fn write(&self, halts: &HashMap<String, DateTime<Utc>>) -> Result<()> {
        let seconds: HashMap<&str, i64> = halts
            .iter()
            .map(|(platform, release_at)| (platform.as_str(), release_at.timestamp()))
            .collect();
        let raw = serde_json::to_string(&seconds)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
