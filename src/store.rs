// src/store.rs

use crate::error::{Error, Result};
use crate::model::{DayCache, SignatureResults};
use chrono::NaiveDate;
use fs2::FileExt;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const LOCK_FILE: &str = ".lock";

fn cache_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2})\.json$").expect("cache file pattern"))
}

/// One JSON file per day under a directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

/// Exclusive access to the whole store, released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl CacheStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<CacheStore> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(CacheStore { dir })
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Blocks until no other process holds the store.
    pub fn lock(&self) -> Result<StoreLock> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        file.lock_exclusive().map_err(|e| Error::io(&path, e))?;
        debug!(path = %path.display(), "store locked");
        Ok(StoreLock { file })
    }

    /// The cache of `date`; a missing or unreadable file is no cache.
    pub fn load(&self, _lock: &StoreLock, date: NaiveDate) -> Option<DayCache> {
        let path = self.path_for(date);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no cache");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt cache");
                None
            }
        }
    }

    /// Replaces the cache of `date` atomically.
    pub fn store(&self, _lock: &StoreLock, date: NaiveDate, cache: &DayCache) -> Result<()> {
        let path = self.path_for(date);
        let json = serde_json::to_string(cache)?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| Error::io(&path, e.error))?;
        debug!(path = %path.display(), bytes = json.len(), "cache stored");
        Ok(())
    }

    /// Cached dates, most recent first.
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        let pattern = cache_file_pattern();
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(captures) = name.to_str().and_then(|name| pattern.captures(name)) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d") {
                dates.push(date);
            }
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    /// Cached results of one product and channel; empty when absent.
    pub fn get(&self, date: NaiveDate, product: &str, channel: &str) -> Result<SignatureResults> {
        let lock = self.lock()?;
        Ok(self
            .load(&lock, date)
            .and_then(|cache| cache.results(product, channel).cloned())
            .unwrap_or_default())
    }
}
