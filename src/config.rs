// src/config.rs

use crate::error::{Error, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "crash-blame.toml";
const HOME_CONFIG_FILE: &str = ".crash-blame.toml";

/// Contents of `crash-blame.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub guilty_patches: Locations,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Locations {
    pub output: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub repo: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Offset of the timezone build ids are minted in
    pub reporting_utc_offset_minutes: i32,
    pub baseline_max: u64,
    /// Signatures per sample query
    pub signature_chunk: usize,
    /// Cap on terms per aggregation
    pub facets_size: usize,
    /// Path prefixes whose history is never attributable, e.g. build output
    pub denylist: Vec<String>,
    /// channel -> versions to search; a missing channel means any version
    pub versions: BTreeMap<String, Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            reporting_utc_offset_minutes: -8 * 60,
            baseline_max: 0,
            signature_chunk: 10,
            facets_size: 100_000,
            denylist: vec!["obj-firefox".to_string()],
            versions: BTreeMap::new(),
        }
    }
}

impl FileConfig {
    /// Loads `explicit` if given, else the first of `./crash-blame.toml` and
    /// `~/.crash-blame.toml` that exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => {
                let mut paths = vec![PathBuf::from(CONFIG_FILE)];
                if let Some(home) = dirs::home_dir() {
                    paths.push(home.join(HOME_CONFIG_FILE));
                }
                paths
            }
        };

        for path in candidates {
            if explicit.is_none() && !path.is_file() {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            debug!(path = %path.display(), "loaded config");
            return FileConfig::parse(&raw).map_err(|source| Error::Config { path, source });
        }
        Ok(FileConfig::default())
    }

    pub fn parse(raw: &str) -> std::result::Result<FileConfig, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Everything one pipeline run needs, passed explicitly to every stage
#[derive(Debug, Clone)]
pub struct Settings {
    pub product: String,
    pub channel: String,
    pub versions: Vec<String>,
    pub lookback_days: u32,
    pub threshold: u64,
    pub baseline_max: u64,
    pub reporting_offset: FixedOffset,
    pub signature_chunk: usize,
    pub facets_size: usize,
    pub denylist: Vec<String>,
    pub show_progress: bool,
}

impl Settings {
    pub fn new(product: &str, channel: &str, lookback_days: u32, threshold: u64, pipeline: &PipelineConfig) -> Result<Settings> {
        let minutes = pipeline.reporting_utc_offset_minutes;
        let reporting_offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(Error::InvalidOffset(minutes))?;

        Ok(Settings {
            product: product.to_string(),
            channel: channel.to_string(),
            versions: pipeline.versions.get(channel).cloned().unwrap_or_default(),
            lookback_days,
            threshold,
            baseline_max: pipeline.baseline_max,
            reporting_offset,
            signature_chunk: pipeline.signature_chunk.max(1),
            facets_size: pipeline.facets_size,
            denylist: pipeline.denylist.clone(),
            show_progress: true,
        })
    }

    /// True when `path` lies under a denylisted prefix.
    pub fn is_denied(&self, path: &str) -> bool {
        self.denylist.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}
