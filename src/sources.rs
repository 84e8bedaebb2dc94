// src/sources.rs
//
// Interfaces of the remote collaborators the pipeline reads from. Responses
// are explicit records with optional fields; a missing field means the data
// is not available, not that the call failed.

use crate::error::ServiceError;
use crate::model::Patch;
use crate::window::BuildId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which crashes a search looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub product: String,
    pub channel: String,
    /// Empty means any version
    pub versions: Vec<String>,
    /// Crashes received on or after this UTC day
    pub date_from: NaiveDate,
    /// Inclusive
    pub build_from: BuildId,
    /// Exclusive
    pub build_to: BuildId,
    /// Exact signature matches; empty means any signature
    pub signatures: Vec<String>,
}

/// A counted term of an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    pub count: u64,
}

/// Crash counts of one build id, split by signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFacet {
    pub term: String,
    pub count: u64,
    #[serde(default)]
    pub signatures: Vec<Term>,
}

/// Crashes of one signature, split by internal stack shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShapes {
    pub signature: String,
    #[serde(default)]
    pub shapes: Vec<ShapeFacet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeFacet {
    pub shape: String,
    pub count: u64,
    /// Crash identifiers having this shape, at least one when the shape has crashes
    #[serde(default)]
    pub uuids: Vec<String>,
}

pub trait CrashSearch: Send + Sync {
    /// Aggregates by build id, then by signature.
    fn signatures_by_build(&self, filter: &SearchFilter, facets_size: usize) -> Result<Vec<BuildFacet>, ServiceError>;

    /// Aggregates by signature, then by distinct internal stack shape.
    fn stack_shapes(&self, filter: &SearchFilter, facets_size: usize) -> Result<Vec<SignatureShapes>, ServiceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(default)]
    pub frames: Vec<RawFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonDump {
    #[serde(default)]
    pub threads: Vec<Thread>,
}

/// The part of a processed crash the pipeline consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedCrash {
    pub uuid: String,
    #[serde(rename = "crashedThread", default)]
    pub crashed_thread: Option<usize>,
    #[serde(default)]
    pub json_dump: Option<JsonDump>,
}

impl ProcessedCrash {
    /// Frames of the crashing thread, `None` when the payload is unusable.
    pub fn crashing_frames(&self) -> Option<&[RawFrame]> {
        let index = self.crashed_thread?;
        let thread = self.json_dump.as_ref()?.threads.get(index)?;
        Some(&thread.frames)
    }
}

pub trait CrashPayloads: Send + Sync {
    /// `Ok(None)` when the crash is unknown to the service.
    fn processed_crash(&self, uuid: &str) -> Result<Option<ProcessedCrash>, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub channel: String,
    pub path: String,
    pub node: String,
    pub until: DateTime<Utc>,
    pub lookback_days: u32,
}

pub trait PatchHistory: Send + Sync {
    /// Patches touching `query.path` pushed in `[until - lookback_days, until]`, most recent first.
    fn last_patches(&self, query: &HistoryQuery) -> Result<Vec<Patch>, ServiceError>;
}
