// src/testing.rs
//
// In-memory stand-ins for the remote services, shared by unit tests.

use crate::config::{PipelineConfig, Settings};
use crate::error::ServiceError;
use crate::model::Patch;
use crate::sources::{
    BuildFacet, CrashPayloads, CrashSearch, HistoryQuery, JsonDump, PatchHistory, ProcessedCrash, RawFrame,
    SearchFilter, SignatureShapes, Thread,
};
use crate::window::Window;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn settings() -> Settings {
    let pipeline = PipelineConfig { reporting_utc_offset_minutes: -7 * 60, ..PipelineConfig::default() };
    let mut settings = Settings::new("Firefox", "nightly", 3, 5, &pipeline).unwrap();
    settings.show_progress = false;
    settings
}

/// 2016-10-18, looking back three days
pub fn window() -> Window {
    let settings = settings();
    Window::resolve(reference(), settings.lookback_days, settings.reporting_offset).unwrap()
}

pub fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 10, 18).unwrap()
}

pub fn pushed(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 10, day, hour, 0, 0).unwrap()
}

/// `hg:` reference of `path` at revision `node`
pub fn hg(path: &str, node: &str) -> String {
    format!("hg:hg.mozilla.org/mozilla-central:{path}:{node}")
}

/// A processed crash whose crashing thread has `frames` of (function, file, line)
pub fn crash(uuid: &str, frames: &[(&str, Option<&str>, u32)]) -> ProcessedCrash {
    let frames = frames
        .iter()
        .map(|(function, file, line)| RawFrame {
            function: Some(function.to_string()),
            file: file.map(str::to_string),
            line: Some(*line),
        })
        .collect();
    ProcessedCrash {
        uuid: uuid.into(),
        crashed_thread: Some(1),
        json_dump: Some(JsonDump { threads: vec![Thread::default(), Thread { frames }] }),
    }
}

#[derive(Default)]
pub struct FakeSearch {
    pub builds: Vec<BuildFacet>,
    pub shapes: Vec<SignatureShapes>,
    pub fail: bool,
    pub filters: Mutex<Vec<SearchFilter>>,
}

impl FakeSearch {
    pub fn seen_filters(&self) -> Vec<SearchFilter> {
        self.filters.lock().unwrap().clone()
    }
}

impl CrashSearch for FakeSearch {
    fn signatures_by_build(&self, filter: &SearchFilter, _facets_size: usize) -> Result<Vec<BuildFacet>, ServiceError> {
        self.filters.lock().unwrap().push(filter.clone());
        if self.fail {
            return Err(ServiceError::Unavailable("search".into()));
        }
        Ok(self.builds.clone())
    }

    fn stack_shapes(&self, filter: &SearchFilter, _facets_size: usize) -> Result<Vec<SignatureShapes>, ServiceError> {
        self.filters.lock().unwrap().push(filter.clone());
        if self.fail {
            return Err(ServiceError::Unavailable("search".into()));
        }
        Ok(self
            .shapes
            .iter()
            .filter(|s| filter.signatures.contains(&s.signature))
            .cloned()
            .collect())
    }
}

/// Serves crashes by uuid; uuids listed in `failing` error out
#[derive(Default)]
pub struct FakePayloads {
    pub crashes: HashMap<String, ProcessedCrash>,
    pub failing: Vec<String>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakePayloads {
    pub fn with(crashes: Vec<ProcessedCrash>) -> Self {
        FakePayloads {
            crashes: crashes.into_iter().map(|c| (c.uuid.clone(), c)).collect(),
            ..FakePayloads::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        let mut fetched = self.fetched.lock().unwrap().clone();
        fetched.sort();
        fetched
    }
}

impl CrashPayloads for FakePayloads {
    fn processed_crash(&self, uuid: &str) -> Result<Option<ProcessedCrash>, ServiceError> {
        self.fetched.lock().unwrap().push(uuid.to_string());
        if self.failing.iter().any(|f| f == uuid) {
            return Err(ServiceError::Unavailable(uuid.into()));
        }
        Ok(self.crashes.get(uuid).cloned())
    }
}

/// Serves patches by path; paths listed in `failing` error out
#[derive(Default)]
pub struct FakeHistory {
    pub patches: HashMap<String, Vec<Patch>>,
    pub failing: Vec<String>,
    pub queries: Mutex<Vec<HistoryQuery>>,
}

impl FakeHistory {
    pub fn with(patches: &[(&str, Vec<Patch>)]) -> Self {
        FakeHistory {
            patches: patches.iter().map(|(path, p)| (path.to_string(), p.clone())).collect(),
            ..FakeHistory::default()
        }
    }

    pub fn queried_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.queries.lock().unwrap().iter().map(|q| q.path.clone()).collect();
        paths.sort();
        paths
    }
}

impl PatchHistory for FakeHistory {
    fn last_patches(&self, query: &HistoryQuery) -> Result<Vec<Patch>, ServiceError> {
        self.queries.lock().unwrap().push(query.clone());
        if self.failing.contains(&query.path) {
            return Err(ServiceError::Unavailable(query.path.clone()));
        }
        Ok(self.patches.get(&query.path).cloned().unwrap_or_default())
    }
}
