// src/backtrace.rs

use crate::model::{BacktraceKey, CacheIndex, Signature, StackFrame};
use crate::progress::stage_bar;
use crate::sampler::Sample;
use crate::sources::{CrashPayloads, ProcessedCrash};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A distinct backtrace as accumulated during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunBacktrace {
    /// Frame detail of the smallest contributing crash id
    pub frames: Vec<StackFrame>,
    frames_from: String,
    /// crash id -> crashes of its stack shape
    pub contributions: BTreeMap<String, u64>,
    /// Already present in the cache, no file/patch walk needed
    pub resolved: bool,
}

impl RunBacktrace {
    fn new(uuid: &str, count: u64, frames: Vec<StackFrame>) -> Self {
        RunBacktrace {
            frames,
            frames_from: uuid.to_string(),
            contributions: BTreeMap::from([(uuid.to_string(), count)]),
            resolved: false,
        }
    }

    fn absorb(&mut self, uuid: &str, count: u64, frames: Vec<StackFrame>) {
        if uuid < self.frames_from.as_str() {
            self.frames = frames;
            self.frames_from = uuid.to_string();
        }
        self.contributions.insert(uuid.to_string(), count);
    }

    pub fn count(&self) -> u64 {
        self.contributions.values().sum()
    }

    pub fn uuids(&self) -> Vec<String> {
        self.contributions.keys().cloned().collect()
    }
}

pub type RunBacktraces = BTreeMap<Signature, BTreeMap<BacktraceKey, RunBacktrace>>;

/// Named frames of the crashing thread, `None` when the payload lacks one.
pub fn extract_frames(crash: &ProcessedCrash) -> Option<Vec<StackFrame>> {
    let frames = crash.crashing_frames()?;
    Some(
        frames
            .iter()
            .filter_map(|frame| {
                Some(StackFrame {
                    function: frame.function.clone()?,
                    file: frame.file.clone(),
                    line: frame.line.unwrap_or(0),
                })
            })
            .collect(),
    )
}

/// Fetches every sampled crash the cache does not know yet and groups the
/// results by function-name sequence. Entries whose key is already cached
/// for the signature come back `resolved`.
pub fn resolve_backtraces(
    payloads: &dyn CrashPayloads,
    samples: &BTreeMap<Signature, Vec<Sample>>,
    index: Option<&CacheIndex>,
    show_progress: bool,
) -> RunBacktraces {
    let pending: Vec<(&Signature, &Sample)> = samples
        .iter()
        .flat_map(|(signature, samples)| samples.iter().map(move |sample| (signature, sample)))
        .filter(|(signature, sample)| {
            let known = index.is_some_and(|index| index.knows_uuid(&sample.uuid));
            debug!(%signature, uuid = %sample.uuid, known, "sampled crash");
            !known
        })
        .collect();

    let bar = stage_bar(pending.len(), "Fetching crashes", show_progress);
    let fetched: Vec<(&Signature, &Sample, Option<Vec<StackFrame>>)> = pending
        .into_par_iter()
        .progress_with(bar)
        .map(|(signature, sample)| {
            let frames = match payloads.processed_crash(&sample.uuid) {
                Ok(Some(crash)) => extract_frames(&crash),
                Ok(None) => None,
                Err(e) => {
                    warn!(uuid = %sample.uuid, error = %e, "crash fetch failed");
                    None
                }
            };
            (signature, sample, frames)
        })
        .collect();

    let mut result = RunBacktraces::new();
    for (signature, sample, frames) in fetched {
        let Some(frames) = frames.filter(|frames| !frames.is_empty()) else {
            debug!(uuid = %sample.uuid, "crash has no usable crashing thread");
            continue;
        };
        let key: BacktraceKey = frames.iter().map(|frame| frame.function.clone()).collect();
        let backtraces = result.entry(signature.clone()).or_default();
        match backtraces.get_mut(&key) {
            Some(backtrace) => backtrace.absorb(&sample.uuid, sample.count, frames),
            None => {
                backtraces.insert(key, RunBacktrace::new(&sample.uuid, sample.count, frames));
            }
        }
    }

    if let Some(index) = index {
        for (signature, backtraces) in result.iter_mut() {
            for (key, backtrace) in backtraces.iter_mut() {
                backtrace.resolved = index.has_backtrace(signature, key);
            }
        }
    }
    result
}
