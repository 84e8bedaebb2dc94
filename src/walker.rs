// src/walker.rs

use crate::backtrace::{RunBacktrace, RunBacktraces};
use crate::config::Settings;
use crate::model::{DistinctBacktrace, FileInfo, Patch};
use crate::progress::stage_bar;
use crate::sources::{HistoryQuery, PatchHistory};
use crate::window::Window;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A versioned source file, parsed from a frame's file reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileRef {
    pub path: String,
    pub node: String,
}

/// Patches found for every file walked this run
pub type FilePatches = HashMap<FileRef, Vec<Patch>>;

fn file_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // <vcs>:<host/repository>:<path>:<node>
    PATTERN.get_or_init(|| Regex::new(r"^(?:hg|git):[^:]+:([^:]+):([a-z0-9]+)$").expect("file reference pattern"))
}

pub fn parse_file_ref(raw: &str) -> Option<FileRef> {
    let captures = file_ref_pattern().captures(raw)?;
    Some(FileRef { path: captures[1].to_string(), node: captures[2].to_string() })
}

/// Queries the patch history of every distinct file referenced by an
/// unresolved backtrace, once per (path, node), skipping denylisted paths.
pub fn walk_files(
    history: &dyn PatchHistory,
    settings: &Settings,
    window: &Window,
    backtraces: &RunBacktraces,
) -> FilePatches {
    let files: BTreeSet<FileRef> = backtraces
        .values()
        .flat_map(|backtraces| backtraces.values())
        .filter(|backtrace| !backtrace.resolved)
        .flat_map(|backtrace| backtrace.frames.iter())
        .filter_map(|frame| frame.file.as_deref())
        .filter_map(|raw| {
            let parsed = parse_file_ref(raw);
            if parsed.is_none() {
                debug!(file = raw, "unattributable file reference");
            }
            parsed
        })
        .filter(|file| !settings.is_denied(&file.path))
        .collect();

    let bar = stage_bar(files.len(), "Walking files", settings.show_progress);
    files
        .into_par_iter()
        .progress_with(bar)
        .map(|file| {
            let query = HistoryQuery {
                channel: settings.channel.clone(),
                path: file.path.clone(),
                node: file.node.clone(),
                until: window.history_until,
                lookback_days: window.history_lookback_days(),
            };
            let mut patches = history.last_patches(&query).unwrap_or_else(|e| {
                warn!(path = %file.path, node = %file.node, error = %e, "history query failed");
                Vec::new()
            });
            patches.sort_by(|a, b| b.pushdate.cmp(&a.pushdate).then_with(|| a.node.cmp(&b.node)));
            debug!(path = %file.path, patches = patches.len(), "walked file");
            (file, patches)
        })
        .collect()
}

/// Builds the persisted form of a backtrace, or `None` when none of its
/// frames is attributable to a recent patch.
pub fn attribute(backtrace: &RunBacktrace, patches: &FilePatches) -> Option<DistinctBacktrace> {
    let bt: Vec<(String, FileInfo)> = backtrace
        .frames
        .iter()
        .map(|frame| {
            let info = match frame.file.as_deref() {
                None => FileInfo::default(),
                Some(raw) => match parse_file_ref(raw) {
                    Some(file) => FileInfo {
                        patches: patches.get(&file).cloned().unwrap_or_default(),
                        filename: file.path,
                        line: Some(frame.line),
                        node: Some(file.node),
                    },
                    None => FileInfo { filename: raw.to_string(), line: Some(frame.line), ..FileInfo::default() },
                },
            };
            (frame.function.clone(), info)
        })
        .collect();

    let mut attributed = DistinctBacktrace { bt, count: backtrace.count(), haspatches: false, uuids: backtrace.uuids() };
    attributed.haspatches = attributed.has_patches();
    attributed.haspatches.then_some(attributed)
}
