// src/archive.rs
//
// A directory of processed crash documents standing in for the crash
// reporting service. Aggregations are computed in memory.

use crate::error::ServiceError;
use crate::progress::stage_bar;
use crate::sources::{
    BuildFacet, CrashPayloads, CrashSearch, ProcessedCrash, SearchFilter, ShapeFacet, SignatureShapes, Term,
};
use crate::window::BuildId;
use chrono::{DateTime, Utc};
use indicatif::ProgressIterator;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// One archived crash: search metadata plus its processed payload
#[derive(Debug, Clone, Deserialize)]
pub struct ArchivedCrash {
    pub signature: String,
    pub product: String,
    pub release_channel: String,
    #[serde(default)]
    pub version: String,
    /// Build id
    pub build: String,
    pub date_processed: DateTime<Utc>,
    /// Internal stack shape; derived from the crashing thread when absent
    #[serde(default)]
    pub proto_signature: Option<String>,
    #[serde(flatten)]
    pub payload: ProcessedCrash,
}

impl ArchivedCrash {
    fn shape(&self) -> String {
        if let Some(shape) = &self.proto_signature {
            return shape.clone();
        }
        self.payload
            .crashing_frames()
            .map(|frames| {
                frames
                    .iter()
                    .filter_map(|frame| frame.function.as_deref())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .unwrap_or_default()
    }

    fn matches(&self, filter: &SearchFilter) -> bool {
        let Some(build) = BuildId::parse(&self.build) else {
            return false;
        };
        self.product == filter.product
            && self.release_channel == filter.channel
            && (filter.versions.is_empty() || filter.versions.contains(&self.version))
            && self.date_processed.date_naive() >= filter.date_from
            && build >= filter.build_from
            && build < filter.build_to
            && (filter.signatures.is_empty() || filter.signatures.contains(&self.signature))
    }
}

#[derive(Debug, Default)]
pub struct LocalArchive {
    crashes: Vec<ArchivedCrash>,
    by_uuid: HashMap<String, usize>,
}

impl LocalArchive {
    /// Loads every `*.json` document under `dir`; unreadable ones are skipped.
    pub fn open(dir: &Path, show_progress: bool) -> crate::error::Result<LocalArchive> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(|e| crate::error::Error::io(dir, e))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut crashes = Vec::with_capacity(paths.len());
        let bar = stage_bar(paths.len(), "Loading crashes", show_progress);
        for path in paths.iter().progress_with(bar) {
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<ArchivedCrash>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(crash) => crashes.push(crash),
                Err(error) => warn!(path = %path.display(), %error, "skipping crash document"),
            }
        }
        info!(dir = %dir.display(), crashes = crashes.len(), "crash archive loaded");
        Ok(LocalArchive::from_crashes(crashes))
    }

    pub fn from_crashes(crashes: Vec<ArchivedCrash>) -> LocalArchive {
        let by_uuid = crashes.iter().enumerate().map(|(i, crash)| (crash.payload.uuid.clone(), i)).collect();
        LocalArchive { crashes, by_uuid }
    }

    fn matching<'a>(&'a self, filter: &'a SearchFilter) -> impl Iterator<Item = &'a ArchivedCrash> + 'a {
        self.crashes.iter().filter(move |crash| crash.matches(filter))
    }
}

/// The `cap` largest terms, ties broken by term
fn top_terms(counts: BTreeMap<String, u64>, cap: usize) -> Vec<Term> {
    let mut terms: Vec<Term> = counts.into_iter().map(|(term, count)| Term { term, count }).collect();
    terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    terms.truncate(cap);
    terms
}

impl CrashSearch for LocalArchive {
    fn signatures_by_build(&self, filter: &SearchFilter, facets_size: usize) -> Result<Vec<BuildFacet>, ServiceError> {
        let mut builds: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for crash in self.matching(filter) {
            *builds.entry(crash.build.clone()).or_default().entry(crash.signature.clone()).or_default() += 1;
        }
        let totals: BTreeMap<String, u64> =
            builds.iter().map(|(build, signatures)| (build.clone(), signatures.values().sum())).collect();

        Ok(top_terms(totals, facets_size)
            .into_iter()
            .map(|Term { term, count }| {
                let signatures = builds.remove(&term).map(|s| top_terms(s, facets_size)).unwrap_or_default();
                BuildFacet { term, count, signatures }
            })
            .collect())
    }

    fn stack_shapes(&self, filter: &SearchFilter, facets_size: usize) -> Result<Vec<SignatureShapes>, ServiceError> {
        // signature -> shape -> uuids
        let mut grouped: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for crash in self.matching(filter) {
            grouped
                .entry(crash.signature.clone())
                .or_default()
                .entry(crash.shape())
                .or_default()
                .push(crash.payload.uuid.clone());
        }

        Ok(grouped
            .into_iter()
            .map(|(signature, mut shapes)| {
                let counts = shapes.iter().map(|(shape, uuids)| (shape.clone(), uuids.len() as u64)).collect();
                let shapes = top_terms(counts, facets_size)
                    .into_iter()
                    .map(|Term { term, count }| ShapeFacet {
                        uuids: shapes.remove(&term).unwrap_or_default(),
                        shape: term,
                        count,
                    })
                    .collect();
                SignatureShapes { signature, shapes }
            })
            .collect())
    }
}

impl CrashPayloads for LocalArchive {
    fn processed_crash(&self, uuid: &str) -> Result<Option<ProcessedCrash>, ServiceError> {
        Ok(self.by_uuid.get(uuid).map(|&i| self.crashes[i].payload.clone()))
    }
}
