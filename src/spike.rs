// src/spike.rs

use crate::model::Signature;
use crate::sources::BuildFacet;
use crate::window::{BuildId, Window};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Daily totals of one signature over every window day, oldest first
pub type DailyCounts = BTreeMap<NaiveDate, u64>;

/// A signature spikes when it was (almost) absent on every day but the last
/// and reaches `threshold` on the last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeRule {
    pub threshold: u64,
    /// Largest count still considered "absent"; 0 for the strict rule
    pub baseline_max: u64,
}

impl SpikeRule {
    pub fn is_spiking(&self, counts: &DailyCounts) -> bool {
        let mut totals: Vec<u64> = counts.values().copied().collect();
        let Some(last) = totals.pop() else {
            return false;
        };
        totals.iter().all(|&count| count <= self.baseline_max) && last >= self.threshold
    }
}

/// Folds build-day facets into per signature, per UTC day totals. Every
/// window day is present; builds bucketing outside the window are ignored.
pub fn bucket_by_day(window: &Window, facets: &[BuildFacet]) -> BTreeMap<Signature, DailyCounts> {
    let empty: DailyCounts = window.days().map(|day| (day, 0)).collect();
    let mut buckets: BTreeMap<Signature, DailyCounts> = BTreeMap::new();

    for facet in facets {
        let Some(day) = BuildId::parse(&facet.term).and_then(|build| build.utc_date(&window.offset)) else {
            debug!(build_id = %facet.term, "ignoring unparsable build id");
            continue;
        };
        if !window.contains_day(day) {
            debug!(build_id = %facet.term, %day, "build outside window days");
            continue;
        }
        for term in &facet.signatures {
            let counts = buckets.entry(term.term.clone()).or_insert_with(|| empty.clone());
            *counts.entry(day).or_default() += term.count;
        }
    }
    buckets
}

/// Spiking signatures, sorted.
pub fn spiking_signatures(buckets: &BTreeMap<Signature, DailyCounts>, rule: SpikeRule) -> Vec<Signature> {
    buckets
        .iter()
        .filter(|(_, counts)| rule.is_spiking(counts))
        .map(|(signature, _)| signature.clone())
        .collect()
}
