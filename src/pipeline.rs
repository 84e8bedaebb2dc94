// src/pipeline.rs

use crate::backtrace::resolve_backtraces;
use crate::config::Settings;
use crate::error::Result;
use crate::merge::{merge_run, RunOutcome};
use crate::model::Signature;
use crate::sampler::select_samples;
use crate::sources::{CrashPayloads, CrashSearch, PatchHistory, SearchFilter};
use crate::spike::{bucket_by_day, spiking_signatures, SpikeRule};
use crate::store::CacheStore;
use crate::walker::walk_files;
use crate::window::Window;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// The collaborators a run reads from
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub search: &'a dyn CrashSearch,
    pub payloads: &'a dyn CrashPayloads,
    pub history: &'a dyn PatchHistory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub spiking: usize,
    pub sampled: usize,
    pub walked_files: usize,
    pub inserted: usize,
    pub dropped: usize,
    pub absorbed: usize,
}

/// Signatures absent from every window day but the last, where they reach the threshold.
pub fn detect_spikes(search: &dyn CrashSearch, settings: &Settings, window: &Window) -> Vec<Signature> {
    let filter = SearchFilter {
        product: settings.product.clone(),
        channel: settings.channel.clone(),
        versions: settings.versions.clone(),
        date_from: window.start_date,
        build_from: window.start_build.clone(),
        build_to: window.end_build.clone(),
        signatures: Vec::new(),
    };
    let facets = search.signatures_by_build(&filter, settings.facets_size).unwrap_or_else(|e| {
        warn!(error = %e, "build aggregation query failed");
        Vec::new()
    });
    debug!(builds = facets.len(), crashes = facets.iter().map(|f| f.count).sum::<u64>(), "build facets");
    let buckets = bucket_by_day(window, &facets);
    let rule = SpikeRule { threshold: settings.threshold, baseline_max: settings.baseline_max };
    spiking_signatures(&buckets, rule)
}

/// Runs the whole pipeline for `reference` and folds the result into that
/// day's cache. The store stays locked from load to store.
pub fn generate(services: Services<'_>, settings: &Settings, store: &CacheStore, reference: NaiveDate) -> Result<RunSummary> {
    let window = Window::resolve(reference, settings.lookback_days, settings.reporting_offset)?;
    info!(
        date = %window.reference,
        product = %settings.product,
        channel = %settings.channel,
        start_build = window.start_build.as_str(),
        end_build = window.end_build.as_str(),
        start_date = %window.start_date,
        "generating"
    );

    let lock = store.lock()?;
    let mut cache = store.load(&lock, reference).unwrap_or_default();
    let index = cache.index(&settings.product, &settings.channel);

    let spiking = detect_spikes(services.search, settings, &window);
    info!(spiking = spiking.len(), "spiking signatures");
    for signature in &spiking {
        info!(%signature, "spike");
    }

    let samples = select_samples(services.search, settings, &window, &spiking, index.as_ref());
    let backtraces = resolve_backtraces(services.payloads, &samples, index.as_ref(), settings.show_progress);
    let patches = walk_files(services.history, settings, &window, &backtraces);
    let outcome = RunOutcome::collect(backtraces, &patches);
    let dropped = outcome.dropped;
    let stats = merge_run(&mut cache, &settings.product, &settings.channel, outcome);

    store.store(&lock, reference, &cache)?;

    let summary = RunSummary {
        spiking: spiking.len(),
        sampled: samples.values().map(Vec::len).sum(),
        walked_files: patches.len(),
        inserted: stats.inserted,
        dropped,
        absorbed: stats.absorbed,
    };
    info!(?summary, path = %store.path_for(reference).display(), "cache updated");
    Ok(summary)
}
