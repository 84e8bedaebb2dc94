// src/sampler.rs

use crate::config::Settings;
use crate::model::{CacheIndex, Signature};
use crate::sources::{CrashSearch, SearchFilter, SignatureShapes};
use crate::window::Window;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One representative crash of a distinct stack shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub uuid: String,
    /// Number of crashes sharing the shape
    pub count: u64,
}

/// Picks one crash per distinct stack shape of every spiking signature,
/// preferring crashes the cache already knows about.
pub fn select_samples(
    search: &dyn CrashSearch,
    settings: &Settings,
    window: &Window,
    spiking: &[Signature],
    index: Option<&CacheIndex>,
) -> BTreeMap<Signature, Vec<Sample>> {
    let responses: Vec<Vec<SignatureShapes>> = spiking
        .par_chunks(settings.signature_chunk)
        .map(|chunk| {
            let filter = SearchFilter {
                product: settings.product.clone(),
                channel: settings.channel.clone(),
                versions: settings.versions.clone(),
                date_from: window.start_date,
                build_from: window.recent_start_build.clone(),
                build_to: window.end_build.clone(),
                signatures: chunk.to_vec(),
            };
            search.stack_shapes(&filter, settings.facets_size).unwrap_or_else(|e| {
                warn!(signatures = chunk.len(), error = %e, "stack shape query failed");
                Vec::new()
            })
        })
        .collect();

    let mut samples: BTreeMap<Signature, Vec<Sample>> = BTreeMap::new();
    for shapes in responses.into_iter().flatten() {
        let chosen = samples.entry(shapes.signature.clone()).or_default();
        for facet in shapes.shapes {
            let Some(uuid) = pick_uuid(&facet.uuids, index) else {
                debug!(signature = %shapes.signature, shape = %facet.shape, "shape without crash id");
                continue;
            };
            chosen.push(Sample { uuid, count: facet.count });
        }
    }
    samples
}

fn pick_uuid(uuids: &[String], index: Option<&CacheIndex>) -> Option<String> {
    let known = index.and_then(|index| uuids.iter().find(|uuid| index.knows_uuid(uuid)));
    known.or_else(|| uuids.first()).cloned()
}
