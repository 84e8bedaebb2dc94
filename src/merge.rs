// src/merge.rs

use crate::backtrace::RunBacktraces;
use crate::model::{BacktraceKey, DayCache, DistinctBacktrace, Signature};
use crate::walker::{attribute, FilePatches};
use std::collections::BTreeMap;

/// crash id -> crashes of its stack shape
pub type Contributions = BTreeMap<String, u64>;

/// An attributable backtrace first seen this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshBacktrace {
    pub backtrace: DistinctBacktrace,
    pub contributions: Contributions,
}

/// What one run adds to a day's cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub fresh: BTreeMap<Signature, Vec<FreshBacktrace>>,
    /// Contributions to backtraces the cache already holds
    pub absorbed: BTreeMap<Signature, BTreeMap<BacktraceKey, Contributions>>,
    /// Unattributable backtraces left out
    pub dropped: usize,
}

impl RunOutcome {
    pub fn collect(backtraces: RunBacktraces, patches: &FilePatches) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        for (signature, keyed) in backtraces {
            for (key, backtrace) in keyed {
                if backtrace.resolved {
                    outcome
                        .absorbed
                        .entry(signature.clone())
                        .or_default()
                        .insert(key, backtrace.contributions);
                    continue;
                }
                match attribute(&backtrace, patches) {
                    Some(attributed) => outcome.fresh.entry(signature.clone()).or_default().push(FreshBacktrace {
                        backtrace: attributed,
                        contributions: backtrace.contributions,
                    }),
                    None => outcome.dropped += 1,
                }
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    /// Crash ids added to backtraces already cached
    pub absorbed: usize,
}

/// Folds a run into the day's cache. Entries are never removed, and a crash
/// id already recorded on a backtrace is never counted twice, so merging the
/// same outcome again changes nothing.
pub fn merge_run(cache: &mut DayCache, product: &str, channel: &str, outcome: RunOutcome) -> MergeStats {
    let results = cache.results_mut(product, channel);
    let mut stats = MergeStats::default();

    for (signature, keyed) in outcome.absorbed {
        let Some(entries) = results.get_mut(&signature) else {
            continue;
        };
        for (key, contributions) in keyed {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.key() == key) {
                stats.absorbed += absorb(entry, &contributions);
            }
        }
    }

    for (signature, fresh) in outcome.fresh {
        let entries = results.entry(signature).or_default();
        for FreshBacktrace { backtrace, contributions } in fresh {
            let key = backtrace.key();
            match entries.iter_mut().find(|entry| entry.key() == key) {
                Some(entry) => stats.absorbed += absorb(entry, &contributions),
                None => {
                    entries.push(backtrace);
                    stats.inserted += 1;
                }
            }
        }
    }
    stats
}

fn absorb(entry: &mut DistinctBacktrace, contributions: &Contributions) -> usize {
    let mut added = 0;
    for (uuid, count) in contributions {
        if !entry.uuids.contains(uuid) {
            entry.uuids.push(uuid.clone());
            entry.count += count;
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileInfo, Patch};
    use crate::testing::pushed;
    use pretty_assertions::assert_eq;

    fn key(functions: &[&str]) -> BacktraceKey {
        functions.iter().map(|f| f.to_string()).collect()
    }

    fn entry(functions: &[&str], contributions: &[(&str, u64)]) -> DistinctBacktrace {
        let info = FileInfo {
            filename: "a.cpp".into(),
            line: Some(1),
            node: Some("abc".into()),
            patches: vec![Patch { node: "p1".into(), pushdate: pushed(17, 1) }],
        };
        DistinctBacktrace {
            bt: functions.iter().map(|f| (f.to_string(), info.clone())).collect(),
            count: contributions.iter().map(|(_, c)| c).sum(),
            haspatches: true,
            uuids: contributions.iter().map(|(u, _)| u.to_string()).collect(),
        }
    }

    fn fresh(functions: &[&str], contributions: &[(&str, u64)]) -> FreshBacktrace {
        FreshBacktrace {
            backtrace: entry(functions, contributions),
            contributions: contributions.iter().map(|(u, c)| (u.to_string(), *c)).collect(),
        }
    }

    fn cached() -> DayCache {
        let mut cache = DayCache::default();
        cache.results_mut("Firefox", "nightly").insert("old".into(), vec![entry(&["f", "g"], &[("u1", 2)])]);
        cache
    }

    #[test]
    fn new_signature_is_inserted_and_old_ones_untouched() {
        let mut cache = cached();
        let before = cache.results("Firefox", "nightly").unwrap()["old"].clone();
        let outcome = RunOutcome {
            fresh: BTreeMap::from([("new".to_string(), vec![fresh(&["h"], &[("u9", 6)])])]),
            ..RunOutcome::default()
        };

        let stats = merge_run(&mut cache, "Firefox", "nightly", outcome);

        let results = cache.results("Firefox", "nightly").unwrap();
        assert_eq!(stats, MergeStats { inserted: 1, absorbed: 0 });
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["new", "old"]);
        assert_eq!(results["old"], before);
        assert_eq!(results["new"], vec![entry(&["h"], &[("u9", 6)])]);
    }

    #[test]
    fn cached_backtrace_absorbs_new_crashes() {
        let mut cache = cached();
        let outcome = RunOutcome {
            absorbed: BTreeMap::from([(
                "old".to_string(),
                BTreeMap::from([(key(&["f", "g"]), Contributions::from([("u2".to_string(), 3)]))]),
            )]),
            ..RunOutcome::default()
        };

        merge_run(&mut cache, "Firefox", "nightly", outcome);

        let old = &cache.results("Firefox", "nightly").unwrap()["old"];
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].count, 5);
        assert_eq!(old[0].uuids, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn merging_twice_is_a_no_op() {
        let outcome = RunOutcome {
            fresh: BTreeMap::from([
                ("new".to_string(), vec![fresh(&["h"], &[("u9", 6)])]),
                ("old".to_string(), vec![fresh(&["k"], &[("u5", 1)])]),
            ]),
            absorbed: BTreeMap::from([(
                "old".to_string(),
                BTreeMap::from([(key(&["f", "g"]), Contributions::from([("u2".to_string(), 3)]))]),
            )]),
            dropped: 0,
        };
        let mut once = cached();
        merge_run(&mut once, "Firefox", "nightly", outcome.clone());
        let mut twice = once.clone();

        let stats = merge_run(&mut twice, "Firefox", "nightly", outcome);

        assert_eq!(stats, MergeStats::default());
        assert_eq!(twice, once);
    }

    #[test]
    fn same_key_in_fresh_and_cache_merges_instead_of_duplicating() {
        let mut cache = cached();
        let outcome = RunOutcome {
            fresh: BTreeMap::from([("old".to_string(), vec![fresh(&["f", "g"], &[("u1", 2), ("u3", 4)])])]),
            ..RunOutcome::default()
        };

        let stats = merge_run(&mut cache, "Firefox", "nightly", outcome);

        let old = &cache.results("Firefox", "nightly").unwrap()["old"];
        assert_eq!(stats.absorbed, 1);
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].count, 6);
    }

    #[test]
    fn other_products_and_channels_are_preserved() {
        let mut cache = cached();
        cache.results_mut("FennecAndroid", "beta").insert("x".into(), vec![entry(&["z"], &[("u7", 1)])]);
        let snapshot = cache.results("FennecAndroid", "beta").cloned();

        merge_run(&mut cache, "Firefox", "aurora", RunOutcome::default());

        assert_eq!(cache.results("FennecAndroid", "beta").cloned(), snapshot);
        assert!(cache.results("Firefox", "nightly").is_some());
        assert!(cache.results("Firefox", "aurora").unwrap().is_empty());
    }
}
