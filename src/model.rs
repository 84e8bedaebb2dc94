// src/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A crash signature, the stable fingerprint many crashes map to
pub type Signature = String;

/// Ordered function names of a crashing thread, the dedup key of a backtrace
pub type BacktraceKey = Vec<String>;

/// One frame of a crashing thread, as extracted from a processed crash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    /// Raw source reference, e.g. `hg:hg.mozilla.org/mozilla-central:xpcom/glue/nsTArray.h:6e191a55c3d2`
    pub file: Option<String>,
    /// 0 when unknown
    pub line: u32,
}

/// A revision that touched a file inside the lookback window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub node: String,
    #[serde(with = "pushdate")]
    pub pushdate: DateTime<Utc>,
}

/// Resolved source information for one frame of a backtrace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Empty when the frame carries no file reference
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Most recent push first
    #[serde(default)]
    pub patches: Vec<Patch>,
}

/// The persisted unit of dedup: one function-name sequence within a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctBacktrace {
    pub bt: Vec<(String, FileInfo)>,
    pub count: u64,
    /// Recorded when the entry was attributed; `has_patches` recomputes it from `bt`
    #[serde(default)]
    pub haspatches: bool,
    pub uuids: Vec<String>,
}

impl DistinctBacktrace {
    pub fn key(&self) -> BacktraceKey {
        self.bt.iter().map(|(function, _)| function.clone()).collect()
    }

    /// True when at least one frame is attributable to a recent patch
    pub fn has_patches(&self) -> bool {
        self.bt.iter().any(|(_, info)| !info.patches.is_empty())
    }
}

/// Backtraces grouped by signature, for one product and channel
pub type SignatureResults = BTreeMap<Signature, Vec<DistinctBacktrace>>;

/// Everything persisted for a single day: product -> channel -> signature -> backtraces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayCache {
    pub products: BTreeMap<String, BTreeMap<String, SignatureResults>>,
}

impl DayCache {
    pub fn results(&self, product: &str, channel: &str) -> Option<&SignatureResults> {
        self.products.get(product).and_then(|channels| channels.get(channel))
    }

    pub fn results_mut(&mut self, product: &str, channel: &str) -> &mut SignatureResults {
        self.products
            .entry(product.to_string())
            .or_default()
            .entry(channel.to_string())
            .or_default()
    }

    /// Summarizes what this cache already knows for `product`/`channel`.
    ///
    /// Returns `None` when there is nothing cached for the pair or when no
    /// crash identifier was ever recorded for it, in which case a run starts
    /// from a clean slate.
    pub fn index(&self, product: &str, channel: &str) -> Option<CacheIndex> {
        let results = self.results(product, channel)?;
        let mut index = CacheIndex::default();
        for (signature, backtraces) in results {
            let keys = index.keys.entry(signature.clone()).or_default();
            for backtrace in backtraces {
                index.uuids.extend(backtrace.uuids.iter().cloned());
                keys.insert(backtrace.key());
            }
        }
        if index.uuids.is_empty() {
            None
        } else {
            Some(index)
        }
    }
}

/// Crash identifiers already looked up and backtrace keys already resolved
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    pub uuids: HashSet<String>,
    pub keys: HashMap<Signature, HashSet<BacktraceKey>>,
}

impl CacheIndex {
    pub fn knows_uuid(&self, uuid: &str) -> bool {
        self.uuids.contains(uuid)
    }

    pub fn has_backtrace(&self, signature: &str, key: &BacktraceKey) -> bool {
        self.keys.get(signature).is_some_and(|keys| keys.contains(key))
    }
}

/// Push dates are stored as `2016-08-12 16:45:27+00:00`
mod pushdate {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&raw, FORMAT)
            .map(|date| date.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn backtrace(functions: &[&str], uuids: &[&str], patched: bool) -> DistinctBacktrace {
        let patches = if patched {
            vec![Patch { node: "2c42c82251d6".into(), pushdate: Utc.with_ymd_and_hms(2016, 8, 12, 16, 45, 27).unwrap() }]
        } else {
            Vec::new()
        };
        DistinctBacktrace {
            bt: functions
                .iter()
                .map(|f| (f.to_string(), FileInfo { filename: "xpcom/glue/nsTArray.h".into(), line: Some(10), node: Some("6e191a55c3d2".into()), patches: patches.clone() }))
                .collect(),
            count: uuids.len() as u64,
            haspatches: patched,
            uuids: uuids.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn serializes_in_persisted_shape() {
        let mut cache = DayCache::default();
        cache.results_mut("Firefox", "nightly").insert("sig".into(), vec![backtrace(&["f"], &["u1"], true)]);

        let json = serde_json::to_string(&cache).unwrap();
        assert_eq!(
            json,
            r#"{"Firefox":{"nightly":{"sig":[{"bt":[["f",{"filename":"xpcom/glue/nsTArray.h","line":10,"node":"6e191a55c3d2","patches":[{"node":"2c42c82251d6","pushdate":"2016-08-12 16:45:27+00:00"}]}]],"count":1,"haspatches":true,"uuids":["u1"]}]}}}"#
        );
        let back: DayCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }

    #[test]
    fn haspatches_flag_survives_reload() {
        let raw = r#"{"Firefox":{"nightly":{"sig":[{"bt":[["f",{"filename":"","patches":[]}]],"count":1,"haspatches":true,"uuids":["u1"]}]}}}"#;
        let cache: DayCache = serde_json::from_str(raw).unwrap();
        assert!(cache.results("Firefox", "nightly").unwrap()["sig"][0].haspatches);
        assert_eq!(serde_json::to_string(&cache).unwrap(), raw);

        let legacy: DayCache =
            serde_json::from_str(r#"{"Firefox":{"nightly":{"sig":[{"bt":[],"count":1,"uuids":["u1"]}]}}}"#).unwrap();
        assert!(!legacy.results("Firefox", "nightly").unwrap()["sig"][0].haspatches);
    }

    #[test]
    fn frame_without_file_keeps_minimal_shape() {
        let info = FileInfo::default();
        assert_eq!(serde_json::to_string(&info).unwrap(), r#"{"filename":"","patches":[]}"#);
    }

    #[test]
    fn has_patches_needs_one_attributable_frame() {
        assert!(backtrace(&["f", "g"], &["u1"], true).has_patches());
        assert!(!backtrace(&["f", "g"], &["u1"], false).has_patches());
    }

    #[test]
    fn index_collects_uuids_and_keys() {
        let mut cache = DayCache::default();
        cache
            .results_mut("Firefox", "nightly")
            .insert("sig".into(), vec![backtrace(&["f", "g"], &["u1", "u2"], true)]);

        let index = cache.index("Firefox", "nightly").unwrap();
        assert!(index.knows_uuid("u2"));
        assert!(index.has_backtrace("sig", &vec!["f".into(), "g".into()]));
        assert!(!index.has_backtrace("sig", &vec!["f".into()]));
        assert!(cache.index("Firefox", "beta").is_none());
    }

    #[test]
    fn index_is_absent_without_uuids() {
        let mut cache = DayCache::default();
        cache.results_mut("Firefox", "nightly");
        assert!(cache.index("Firefox", "nightly").is_none());
    }
}
