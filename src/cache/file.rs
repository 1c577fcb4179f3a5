//! File-backed caches: one JSON map per file, or one JSON blob per key.

use super::{CacheError, CachePort};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write via a sibling temp file and rename so a crash never leaves a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

/// A whole map persisted to a single JSON file, rewritten on every `put`.
#[derive(Debug, Clone)]
pub struct JsonFileCache<K, V> {
    path: PathBuf,
    entries: BTreeMap<K, V>,
}

impl<K, V> JsonFileCache<K, V>
where
    K: Ord + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Open the cache file. A missing file is an empty cache; an unreadable one
    /// is logged and ignored so the run can rebuild it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Ignoring cache file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        debug!("Opened cache {} with {} entries", path.display(), entries.len());
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&self.entries)?;
        write_atomic(&self.path, &bytes)
    }
}

impl<K, V> CachePort<K, V> for JsonFileCache<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned + Send,
    V: Clone + Serialize + DeserializeOwned + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) -> Result<(), CacheError> {
        self.entries.insert(key, value);
        self.persist()
    }
}

/// Key of a daily feed snapshot: `<yyyymmdd>_<feed>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub feed: String,
    pub day: NaiveDate,
}

impl SnapshotKey {
    pub fn new(feed: &str, day: NaiveDate) -> Self {
        Self {
            feed: feed.to_string(),
            day,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.day.format("%Y%m%d"), self.feed)
    }
}

/// Directory of snapshot blobs, one file per feed per day.
#[derive(Debug, Clone)]
pub struct SnapshotDir<V> {
    dir: PathBuf,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<V> SnapshotDir<V> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl<V> CachePort<SnapshotKey, V> for SnapshotDir<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &SnapshotKey) -> Option<V> {
        let path = self.path_for(key);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable snapshot {}: {}", path.display(), e);
                None
            }
        }
    }

    fn put(&mut self, key: SnapshotKey, value: V) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&value)?;
        write_atomic(&self.path_for(&key), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;
    use std::str::FromStr;
    use tempfile::TempDir;

    #[test]
    fn json_file_cache_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("historicalRatesAUD.json");
        let day = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();

        let mut cache: JsonFileCache<NaiveDate, Decimal> = JsonFileCache::open(&path);
        assert!(cache.is_empty());
        cache.put(day, Decimal::from_str("1.2875").unwrap()).unwrap();

        let reopened: JsonFileCache<NaiveDate, Decimal> = JsonFileCache::open(&path);
        assert_eq!(reopened.get(&day), Some(Decimal::from_str("1.2875").unwrap()));
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"2021-03-04\""));
    }

    #[test]
    fn corrupt_cache_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rates.json");
        fs::write(&path, b"{not json").unwrap();
        let cache: JsonFileCache<NaiveDate, Decimal> = JsonFileCache::open(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn snapshot_dir_one_file_per_feed_and_day() {
        let dir = TempDir::new().unwrap();
        let mut snapshots: SnapshotDir<Vec<String>> = SnapshotDir::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        let key = SnapshotKey::new("activity", day);

        assert_eq!(snapshots.get(&key), None);
        snapshots
            .put(key.clone(), vec!["a".to_string(), "b".to_string()])
            .unwrap();
        assert!(dir.path().join("20210304_activity.json").exists());
        assert_eq!(
            snapshots.get(&key),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(snapshots.get(&SnapshotKey::new("activity_mr", day)), None);
    }
}
