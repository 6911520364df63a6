//! C1: content-keyed disk cache. One file per URL-encoded key holding a
//! JSON document; freshness is decided by file `mtime` against a caller
//! supplied `max_age` (spec.md §4.1).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Sentinel written to cache a known-absent upstream result, so absence
/// itself is cached and doesn't trigger retry storms (spec.md §4.1, §7).
pub const EMPTY_SENTINEL_KEY: &str = "__empty";

pub struct KvCache {
    root: PathBuf,
}

impl KvCache {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = urlencoding::encode(key).into_owned();
        self.root.join(format!("{encoded}.json"))
    }

    /// Given `(key, max_age)`, returns the stored value iff
    /// `now - mtime <= max_age`, else a cache miss.
    pub fn read<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
        let path = self.path_for(key);
        let metadata = std::fs::metadata(&path).ok()?;
        let modified = metadata.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age.as_secs() as i64 > max_age.num_seconds().max(0) {
            debug!(key, "kv cache stale");
            return None;
        }
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "kv cache entry failed to deserialize");
                None
            }
        }
    }

    /// Reads without a freshness check, for callers that implement their
    /// own staleness policy (e.g. the orchestrator's per-fragment TTLs).
    pub fn read_unconditional<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let bytes = std::fs::read(&path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Overwrites the key's file atomically: write to a temp file in the
    /// same directory, then rename.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(value)?;
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Records a negative result so upstream absence is also cached
    /// (spec.md §4.1, §7).
    pub fn write_empty(&self, key: &str) -> anyhow::Result<()> {
        self.write(key, &serde_json::json!({ EMPTY_SENTINEL_KEY: true }))
    }

    pub fn is_empty_sentinel(value: &Value) -> bool {
        value.get(EMPTY_SENTINEL_KEY).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Prefix invalidation by ticker (spec.md §4.1): traverses key names
    /// (decoded from filenames) and unlinks matches. Idempotent.
    pub fn clear_for_ticker(&self, ticker: &str, date: Option<&str>) -> anyhow::Result<usize> {
        let needle_ticker = ticker.to_ascii_uppercase();
        let mut cleared = 0usize;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = file_stem_without_json(&path) else { continue };
            let Ok(decoded) = urlencoding::decode(&stem) else { continue };
            let decoded = decoded.into_owned();
            if !decoded.to_ascii_uppercase().contains(&needle_ticker) {
                continue;
            }
            if let Some(date) = date {
                if !decoded.contains(date) {
                    continue;
                }
            }
            if std::fs::remove_file(&path).is_ok() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

fn file_stem_without_json(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".json").map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_fresh_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KvCache::new(dir.path()).unwrap();
        cache.write("fh_quote_AAPL_2025-11-08", &serde_json::json!({"price": 1.0})).unwrap();
        let value: serde_json::Value = cache.read("fh_quote_AAPL_2025-11-08", Duration::seconds(60)).unwrap();
        assert_eq!(value["price"], 1.0);
    }

    #[test]
    fn stale_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KvCache::new(dir.path()).unwrap();
        cache.write("k", &serde_json::json!({"v": 1})).unwrap();
        let value: Option<serde_json::Value> = cache.read("k", Duration::seconds(-1));
        assert!(value.is_none());
    }

    #[test]
    fn missing_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KvCache::new(dir.path()).unwrap();
        let value: Option<serde_json::Value> = cache.read("nope", Duration::seconds(60));
        assert!(value.is_none());
    }

    #[test]
    fn empty_sentinel_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KvCache::new(dir.path()).unwrap();
        cache.write_empty("filings_ZZZZ").unwrap();
        let value: serde_json::Value = cache.read_unconditional("filings_ZZZZ").unwrap();
        assert!(KvCache::is_empty_sentinel(&value));
    }

    #[test]
    fn clear_for_ticker_is_idempotent_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KvCache::new(dir.path()).unwrap();
        cache.write("filing_summary_AAPL_10-K_2024-01-02", &serde_json::json!({})).unwrap();
        cache.write("filing_summary_MSFT_10-K_2024-01-02", &serde_json::json!({})).unwrap();

        let cleared = cache.clear_for_ticker("AAPL", None).unwrap();
        assert_eq!(cleared, 1);

        let second_pass = cache.clear_for_ticker("AAPL", None).unwrap();
        assert_eq!(second_pass, 0);

        let still_there: Option<serde_json::Value> =
            cache.read_unconditional("filing_summary_MSFT_10-K_2024-01-02");
        assert!(still_there.is_some());
    }
}
