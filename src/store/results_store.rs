//! C3: durable, model-keyed index of finalized analysis bundles
//! (spec.md §3, §4.3). Grounded in the teacher's
//! `signals/db_storage.rs` WAL/pragma conventions.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};

use crate::domain::{AnalysisBundle, RequestKey};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS analysis_bundles (
    ticker TEXT NOT NULL,
    baseline_date TEXT NOT NULL,
    model_variant TEXT NOT NULL,
    bundle_json TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (ticker, baseline_date, model_variant)
);

CREATE INDEX IF NOT EXISTS idx_bundles_ticker
    ON analysis_bundles(ticker, baseline_date);
"#;

pub struct ResultsStore {
    conn: Mutex<Connection>,
}

impl ResultsStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Read is unconditional; freshness is decided by the caller against
    /// per-fragment TTLs (spec.md §4.3).
    pub fn get(&self, key: &RequestKey) -> anyhow::Result<Option<(AnalysisBundle, chrono::DateTime<Utc>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT bundle_json, updated_at FROM analysis_bundles
             WHERE ticker = ?1 AND baseline_date = ?2 AND model_variant = ?3",
        )?;
        let row = stmt
            .query_row(params![key.ticker, key.baseline_date.to_string(), key.model_variant], |row| {
                let bundle_json: String = row.get(0)?;
                let updated_at: String = row.get(1)?;
                Ok((bundle_json, updated_at))
            })
            .ok();

        let Some((bundle_json, updated_at)) = row else { return Ok(None) };
        let bundle: AnalysisBundle = serde_json::from_str(&bundle_json)?;
        let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc);
        Ok(Some((bundle, updated_at)))
    }

    /// Upsert; the bundle is the unit of atomicity (spec.md §4.3).
    pub fn put(&self, key: &RequestKey, bundle: &AnalysisBundle) -> anyhow::Result<()> {
        let bundle_json = serde_json::to_string(bundle)?;
        let updated_at = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO analysis_bundles (ticker, baseline_date, model_variant, bundle_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(ticker, baseline_date, model_variant)
             DO UPDATE SET bundle_json = excluded.bundle_json, updated_at = excluded.updated_at",
            params![key.ticker, key.baseline_date.to_string(), key.model_variant, bundle_json, updated_at],
        )?;
        Ok(())
    }

    /// Clears all three model-variant entries for `(ticker, baseline_date)`
    /// (spec.md §6 `/api/reset-cache`). `date` is optional: when absent,
    /// clears the ticker across every stored baseline date.
    pub fn clear_variants(&self, ticker: &str, date: Option<chrono::NaiveDate>, model: &str) -> anyhow::Result<usize> {
        let ticker = ticker.to_ascii_uppercase();
        let variants = RequestKey::sibling_variants(model);
        let conn = self.conn.lock();
        let mut cleared = 0usize;
        for variant in variants {
            let changed = match date {
                Some(date) => conn.execute(
                    "DELETE FROM analysis_bundles WHERE ticker = ?1 AND baseline_date = ?2 AND model_variant = ?3",
                    params![ticker, date.to_string(), variant],
                )?,
                None => conn.execute(
                    "DELETE FROM analysis_bundles WHERE ticker = ?1 AND model_variant = ?2",
                    params![ticker, variant],
                )?,
            };
            cleared += changed;
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BundleInput, Guardrails, PriceKind, PriceMeta};
    use chrono::NaiveDate;

    fn sample_bundle(ticker: &str, date: NaiveDate) -> AnalysisBundle {
        AnalysisBundle {
            input: BundleInput { ticker: ticker.to_string(), date },
            fetched_filings: vec![],
            fetched_price_meta: PriceMeta {
                value: 100.0,
                as_of: Utc::now(),
                source: "fmp".to_string(),
                kind: PriceKind::RealTime,
                extended: false,
                year_high: None,
                year_low: None,
                ma50: None,
                ma200: None,
                intraday: None,
                market_cap: None,
            },
            analysis: None,
            llm_usage: None,
            analysis_model: "gpt-4o".to_string(),
            news: None,
            momentum: None,
            institutional: None,
            earnings_call: None,
            analyst_signals: None,
            per_filing_summaries: vec![],
            analyst_metrics: None,
            macro_context: None,
            inputs: serde_json::json!({}),
            guardrails: Guardrails::default(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let store = ResultsStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let key = RequestKey::new("AAPL", date, "gpt-4o__full");
        store.put(&key, &sample_bundle("AAPL", date)).unwrap();

        let (bundle, _) = store.get(&key).unwrap().unwrap();
        assert_eq!(bundle.input.ticker, "AAPL");
    }

    #[test]
    fn upsert_overwrites() {
        let store = ResultsStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let key = RequestKey::new("AAPL", date, "gpt-4o__full");
        store.put(&key, &sample_bundle("AAPL", date)).unwrap();
        let mut second = sample_bundle("AAPL", date);
        second.fetched_price_meta.value = 200.0;
        store.put(&key, &second).unwrap();

        let (bundle, _) = store.get(&key).unwrap().unwrap();
        assert_eq!(bundle.fetched_price_meta.value, 200.0);
    }

    #[test]
    fn clear_variants_removes_all_three() {
        let store = ResultsStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        for variant in RequestKey::sibling_variants("gpt-4o") {
            let key = RequestKey::new("AAPL", date, variant);
            store.put(&key, &sample_bundle("AAPL", date)).unwrap();
        }

        let cleared = store.clear_variants("AAPL", Some(date), "gpt-4o").unwrap();
        assert_eq!(cleared, 3);

        let key = RequestKey::new("AAPL", date, "gpt-4o__full");
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn missing_key_is_none() {
        let store = ResultsStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let key = RequestKey::new("ZZZZ", date, "gpt-4o__full");
        assert!(store.get(&key).unwrap().is_none());
    }
}
