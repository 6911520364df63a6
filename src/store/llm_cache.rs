//! Separate LLM output cache keyed by `SHA-256(payload, prompt_version,
//! model)` for cross-request deduplication (spec.md §4.3, §4.9).

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS llm_outputs (
    payload_hash TEXT PRIMARY KEY,
    parsed_output_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub struct LlmCache {
    conn: Mutex<Connection>,
}

impl LlmCache {
    /// Shares a connection with the results store's schema migration by
    /// taking an already-open path; callers typically co-locate both in
    /// the same SQLite file.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn get(&self, payload_hash: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT parsed_output_json FROM llm_outputs WHERE payload_hash = ?1",
                params![payload_hash],
                |row| row.get(0),
            )
            .ok();
        Ok(value.map(|v| serde_json::from_str(&v)).transpose()?)
    }

    pub fn put(&self, payload_hash: &str, parsed_output: &serde_json::Value) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO llm_outputs (payload_hash, parsed_output_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(payload_hash) DO UPDATE SET
                parsed_output_json = excluded.parsed_output_json,
                updated_at = excluded.updated_at",
            params![payload_hash, serde_json::to_string(parsed_output)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
