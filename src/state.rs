//! Shared application state, built once in `main` and handed to every
//! axum handler via `State` (grounded in the teacher's `main.rs`
//! `AppState` struct, which bundles each subsystem behind an `Arc`).

use std::sync::Arc;

use crate::adapters::analyst::AnalystAdapter;
use crate::adapters::filings::FilingsAdapter;
use crate::adapters::institutional::InstitutionalAdapter;
use crate::adapters::macro_data::MacroAdapter;
use crate::adapters::news::NewsAdapter;
use crate::adapters::quotes::QuotesAdapter;
use crate::adapters::transcripts::TranscriptsAdapter;
use crate::cache::{KvCache, ProcessCache};
use crate::config::Config;
use crate::deferred::DeferredQueue;
use crate::llm::LlmClient;
use crate::store::{LlmCache, ResultsStore};
use crate::domain::AnalystSignals;
use crate::usage_monitor::UsageMonitor;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;

pub struct Adapters {
    pub quotes: QuotesAdapter,
    pub filings: FilingsAdapter,
    pub analyst: AnalystAdapter,
    pub institutional: InstitutionalAdapter,
    pub news: NewsAdapter,
    pub transcripts: TranscriptsAdapter,
    pub macro_data: MacroAdapter,
}

impl Adapters {
    pub fn new(cfg: &Config) -> Self {
        Self {
            quotes: QuotesAdapter::new(cfg),
            filings: FilingsAdapter::new(cfg),
            analyst: AnalystAdapter::new(cfg),
            institutional: InstitutionalAdapter::new(cfg),
            news: NewsAdapter::new(cfg),
            transcripts: TranscriptsAdapter::new(cfg),
            macro_data: MacroAdapter::new(cfg),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv_cache: Arc<KvCache>,
    pub process_cache: Arc<ProcessCache<Value>>,
    pub results_store: Arc<ResultsStore>,
    pub llm_cache: Arc<LlmCache>,
    pub llm_client: Arc<LlmClient>,
    pub adapters: Arc<Adapters>,
    pub usage_monitor: Arc<UsageMonitor>,
    pub deferred_queue: Arc<DeferredQueue>,
    /// In-flight collapse map for the analyst-signals aggregate, keyed
    /// by `"{ticker}|{baseline_date}"` (spec.md §4.6.4): concurrent
    /// callers for the same key await the first future's result. The
    /// entry is removed once that future resolves, so this never
    /// becomes a process-lifetime cache.
    pub analyst_inflight: Arc<DashMap<String, Arc<OnceCell<AnalystSignals>>>>,
    /// Per-`RequestKey` assembly lock: at most one orchestrator
    /// assembly runs per key per process (spec.md §5 ordering
    /// guarantee ii).
    pub assembly_locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let kv_cache = Arc::new(KvCache::new(&config.kv_cache_dir)?);
        let process_cache = Arc::new(ProcessCache::new(std::time::Duration::from_secs(30)));
        let results_store = Arc::new(ResultsStore::open(&config.results_db_path)?);
        let llm_cache = Arc::new(LlmCache::open(&config.results_db_path)?);
        let llm_client = Arc::new(LlmClient::new(&config, llm_cache.clone()));
        let adapters = Arc::new(Adapters::new(&config));
        let usage_monitor = Arc::new(UsageMonitor::new());
        let deferred_queue = Arc::new(DeferredQueue::spawn());
        let analyst_inflight = Arc::new(DashMap::new());
        let assembly_locks = Arc::new(DashMap::new());

        Ok(Self {
            config,
            kv_cache,
            process_cache,
            results_store,
            llm_cache,
            llm_client,
            adapters,
            usage_monitor,
            deferred_queue,
            analyst_inflight,
            assembly_locks,
        })
    }
}
