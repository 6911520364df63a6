pub mod llm_cache;
pub mod results_store;

pub use llm_cache::LlmCache;
pub use results_store::ResultsStore;
