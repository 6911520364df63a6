//! C9: LLM client. Prompt assembly, structured JSON request, repair
//! fallback, usage metering, payload-hash caching. Modeled on the
//! teacher's `vault::llm::OpenRouterClient` chat-completion client,
//! extended with the cache/dedup/repair contract spec.md §4.9 requires.

mod client;
mod prompt;

pub use client::{LlmClient, LlmOutcome};
pub use prompt::{analysis_prompt, summarization_prompt, PromptKind};
