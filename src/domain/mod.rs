//! Core domain types shared across the orchestration fabric.
//!
//! Every normalized fragment lives here as a typed struct; only the LLM
//! boundary (see `llm`) keeps a free-form JSON shape.

mod bundle;
mod filing;
mod guardrails;
mod institutional;
mod momentum;
mod news;
mod price;
mod request_key;
mod signals;

pub use bundle::{AnalysisBundle, AnalysisOutput, BundleInput, LlmUsage};
pub use filing::{FilingDescriptor, FilingSummary, SummaryKind};
pub use guardrails::Guardrails;
pub use institutional::{AnalystAction, HolderRow, InsiderActivity, InstitutionalSignal, InstitutionalSnapshot};
pub use momentum::{EtfProxy, MomentumMetrics, MovingAverages, PeriodReturns, PriceVsMa, Trend};
pub use news::{NewsArticle, NewsFragment, NewsSentiment};
pub use price::{PriceKind, PriceMeta};
pub use request_key::RequestKey;
pub use signals::{
    AnalystSignals, EstimatesFragment, GradesFragment, PriceTargetConfidence, PriceTargetSummary,
    RatingsFragment,
};
