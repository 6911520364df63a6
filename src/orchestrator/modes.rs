//! Request mode machine (spec.md §4.7): selects which fragments are
//! required, whether the LLM step runs synchronously, and the batch
//! worker-pool sizing.

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Full,
    CachedOnly,
    MetricsOnly,
    Deferred,
}

impl Mode {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.unwrap_or("full") {
            "full" => Ok(Mode::Full),
            "cached-only" => Ok(Mode::CachedOnly),
            "metrics-only" => Ok(Mode::MetricsOnly),
            "deferred" => Ok(Mode::Deferred),
            other => Err(AppError::Validation(format!("unknown mode: {other}"))),
        }
    }

    /// Whether this mode calls the LLM synchronously within the request.
    pub fn calls_llm_synchronously(self) -> bool {
        matches!(self, Mode::Full)
    }

    /// Whether this mode enqueues a background full rerun after
    /// returning synchronously (spec.md §4.7, `deferred`).
    pub fn enqueues_background_full_rerun(self) -> bool {
        matches!(self, Mode::Deferred)
    }

    /// The model-variant suffix this mode's bundle is stored/looked up
    /// under (spec.md §4.7 step 2: `<model>__metrics` if LLM is skipped
    /// else `<model>__full`).
    pub fn variant_suffix(self) -> &'static str {
        if self.calls_llm_synchronously() {
            "__full"
        } else {
            "__metrics"
        }
    }

    /// spec.md §4.10: `resolve_concurrency(mode)`.
    pub fn resolve_concurrency(self, default: usize) -> usize {
        match self {
            Mode::MetricsOnly => default.min(2),
            Mode::CachedOnly => (default / 2).max(1),
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!(Mode::parse(Some("full")).unwrap(), Mode::Full);
        assert_eq!(Mode::parse(Some("cached-only")).unwrap(), Mode::CachedOnly);
        assert_eq!(Mode::parse(None).unwrap(), Mode::Full);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Mode::parse(Some("bogus")).is_err());
    }

    #[test]
    fn concurrency_scales_per_mode() {
        assert_eq!(Mode::MetricsOnly.resolve_concurrency(5), 2);
        assert_eq!(Mode::CachedOnly.resolve_concurrency(5), 2);
        assert_eq!(Mode::Full.resolve_concurrency(5), 5);
    }
}
