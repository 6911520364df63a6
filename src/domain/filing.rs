use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One filing reference as discovered upstream, prior to summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingDescriptor {
    pub form: String,
    pub filing_date: NaiveDate,
    pub report_date: Option<NaiveDate>,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Llm,
    Fallback,
}

/// A normalized MD&A summary. Only `fallback` summaries carry
/// `mda_excerpt` (spec.md §3). A `fallback` may be upgraded to `llm` on
/// a later request once an LLM key becomes available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingSummary {
    pub form: String,
    pub filing_date: NaiveDate,
    pub report_date: Option<NaiveDate>,
    pub mda_summary: String,
    pub summary_kind: SummaryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mda_excerpt: Option<String>,
}

impl FilingSummary {
    pub fn fallback(form: &str, filing_date: NaiveDate, report_date: Option<NaiveDate>, mda_text: &str) -> Self {
        let excerpt: String = mda_text.chars().take(400).collect();
        Self {
            form: form.to_string(),
            filing_date,
            report_date,
            mda_summary: "MD&A summary unavailable; excerpt provided.".to_string(),
            summary_kind: SummaryKind::Fallback,
            mda_excerpt: Some(excerpt),
        }
    }

    pub fn llm(form: &str, filing_date: NaiveDate, report_date: Option<NaiveDate>, summary: String) -> Self {
        Self {
            form: form.to_string(),
            filing_date,
            report_date,
            mda_summary: summary,
            summary_kind: SummaryKind::Llm,
            mda_excerpt: None,
        }
    }

    pub fn is_upgradeable(&self) -> bool {
        self.summary_kind == SummaryKind::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_carries_excerpt_capped_at_400() {
        let text = "x".repeat(1000);
        let s = FilingSummary::fallback("10-K", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), None, &text);
        assert_eq!(s.mda_excerpt.unwrap().len(), 400);
        assert!(s.is_upgradeable());
    }

    #[test]
    fn llm_summary_has_no_excerpt() {
        let s = FilingSummary::llm(
            "10-K",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            None,
            "summary".to_string(),
        );
        assert!(s.mda_excerpt.is_none());
        assert!(!s.is_upgradeable());
    }
}
