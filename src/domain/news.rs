use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewsSentiment {
    #[serde(rename = "樂觀")]
    Bullish,
    #[serde(rename = "中性")]
    Neutral,
    #[serde(rename = "悲觀")]
    Bearish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub weight: f64,
    pub published_at: DateTime<Utc>,
    /// Tickers the vendor tagged this article with. Empty when the
    /// vendor response didn't carry a symbol field.
    pub symbols: Vec<String>,
}

impl NewsArticle {
    /// spec.md §4.6.6: filter to articles whose symbol set contains the
    /// target ticker. Untagged articles (empty `symbols`) are kept since
    /// the adapter query is already ticker-scoped and the vendor simply
    /// didn't echo a symbol field.
    pub fn mentions(&self, ticker: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s.eq_ignore_ascii_case(ticker))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsFragment {
    pub keywords: Vec<String>,
    pub articles: Vec<NewsArticle>,
    pub sentiment_label: NewsSentiment,
    pub summary: String,
    pub supporting_events: Vec<String>,
}

impl NewsFragment {
    /// spec.md §4.6.6: deterministic fallback keyword list when the LLM
    /// is disabled.
    pub fn fallback_keywords(ticker: &str) -> Vec<String> {
        vec![
            ticker.to_string(),
            format!("{ticker} earnings"),
            format!("{ticker} outlook"),
            "guidance".to_string(),
            "margin".to_string(),
        ]
    }

    /// spec.md §4.6.6: dedup by URL/title, preferring the highest-weight
    /// source; sort by `(weight, published_at)` descending; trim to limit.
    pub fn dedup_and_rank(mut articles: Vec<NewsArticle>, limit: usize) -> Vec<NewsArticle> {
        let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        let mut kept: Vec<NewsArticle> = Vec::new();
        articles.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        for article in articles.into_iter() {
            let dedup_key = format!(
                "{}|{}",
                article.url.to_ascii_lowercase(),
                article.title.to_ascii_lowercase()
            );
            if let Some(&idx) = seen.get(&dedup_key) {
                if kept[idx].weight >= article.weight {
                    continue;
                }
                kept[idx] = article;
            } else {
                seen.insert(dedup_key, kept.len());
                kept.push(article);
            }
        }
        kept.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        kept.truncate(limit);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str, url: &str, weight: f64, hour: u32) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            url: url.to_string(),
            source: "fmp".to_string(),
            weight,
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            symbols: Vec::new(),
        }
    }

    #[test]
    fn mentions_is_case_insensitive_and_keeps_untagged_articles() {
        let tagged = NewsArticle { symbols: vec!["aapl".to_string(), "AAPL.O".to_string()], ..article("x", "http://x", 1.0, 0) };
        assert!(tagged.mentions("AAPL"));
        assert!(!tagged.mentions("MSFT"));

        let untagged = article("x", "http://x", 1.0, 0);
        assert!(untagged.mentions("AAPL"));
    }

    #[test]
    fn fallback_keywords_shape() {
        let kws = NewsFragment::fallback_keywords("AAPL");
        assert_eq!(kws, vec!["AAPL", "AAPL earnings", "AAPL outlook", "guidance", "margin"]);
    }

    #[test]
    fn dedup_prefers_higher_weight_duplicate() {
        let articles = vec![
            article("Apple Q1", "http://a.com/1", 0.5, 1),
            article("Apple Q1", "http://a.com/1", 0.9, 2),
        ];
        let ranked = NewsFragment::dedup_and_rank(articles, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].weight, 0.9);
    }

    #[test]
    fn sorted_by_weight_then_recency_and_trimmed() {
        let articles = vec![
            article("A", "http://a.com/1", 0.5, 1),
            article("B", "http://b.com/1", 0.9, 1),
            article("C", "http://c.com/1", 0.9, 5),
        ];
        let ranked = NewsFragment::dedup_and_rank(articles, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].title, "C");
        assert_eq!(ranked[1].title, "B");
    }
}
