//! Prompt assembly. Every call uses a fixed Chinese system prompt
//! defining the required JSON schema (spec.md §4.9).

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Analysis,
    FilingSummary,
    TranscriptSummary,
    NewsSentiment,
    NewsKeywords,
}

const ANALYSIS_SYSTEM_PROMPT: &str = r#"你是一位資深股票分析師。僅根據提供的結構化資料作出判斷，不得臆測未提供的事實。
請以嚴格的 JSON 格式回覆，且只包含以下結構：
{"action": {"rating": "BUY|HOLD|SELL", "target_price": number, "confidence": "high|medium|low", "rationale": string}}
rating 欄位不得為 "N/A" 或空白。"#;

const SUMMARY_SYSTEM_PROMPT: &str = r#"你是一位財經文件摘要助手。請將提供的文字壓縮成精簡摘要，只使用提供的內容，不得捏造數字。
請以嚴格的 JSON 格式回覆：{"summary": string, "kind": "llm"}"#;

const SENTIMENT_SYSTEM_PROMPT: &str = r#"你是一位新聞情緒分析師。請根據提供的新聞標題與來源判斷整體情緒。
請以嚴格的 JSON 格式回覆：{"sentiment_label": "樂觀|中性|悲觀", "summary": string, "supporting_events": [string]}"#;

const KEYWORD_SYSTEM_PROMPT: &str = r#"你是一位新聞檢索助手。請根據股票代碼產生適合搜尋新聞的關鍵字列表。
請以嚴格的 JSON 格式回覆：{"keywords": [string]}"#;

/// Builds `(system, user)` messages for the final investment analysis.
pub fn analysis_prompt(payload: &Value) -> (String, String) {
    (ANALYSIS_SYSTEM_PROMPT.to_string(), serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string()))
}

/// Builds `(system, user)` messages for the summarization family of
/// calls: filing MD&A, transcripts, news sentiment, keyword extraction.
pub fn summarization_prompt(kind: PromptKind, input_text: &str) -> (String, String) {
    let system = match kind {
        PromptKind::Analysis => ANALYSIS_SYSTEM_PROMPT,
        PromptKind::FilingSummary | PromptKind::TranscriptSummary => SUMMARY_SYSTEM_PROMPT,
        PromptKind::NewsSentiment => SENTIMENT_SYSTEM_PROMPT,
        PromptKind::NewsKeywords => KEYWORD_SYSTEM_PROMPT,
    };
    (system.to_string(), input_text.to_string())
}
