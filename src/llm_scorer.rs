//! Optional LLM-based relevance scoring for selected papers.
//!
//! Each paper is sent to an OpenAI-compatible chat completions endpoint and
//! rated 0-10. Requests run one at a time behind the injected rate limiter;
//! transient failures are retried with exponential backoff and jitter, and a
//! paper whose retries are exhausted gets score 0 instead of failing the run.

use crate::error::{PaperwatchError, Result};
use crate::paper::{Paper, ScoredPaper};
use crate::prompts::relevance_score::{build_user_prompt, SYSTEM_PROMPT};
use crate::rate_limit::RateLimiter;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Highest score on the rating scale
pub const MAX_SCORE: f64 = 10.0;

/// Named endpoints accepted in place of a URL
pub const API_PRESETS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1/chat/completions"),
    ("deepseek", "https://api.deepseek.com/v1/chat/completions"),
    ("moonshot", "https://api.moonshot.cn/v1/chat/completions"),
    ("zhipu", "https://open.bigmodel.cn/api/paas/v4/chat/completions"),
];

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").expect("valid regex"));

/// LLM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Preset name, base URL or full chat completions URL
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Attempts per paper
    pub max_retries: u32,
    /// Backoff unit; attempt n waits `2^n` units plus up to one unit of jitter
    pub retry_base_ms: u64,
    /// Minimum interval between requests
    pub delay_ms: u64,
    pub min_score: f64,
    pub top_n: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "openai".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            max_retries: 3,
            retry_base_ms: 1000,
            delay_ms: 2000,
            min_score: 5.0,
            top_n: None,
        }
    }
}

impl LlmConfig {
    /// Resolve presets and bare base URLs into the chat completions URL
    pub fn endpoint(&self) -> String {
        let raw = self.api_url.trim();
        if let Some((_, url)) = API_PRESETS.iter().find(|(name, _)| name.eq_ignore_ascii_case(raw)) {
            return url.to_string();
        }
        if raw.ends_with("/chat/completions") {
            raw.to_string()
        } else {
            format!("{}/chat/completions", raw.trim_end_matches('/'))
        }
    }
}

/// Score and rationale returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmVerdict {
    pub score: f64,
    pub reason: String,
}

/// Token usage tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

pub struct LlmScorer {
    client: Client,
    config: LlmConfig,
    endpoint: String,
}

impl LlmScorer {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PaperwatchError::Config("LLM scoring enabled but LLM_API_KEY is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PaperwatchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint(),
            client,
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Score papers, keep those at or above `min_score`, best first.
    pub async fn filter(
        &self,
        papers: Vec<ScoredPaper>,
        keywords: &[String],
        limiter: &dyn RateLimiter,
    ) -> (Vec<ScoredPaper>, TokenUsage) {
        let total = papers.len();
        let mut usage = TokenUsage::default();
        let mut kept = Vec::new();

        info!(
            count = total,
            model = %self.config.model,
            min_score = self.config.min_score,
            "Starting LLM relevance scoring"
        );

        for (idx, mut scored) in papers.into_iter().enumerate() {
            limiter.acquire().await;
            let (verdict, paper_usage) = self.score_with_retry(&scored.paper, keywords).await;
            usage.add(&paper_usage);

            info!(
                progress = format!("{}/{}", idx + 1, total),
                title = %scored.paper.title.chars().take(50).collect::<String>(),
                llm_score = verdict.score,
                "Paper rated"
            );

            let keep = verdict.score >= self.config.min_score;
            scored.llm = Some(verdict);
            if keep {
                kept.push(scored);
            }
        }

        kept.sort_by(|a, b| llm_score(b).total_cmp(&llm_score(a)));
        if let Some(top_n) = self.config.top_n {
            kept.truncate(top_n);
        }

        info!(
            rated = total,
            kept = kept.len(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "LLM scoring complete"
        );
        (kept, usage)
    }

    /// Rate one paper, retrying transient failures.
    ///
    /// Never fails: exhausted retries give score 0 with the last error as reason.
    pub async fn score_with_retry(&self, paper: &Paper, keywords: &[String]) -> (LlmVerdict, TokenUsage) {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.evaluate(paper, keywords).await {
                Ok(result) => return result,
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        title = %paper.title.chars().take(50).collect::<String>(),
                        error = %e,
                        "LLM request failed"
                    );
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        let wait = backoff(attempt, self.config.retry_base_ms);
                        debug!(wait_ms = wait.as_millis() as u64, "Retrying LLM request");
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        (
            LlmVerdict {
                score: 0.0,
                reason: format!("LLM scoring failed: {}", last_error),
            },
            TokenUsage::default(),
        )
    }

    /// One chat completions round trip
    async fn evaluate(&self, paper: &Paper, keywords: &[String]) -> Result<(LlmVerdict, TokenUsage)> {
        let user_prompt = build_user_prompt(keywords, &paper.title, &paper.abstract_text);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaperwatchError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PaperwatchError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.and_then(|m| m.content).or(c.text))
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(PaperwatchError::Parse("Empty LLM response".to_string()));
        }

        Ok((parse_verdict(&content), usage))
    }
}

fn llm_score(paper: &ScoredPaper) -> f64 {
    paper.llm.as_ref().map(|v| v.score).unwrap_or_default()
}

/// `base * 2^attempt` plus up to one `base` of jitter
fn backoff(attempt: u32, base_ms: u64) -> Duration {
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let jitter = rand::thread_rng().gen_range(0..base_ms);
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt)).saturating_add(jitter))
}

/// Scores above 10 are read as a 100-point scale; the result is clamped to 0-10
pub fn normalize_score(raw: f64) -> f64 {
    let score = if raw > MAX_SCORE { raw / 10.0 } else { raw };
    score.clamp(0.0, MAX_SCORE)
}

/// Parse model output into a verdict.
///
/// Strict JSON first (code fences tolerated), then `score: N` / `reason: ...`
/// lines. Unparsable output is score 0 with the raw text as reason.
pub fn parse_verdict(content: &str) -> LlmVerdict {
    #[derive(Deserialize)]
    struct LlmOutput {
        score: f64,
        #[serde(default)]
        reason: String,
    }

    let json_str = extract_json(content);
    if let Ok(output) = serde_json::from_str::<LlmOutput>(&json_str) {
        return LlmVerdict {
            score: normalize_score(output.score),
            reason: output.reason,
        };
    }

    let mut score = None;
    let mut reason = String::new();
    for line in content.lines().map(str::trim) {
        let lower = line.to_lowercase();
        if score.is_none() && (lower.contains("score") || line.contains("分数")) {
            score = NUMBER_RE
                .find(line)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(normalize_score);
        }
        if reason.is_empty() && (lower.contains("reason") || line.contains("理由")) {
            reason = line
                .split_once([':', '：'])
                .map(|(_, rest)| rest.trim().to_string())
                .unwrap_or_default();
        }
    }

    if score.is_none() {
        let preview: String = content.chars().take(200).collect();
        info!(content_preview = %preview, "LLM output parse failed - treating as score 0");
    }
    if reason.is_empty() {
        reason = content.chars().take(200).collect();
    }

    LlmVerdict {
        score: score.unwrap_or(0.0),
        reason,
    }
}

/// Extract JSON from LLM response (handles markdown code blocks)
fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 2 {
            let end = if lines.last().map(|l| l.trim()) == Some("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[1..end].join("\n");
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{sample_paper, Annotation};
    use crate::rate_limit::Unthrottled;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> LlmConfig {
        LlmConfig {
            enabled: true,
            api_url: server.uri(),
            api_key: "sk-test".to_string(),
            retry_base_ms: 0,
            delay_ms: 0,
            ..Default::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        })
    }

    #[test]
    fn test_endpoint_resolution() {
        let mut config = LlmConfig::default();
        assert_eq!(config.endpoint(), "https://api.openai.com/v1/chat/completions");
        config.api_url = "DeepSeek".to_string();
        assert_eq!(config.endpoint(), "https://api.deepseek.com/v1/chat/completions");
        config.api_url = "http://localhost:8000/v1/".to_string();
        assert_eq!(config.endpoint(), "http://localhost:8000/v1/chat/completions");
        config.api_url = "http://host/v1/chat/completions".to_string();
        assert_eq!(config.endpoint(), "http://host/v1/chat/completions");
    }

    #[test]
    fn test_parse_verdict_json() {
        let v = parse_verdict(r#"{"score": 8, "reason": "Studies airline market structure"}"#);
        assert_eq!(v.score, 8.0);
        assert_eq!(v.reason, "Studies airline market structure");
    }

    #[test]
    fn test_parse_verdict_code_block() {
        let v = parse_verdict("```json\n{\"score\": 6.5, \"reason\": \"ok\"}\n```");
        assert_eq!(v.score, 6.5);
    }

    #[test]
    fn test_parse_verdict_hundred_scale_and_clamp() {
        assert_eq!(parse_verdict(r#"{"score": 85, "reason": ""}"#).score, 8.5);
        assert_eq!(parse_verdict(r#"{"score": 500, "reason": ""}"#).score, 10.0);
        assert_eq!(parse_verdict(r#"{"score": -3, "reason": ""}"#).score, 0.0);
    }

    #[test]
    fn test_parse_verdict_line_fallback() {
        let v = parse_verdict("Relevance score: 7\nReason: focuses on port competition");
        assert_eq!(v.score, 7.0);
        assert_eq!(v.reason, "focuses on port competition");

        let v = parse_verdict("相关度分数: 9\n评估理由：研究航运碳排放");
        assert_eq!(v.score, 9.0);
        assert_eq!(v.reason, "研究航运碳排放");
    }

    #[test]
    fn test_parse_verdict_garbage() {
        let v = parse_verdict("I cannot decide.");
        assert_eq!(v.score, 0.0);
        assert_eq!(v.reason, "I cannot decide.");
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(backoff(3, 0), Duration::ZERO);
        let first = backoff(0, 100);
        let third = backoff(2, 100);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(200));
        assert!(third >= Duration::from_millis(400) && third < Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(backoff(0, u64::MAX), Duration::from_millis(u64::MAX));
        assert_eq!(backoff(40, u64::MAX / 2), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_requires_api_key() {
        assert!(LlmScorer::new(LlmConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_filter_keeps_and_orders() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"score": 7, "reason": "fits"}"#)))
            .expect(2)
            .mount(&server)
            .await;

        let scorer = LlmScorer::new(LlmConfig {
            top_n: Some(1),
            ..config(&server)
        })?;
        let papers = vec![
            ScoredPaper::new(sample_paper("1", "First"), Annotation::default()),
            ScoredPaper::new(sample_paper("2", "Second"), Annotation::default()),
        ];
        let keywords = vec!["pricing".to_string()];

        let (kept, usage) = scorer.filter(papers, &keywords, &Unthrottled).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].llm.as_ref().map(|v| v.score), Some(7.0));
        assert_eq!(usage.total_tokens, 240);
        Ok(())
    }

    #[tokio::test]
    async fn test_retries_then_gives_zero() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let scorer = LlmScorer::new(config(&server))?;
        let (verdict, usage) = scorer
            .score_with_retry(&sample_paper("1", "Title"), &["pricing".to_string()])
            .await;
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.reason.starts_with("LLM scoring failed"));
        assert_eq!(usage, TokenUsage::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_below_min_score_dropped() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("score: 2\nreason: unrelated")))
            .mount(&server)
            .await;

        let scorer = LlmScorer::new(config(&server))?;
        let papers = vec![ScoredPaper::new(sample_paper("1", "Off topic"), Annotation::default())];
        let (kept, _) = scorer.filter(papers, &[], &Unthrottled).await;
        assert!(kept.is_empty());
        Ok(())
    }
}
