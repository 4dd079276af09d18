//! Anthropic Messages API client.

use super::{parse_candidates, RuleExtractor, Summarizer};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::types::{RuleCandidate, Session, Summary};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-turn cap when rendering a transcript into the prompt. Long tool
/// results dominate raw transcripts and carry little signal past this.
const MAX_TURN_CHARS: usize = 2_000;

/// Total transcript cap; oldest turns are dropped first when exceeded.
const MAX_TRANSCRIPT_CHARS: usize = 100_000;

/// Anthropic LLM client implementing both pipeline capabilities.
pub struct AnthropicClient {
    api_key: Option<String>,
    endpoint: String,
    model: String,
    max_retries: usize,
    client: reqwest::blocking::Client,
}

impl AnthropicClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com";
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-5";

    pub fn new() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            max_retries: 3,
            client: build_client(Duration::from_secs(120)),
        }
    }

    /// Build a client from the `[llm]` config section. A key in the config
    /// wins over `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut client = Self::new()
            .with_model(config.model.clone())
            .with_max_retries(config.max_retries)
            .with_timeout(Duration::from_secs(config.timeout_secs));
        if let Some(endpoint) = &config.endpoint {
            client = client.with_endpoint(endpoint.clone());
        }
        if let Some(key) = &config.api_key {
            client = client.with_api_key(key.clone());
        }
        client
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// One Messages API call with retries on transient failure.
    ///
    /// 429 and 5xx responses and network-level errors back off
    /// exponentially up to `max_retries`; any other non-success status
    /// (bad key, bad request) fails immediately.
    fn request(&self, prompt: String) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Llm("ANTHROPIC_API_KEY not set".to_string()))?;

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let mut attempt = 0;
        loop {
            tracing::debug!(model = %self.model, attempt, "Anthropic request");

            let outcome = self
                .client
                .post(format!("{}/v1/messages", self.endpoint))
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&request)
                .send();

            let retryable = match outcome {
                Ok(response) if response.status().is_success() => {
                    let parsed: MessagesResponse = response
                        .json()
                        .map_err(|e| Error::Llm(format!("unparseable response: {}", e)))?;
                    return parsed
                        .content
                        .into_iter()
                        .find(|block| block.block_type == "text")
                        .map(|block| block.text)
                        .ok_or_else(|| Error::Llm("no text content in response".to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let transient =
                        status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    let body = response.text().unwrap_or_default();
                    if !transient {
                        return Err(Error::Llm(format!("API error {}: {}", status, body)));
                    }
                    format!("API error {}: {}", status, body)
                }
                Err(e) => format!("request failed: {}", e),
            };

            if attempt >= self.max_retries {
                return Err(Error::Llm(format!(
                    "{} (after {} retries)",
                    retryable, self.max_retries
                )));
            }
            let backoff = Duration::from_millis(500 * (1 << attempt));
            tracing::warn!(error = %retryable, ?backoff, "Transient LLM failure, retrying");
            std::thread::sleep(backoff);
            attempt += 1;
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Summarizer for AnthropicClient {
    fn summarize(&self, session: &Session, git_ref: Option<&str>) -> Result<String> {
        let transcript = render_transcript(session);
        let git_line = match git_ref {
            Some(r) => format!("The repository was at git ref `{}`.\n", r),
            None => String::new(),
        };
        let prompt = format!(
            "You are reviewing a transcript of an AI coding-assistant session. \
             Summarize what the developer learned, as markdown with these sections \
             (omit a section when there is nothing for it): Dead Ends, Decisions, \
             Gotchas, Patterns. Be specific and terse; skip routine back-and-forth.\n\
             {}\n<transcript>\n{}\n</transcript>",
            git_line, transcript
        );
        self.request(prompt)
    }
}

impl RuleExtractor for AnthropicClient {
    fn extract_rules(&self, summaries: &[Summary]) -> Result<Vec<RuleCandidate>> {
        let mut rendered = String::new();
        for summary in summaries {
            rendered.push_str(&format!(
                "<summary session_id=\"{}\">\n{}\n</summary>\n",
                summary.session_id, summary.text
            ));
        }
        let prompt = format!(
            "From the session summaries below, extract durable project rules. \
             Respond with ONLY a JSON array; each element has \"category\" \
             (one of \"dead_end\", \"decision\", \"gotcha\", \"pattern\"), \
             \"title\" (one sentence), \"body\" (1-3 sentences), and \"sources\" \
             (the session_id values the rule came from). Output [] when nothing \
             qualifies.\n\n{}",
            rendered
        );
        let response = self.request(prompt)?;
        parse_candidates(&response)
    }
}

/// Render a session as role-prefixed text, newest-biased under the caps.
fn render_transcript(session: &Session) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(session.turns.len());
    let mut total = 0;

    for turn in session.turns.iter().rev() {
        let mut content = turn.content.trim().to_string();
        if content.len() > MAX_TURN_CHARS {
            let cut = floor_char_boundary(&content, MAX_TURN_CHARS);
            content.truncate(cut);
            content.push_str(" [truncated]");
        }
        let line = match &turn.tool_name {
            Some(tool) => format!("[{} {}] {}", turn.role.as_str(), tool, content),
            None => format!("[{}] {}", turn.role.as_str(), content),
        };
        total += line.len();
        if total > MAX_TRANSCRIPT_CHARS {
            lines.push("[earlier turns omitted]".to_string());
            break;
        }
        lines.push(line);
    }

    lines.reverse();
    lines.join("\n")
}

fn build_client(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to build HTTP client")
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}
