use std::fmt::Write as _;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::fetch::describe_request_error;
use crate::models::{ClassificationResult, Control, ImageRecord, Role};

// ── Constants ────────────────────────────────────────────────────────────────

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const REPLY_EXCERPT_CHARS: usize = 200;

const RULES: &str = "\
Follow these WCAG 2.1 rules:
1. Decorative images (no information, pure styling) get an empty alt text.
2. Functional images (inside a link or button) describe the action performed, not the picture.
3. Informative images get a concise but descriptive alt text.
4. Don't repeat information already visible in the surrounding text, caption or existing alt text.
5. Don't use phrases like \"image of\" or \"picture of\".
6. Focus on the purpose and meaning of the image.
7. Keep it under 125 characters when possible.";

const REPLY_FORMAT: &str = "\
Reply with a single JSON object and nothing else:
{\"role\": \"decorative\" | \"functional\" | \"informative\", \"alt_text\": \"...\"}";

// ── Lazy static regexes ──────────────────────────────────────────────────────

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap());

static FILLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:an?\s+)?(?:image|picture|photo|photograph|graphic)\s+(?:of|showing)\s+")
        .unwrap()
});

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("{0}")]
    Request(String),
    #[error("service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("reply contained no text")]
    EmptyReply,
    #[error("unparseable reply: {0}")]
    Reply(String),
    #[error("empty alt text for a {0} image")]
    EmptyAlt(Role),
}

impl ClassificationError {
    /// Transport failures, rate limits and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassificationError::Request(_) => true,
            ClassificationError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DraftReply {
    role: Role,
    alt_text: String,
}

// ── Drafter ──────────────────────────────────────────────────────────────────

/// Classifies images and drafts alt text through the Anthropic Messages API.
pub struct AltTextDrafter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AltTextDrafter {
    pub fn new(config: &Config) -> Result<Self, ClassificationError> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClassificationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.messages_endpoint(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub async fn draft(&self, image: &ImageRecord) -> Result<ClassificationResult, ClassificationError> {
        if image.marked_decorative {
            tracing::debug!(src = %image.src, "image is marked decorative, skipping service call");
            return Ok(ClassificationResult::decorative());
        }
        let prompt = build_prompt(image);
        let reply = self.complete_with_retries(&prompt).await?;
        parse_reply(&reply)
    }

    async fn complete_with_retries(&self, prompt: &str) -> Result<String, ClassificationError> {
        let mut attempt = 0u32;
        loop {
            match self.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "alt-text request failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ClassificationError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassificationError::Request(describe_request_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => format!("{}: {}", body.error.kind, body.error.message),
                Err(_) => excerpt(&text),
            };
            return Err(ClassificationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClassificationError::Reply(e.to_string()))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ClassificationError::EmptyReply)
    }
}

// ── Prompt ───────────────────────────────────────────────────────────────────

pub fn build_prompt(image: &ImageRecord) -> String {
    let role_hint = match image.control {
        Some(Control::Link) => "functional (inside a link)",
        Some(Control::Button) => "functional (inside a button)",
        None => "not determined (decorative or informative)",
    };

    let mut placement = Vec::new();
    if image.landmark.in_header {
        placement.push("page header");
    }
    if image.landmark.in_navigation {
        placement.push("navigation");
    }
    if image.landmark.in_content {
        placement.push("main content");
    }

    let or_none = |v: Option<&str>| match v {
        Some(s) if !s.is_empty() => s.to_string(),
        Some(_) => "(empty)".to_string(),
        None => "(none)".to_string(),
    };

    let mut prompt = String::from(
        "Given this image context, classify the image and generate appropriate WCAG 2.1-compliant alt text.\n\n",
    );
    // Writing to a String cannot fail.
    let _ = writeln!(prompt, "Image source: {}", image.src);
    let _ = writeln!(prompt, "Image role hint: {}", role_hint);
    let _ = writeln!(prompt, "Existing alt: {}", or_none(image.existing_alt.as_deref()));
    let _ = writeln!(prompt, "Title: {}", or_none(image.title.as_deref()));
    let _ = writeln!(prompt, "Caption: {}", or_none(image.caption.as_deref()));
    match &image.link {
        Some(link) => {
            let _ = writeln!(
                prompt,
                "Link: text {:?}, target {}",
                link.text,
                or_none(Some(link.url.as_str()))
            );
        }
        None => {
            let _ = writeln!(prompt, "Link: not a link");
        }
    }
    let _ = writeln!(
        prompt,
        "Placement: {}",
        if placement.is_empty() {
            "unknown".to_string()
        } else {
            placement.join(", ")
        }
    );
    let _ = writeln!(prompt, "Surrounding text:");
    let _ = writeln!(prompt, "- Before: {}", image.context.before);
    let _ = writeln!(prompt, "- After: {}", image.context.after);
    let _ = write!(prompt, "\n{}\n\n{}", RULES, REPLY_FORMAT);
    prompt
}

// ── Reply parsing ────────────────────────────────────────────────────────────

/// Validate a service reply against the expected JSON object.
pub fn parse_reply(text: &str) -> Result<ClassificationResult, ClassificationError> {
    let trimmed = text.trim();
    let body = CODE_FENCE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str());

    let reply: DraftReply = serde_json::from_str(body)
        .map_err(|e| ClassificationError::Reply(format!("{}: {}", e, excerpt(trimmed))))?;

    let suggested_alt = match reply.role {
        Role::Decorative => String::new(),
        _ => strip_filler(reply.alt_text.trim()),
    };
    if suggested_alt.is_empty() && reply.role != Role::Decorative {
        return Err(ClassificationError::EmptyAlt(reply.role));
    }

    Ok(ClassificationResult {
        role: reply.role,
        suggested_alt,
    })
}

fn strip_filler(alt: &str) -> String {
    let stripped = FILLER_RE.replace(alt, "");
    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) if stripped.len() != alt.len() => first.to_uppercase().chain(chars).collect(),
        _ => stripped.into_owned(),
    }
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(REPLY_EXCERPT_CHARS).collect();
    if text.chars().count() > REPLY_EXCERPT_CHARS {
        out.push('…');
    }
    out
}
