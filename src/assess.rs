//! Risk and career assessment backed by an OpenAI-compatible chat service.
//!
//! Every call makes at most one request. Any failure along the way (missing
//! credential, transport error, non-JSON reply) degrades to the local
//! heuristic in [`crate::risk`], which only produces a risk level.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AssessConfig;
use crate::error::AssessError;
use crate::models::{AssessmentResult, AssessmentSource, Record, NUM_SUBJECTS};
use crate::risk::{fallback_risk, parse_risk};

pub const UNKNOWN_CAREER: &str = "Unknown";
pub const FALLBACK_EXPLANATION: &str = "No AI available; local fallback used.";

pub const CAREERS: [&str; 7] = [
    "Computer Science",
    "Electronics / ECE",
    "Civil / Civil Eng",
    "Management",
    "Arts / Humanities",
    "Research / Academia",
    "Vocational / Trade",
];

fn system_prompt() -> String {
    let careers = CAREERS
        .iter()
        .map(|career| format!("\"{career}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are an expert career counsellor. Output ONLY a single JSON object with keys: \
         \"risk\" (one of HIGH, MEDIUM, LOW), \"career\" (one of: {careers}), \
         and \"explanation\" (brief). Do NOT output the token \"{UNKNOWN_CAREER}\" or an empty \
         career; always pick the best matching career from the allowed list. Do not output \
         anything outside the single JSON object. Decide based on marks across subjects and \
         attendance. Prefer non-engineering if languages/arts scores are clearly highest. Use \
         clear, concise explanations referencing top subjects and attendance."
    )
}

/// Calibration exchanges sent ahead of every live request.
const FEW_SHOTS: [(&str, &str); 3] = [
    (
        r#"Student: {"roll":101,"name":"Alice","marks":[95,90,88,96,80],"attendance":92}"#,
        r#"{"risk":"LOW","career":"Computer Science","explanation":"Very high CS and Math marks with high attendance; excellent fit for CS."}"#,
    ),
    (
        r#"Student: {"roll":102,"name":"Bob","marks":[48,50,45,30,92],"attendance":88}"#,
        r#"{"risk":"MEDIUM","career":"Arts / Humanities","explanation":"Very strong English with weaker STEM marks; recommend Arts/Humanities or language-related fields."}"#,
    ),
    (
        r#"Student: {"roll":103,"name":"Carol","marks":[72,68,65,70,85],"attendance":90}"#,
        r#"{"risk":"LOW","career":"Management","explanation":"Balanced marks with strong English and good overall scores; suitable for Management/business studies."}"#,
    ),
];

#[derive(Debug, Serialize)]
struct StudentPayload<'a> {
    roll: i32,
    name: &'a str,
    marks: &'a [f64; NUM_SUBJECTS],
    attendance: f64,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<MessageResponse>,
    /// Completion-style replies carry the text directly on the choice.
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

/// Fields read from the assistant's JSON object; absent fields stay empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub risk: String,
    pub career: String,
    pub explanation: String,
}

impl AssistantReply {
    pub fn into_result(self) -> AssessmentResult {
        AssessmentResult {
            risk: parse_risk(&self.risk),
            career: self.career,
            explanation: self.explanation,
            source: AssessmentSource::Service,
        }
    }
}

pub fn student_json(record: &Record) -> Result<String, AssessError> {
    let payload = StudentPayload {
        roll: record.roll,
        name: &record.name,
        marks: &record.marks,
        attendance: record.attendance,
    };
    Ok(serde_json::to_string(&payload)?)
}

pub fn build_request(config: &AssessConfig, record: &Record) -> Result<ChatRequest, AssessError> {
    let mut messages = Vec::with_capacity(2 + FEW_SHOTS.len() * 2);
    messages.push(ChatMessage::new("system", system_prompt()));
    for (user, assistant) in FEW_SHOTS {
        messages.push(ChatMessage::new("user", user));
        messages.push(ChatMessage::new("assistant", assistant));
    }
    messages.push(ChatMessage::new(
        "user",
        format!(
            "Student: {}\nReturn JSON as specified above.",
            student_json(record)?
        ),
    ));

    Ok(ChatRequest {
        model: config.model.clone(),
        temperature: 0.0,
        max_tokens: config.max_tokens,
        messages,
    })
}

/// Pulls the assistant text out of a chat-completions reply body.
pub fn extract_content(body: &str) -> Result<String, AssessError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|err| AssessError::TransportParse(err.to_string()))?;
    let first = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AssessError::TransportParse("no choices in reply".to_string()))?;

    let content = match first.message {
        Some(message) => message.content,
        None => first.text,
    };
    content.ok_or_else(|| AssessError::TransportParse("first choice has no content".to_string()))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_assistant_reply(content: &str) -> Result<AssistantReply, AssessError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|err| AssessError::AssistantParse(err.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| AssessError::AssistantParse(format!("expected object, got {value}")))?;

    let field = |key: &str| {
        object
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(AssistantReply {
        risk: field("risk"),
        career: field("career"),
        explanation: field("explanation"),
    })
}

/// Risk-only result from the local heuristic.
pub fn fallback(record: &Record) -> AssessmentResult {
    AssessmentResult {
        risk: fallback_risk(record),
        career: UNKNOWN_CAREER.to_string(),
        explanation: FALLBACK_EXPLANATION.to_string(),
        source: AssessmentSource::LocalFallback,
    }
}

pub struct AssessmentClient {
    client: Client,
    config: AssessConfig,
}

impl AssessmentClient {
    pub fn new(config: AssessConfig) -> Result<Self, AssessError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AssessError::Network(err.to_string()))?;
        Ok(Self { client, config })
    }

    /// Assesses `record`, falling back to the local heuristic on any failure.
    pub async fn assess(&self, record: &Record) -> AssessmentResult {
        match self.request(record).await {
            Ok(reply) => reply.into_result(),
            Err(AssessError::NoCredential(var)) => {
                debug!(roll = record.roll, env = %var, "no credential, using local fallback");
                fallback(record)
            }
            Err(err) => {
                warn!(roll = record.roll, error = %err, "assessment service unavailable, using local fallback");
                fallback(record)
            }
        }
    }

    async fn request(&self, record: &Record) -> Result<AssistantReply, AssessError> {
        let api_key = self
            .config
            .credential()
            .ok_or_else(|| AssessError::NoCredential(self.config.api_key_env.clone()))?;
        let body = build_request(&self.config, record)?;
        let url = self.config.chat_completions_url();
        debug!(roll = record.roll, model = %self.config.model, url = %url, "requesting assessment");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AssessError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssessError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|err| AssessError::Network(err.to_string()))?;
        let content = extract_content(&text)?;
        debug!(roll = record.roll, reply = %content, "assessment reply received");
        parse_assistant_reply(&content)
    }
}
