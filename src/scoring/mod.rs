//! Scoring oracle contract.
//!
//! A [`Scorer`] turns one rendered message into a bounded integer score. Every failure
//! mode is a [`ScoreFailure`] value rather than a panic or an `anyhow` error, so a single
//! bad prompt never aborts a sweep and callers can still tell failures apart.

pub mod client;

use crate::scenario::SCORE_FIELD;
use core::fmt;
use serde::Deserialize;
use serde_json::Value;

pub use client::{ClientConfig, MessagesClient, Provider};

pub type ScoreResult = Result<i64, ScoreFailure>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScoreFailure {
    /// Connection, TLS, or timeout failure before a response arrived.
    Transport(String),
    HttpStatus { status: u16, body: String },
    /// The response body was not a valid messages response.
    Decode(String),
    /// The oracle stopped for a reason other than calling the tool (including refusals).
    NoToolUse { stop_reason: Option<String> },
    MissingToolBlock { tool_name: String },
    MissingField { field: String },
    NonIntegerField { field: String, value: String },
    TaskPanicked(String),
}

impl ScoreFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::HttpStatus { .. } => "http_status",
            Self::Decode(_) => "decode",
            Self::NoToolUse { .. } => "no_tool_use",
            Self::MissingToolBlock { .. } => "missing_tool_block",
            Self::MissingField { .. } => "missing_field",
            Self::NonIntegerField { .. } => "non_integer_field",
            Self::TaskPanicked(_) => "task_panicked",
        }
    }
}

impl fmt::Display for ScoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::HttpStatus { status, body } => write!(f, "oracle returned HTTP {status}: {body}"),
            Self::Decode(err) => write!(f, "undecodable oracle response: {err}"),
            Self::NoToolUse { stop_reason } => write!(
                f,
                "oracle did not call the score tool (stop_reason={})",
                stop_reason.as_deref().unwrap_or("none")
            ),
            Self::MissingToolBlock { tool_name } => {
                write!(f, "no tool_use block named '{tool_name}' in response")
            }
            Self::MissingField { field } => write!(f, "tool input has no '{field}' field"),
            Self::NonIntegerField { field, value } => {
                write!(f, "tool input field '{field}' is not an integer: {value}")
            }
            Self::TaskPanicked(msg) => write!(f, "scoring task panicked: {msg}"),
        }
    }
}

impl std::error::Error for ScoreFailure {}

/// Anything that can score a rendered message. One instance is shared by reference
/// across every worker in a sweep.
pub trait Scorer: Send + Sync {
    fn score(&self, message: &str) -> ScoreResult;
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// Pull the score out of a response.
///
/// Only a `tool_use` stop is accepted, and only the first `tool_use` block carrying
/// `tool_name` is read. The value is not checked against the scenario's range: the tool
/// schema declares the bounds and the oracle is trusted to respect them.
pub fn extract_score(response: &MessagesResponse, tool_name: &str) -> ScoreResult {
    if response.stop_reason.as_deref() != Some("tool_use") {
        return Err(ScoreFailure::NoToolUse {
            stop_reason: response.stop_reason.clone(),
        });
    }

    let input = response
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input } if name == tool_name => Some(input),
            _ => None,
        })
        .ok_or_else(|| ScoreFailure::MissingToolBlock {
            tool_name: tool_name.to_string(),
        })?;

    let value = input.get(SCORE_FIELD).ok_or_else(|| ScoreFailure::MissingField {
        field: SCORE_FIELD.to_string(),
    })?;

    value.as_i64().ok_or_else(|| ScoreFailure::NonIntegerField {
        field: SCORE_FIELD.to_string(),
        value: value.to_string(),
    })
}
