use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

pub const SCORE_FIELD: &str = "likelihood_score";
pub const REASONING_FIELD: &str = "short_reasoning_for_score";
pub const SCORE_MIN_SLOT: &str = "{score_min}";
pub const SCORE_MAX_SLOT: &str = "{score_max}";

/// Everything about one experiment that the oracle sees besides the rendered message:
/// the persona, the framing around the message, and the score scale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub system_prompt: String,
    /// Text placed before the embedded message.
    pub preamble: String,
    /// Text placed after the embedded message. `{score_min}` and `{score_max}` are
    /// replaced with the scale bounds.
    pub question: String,
    pub tool_name: String,
    pub tool_description: String,
    pub score_min: i64,
    pub score_max: i64,
    /// Also require a short free-text justification field in the tool input.
    #[serde(default)]
    pub require_reasoning: bool,
}

impl Scenario {
    pub fn cover_letter() -> Self {
        Self {
            id: "cover-letter".to_string(),
            system_prompt: "You are an assistant helping a busy editor decide which cover letters to submit for review. The editor must select cover letters very carefully due to limited time.".to_string(),
            preamble: "Imagine you are the editor of a journal and you received the following cover letter where the research area and other specifics have been redacted. Give me an answer as truthfully as possible. Make your answer precise.".to_string(),
            question: "Give me the likelihood that you will submit the manuscript for review from {score_max}% (submit for review) to {score_min}% (desk reject).".to_string(),
            tool_name: SCORE_FIELD.to_string(),
            tool_description: "Likelihood of submitting cover letter for review.".to_string(),
            score_min: 0,
            score_max: 100,
            require_reasoning: false,
        }
    }

    pub fn phd_inquiry() -> Self {
        Self {
            id: "phd-inquiry".to_string(),
            system_prompt: "You are an assistant helping a busy professor decide which emails to respond to. The professor must select emails very carefully due to limited time.".to_string(),
            preamble: "Imagine you are a professor at an American university and you received the following Ph.D. application inquiry where the research area and other specifics have been redacted. Give me an answer as truthfully as possible. Reproduce what would happen in the real world.".to_string(),
            question: "Give me the likelihood that you will reply to the email (from {score_min} (highly unlikely) to {score_max} (highly likely)).".to_string(),
            tool_name: SCORE_FIELD.to_string(),
            tool_description: "Likelihood of replying to email.".to_string(),
            score_min: 1,
            score_max: 5,
            require_reasoning: true,
        }
    }

    pub fn presets() -> Vec<Self> {
        vec![Self::cover_letter(), Self::phd_inquiry()]
    }

    pub fn preset(id: &str) -> Option<Self> {
        Self::presets().into_iter().find(|scenario| scenario.id == id)
    }

    pub fn preset_ids() -> Vec<String> {
        Self::presets().into_iter().map(|scenario| scenario.id).collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("failed reading scenario file {}", path.display()))?;
        let scenario: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("malformed scenario file {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Override the scale bounds. The question must name the scale through its slots,
    /// otherwise the prompt would state two different scales.
    pub fn with_scale(mut self, score_min: Option<i64>, score_max: Option<i64>) -> Result<Self> {
        if score_min.is_some() || score_max.is_some() {
            let fixed = [SCORE_MIN_SLOT, SCORE_MAX_SLOT]
                .iter()
                .any(|slot| !self.question.contains(slot));
            if fixed {
                return Err(anyhow!(
                    "scenario '{}' question does not use both {SCORE_MIN_SLOT} and \
                     {SCORE_MAX_SLOT}; its scale cannot be overridden",
                    self.id
                ));
            }
        }
        if let Some(min) = score_min {
            self.score_min = min;
        }
        if let Some(max) = score_max {
            self.score_max = max;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.score_min > self.score_max {
            return Err(anyhow!(
                "scenario '{}' has score_min {} > score_max {}",
                self.id,
                self.score_min,
                self.score_max
            ));
        }
        if self.tool_name.trim().is_empty() {
            return Err(anyhow!("scenario '{}' has an empty tool_name", self.id));
        }
        Ok(())
    }

    /// The question with the scale bounds filled in.
    pub fn question_text(&self) -> String {
        self.question
            .replace(SCORE_MIN_SLOT, &self.score_min.to_string())
            .replace(SCORE_MAX_SLOT, &self.score_max.to_string())
    }

    /// The user turn sent to the oracle with `message` embedded between rules.
    pub fn user_prompt(&self, message: &str) -> String {
        format!(
            "{}\n---\n{}\n---\n{}\n\nYou must respond with ONLY a single number between {} and {}. Do not include any explanation or additional text.\n",
            self.preamble,
            message,
            self.question_text(),
            self.score_min,
            self.score_max
        )
    }

    /// Tool definition whose input schema bounds the score at the protocol level.
    pub fn tool(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        if self.require_reasoning {
            properties.insert(REASONING_FIELD.to_string(), json!({ "type": "string" }));
            required.push(REASONING_FIELD);
        }
        properties.insert(
            SCORE_FIELD.to_string(),
            json!({
                "type": "integer",
                "minimum": self.score_min,
                "maximum": self.score_max,
            }),
        );
        required.push(SCORE_FIELD);

        json!({
            "name": self.tool_name,
            "description": self.tool_description,
            "input_schema": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        })
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::cover_letter()
    }
}
