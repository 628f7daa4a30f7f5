use super::{extract_score, MessagesResponse, ScoreFailure, ScoreResult, Scorer};
use crate::scenario::Scenario;
use crate::util::read_env_string;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_BEDROCK_REGION: &str = "us-west-2";
pub const DEFAULT_MAX_TOKENS: u32 = 500;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    Anthropic,
    #[default]
    Bedrock,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-sonnet-20240620",
            Self::Bedrock => "anthropic.claude-3-5-sonnet-20240620-v1:0",
        }
    }

    /// Environment variable holding the credential for this provider.
    pub fn credential_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Bedrock => "AWS_BEARER_TOKEN_BEDROCK",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "anthropic" => Ok(Self::Anthropic),
            "bedrock" => Ok(Self::Bedrock),
            _ => Err(anyhow!(
                "invalid provider: {value} (expected anthropic|bedrock)"
            )),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub provider: Provider,
    pub model: String,
    pub region: String,
    pub base_url: Option<String>,
    pub credential: String,
    pub max_tokens: u32,
    /// `None` keeps the HTTP client's default timeout.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Build a config for `provider`, reading the credential and region from the
    /// environment. A missing credential is an error here, before any request is made.
    pub fn from_env(provider: Provider) -> Result<Self> {
        Self::from_parts(
            provider,
            read_env_string(provider.credential_env()),
            read_env_string("AWS_REGION"),
        )
    }

    pub fn from_parts(
        provider: Provider,
        credential: Option<String>,
        region: Option<String>,
    ) -> Result<Self> {
        let credential = credential.ok_or_else(|| match provider {
            Provider::Anthropic => anyhow!(
                "{} must be set to use the {} provider",
                provider.credential_env(),
                provider
            ),
            Provider::Bedrock => anyhow!(
                "{} must be set to use the {} provider; only Bedrock API keys are \
                 supported, AWS access keys and profiles (SigV4 signing) are not",
                provider.credential_env(),
                provider
            ),
        })?;

        Ok(Self {
            provider,
            model: provider.default_model().to_string(),
            region: region.unwrap_or_else(|| DEFAULT_BEDROCK_REGION.to_string()),
            base_url: None,
            credential,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            Provider::Anthropic => {
                let base = self
                    .base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_ANTHROPIC_BASE_URL)
                    .trim_end_matches('/');
                format!("{base}/v1/messages")
            }
            Provider::Bedrock => {
                let base = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| {
                        format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
                    });
                let base = base.trim_end_matches('/');
                let model = self.model.replace(':', "%3A");
                format!("{base}/model/{model}/invoke")
            }
        }
    }
}

/// Request body for one scoring call.
pub fn build_request_body(
    provider: Provider,
    model: &str,
    max_tokens: u32,
    scenario: &Scenario,
    message: &str,
) -> Value {
    let mut body = json!({
        "max_tokens": max_tokens,
        "system": scenario.system_prompt,
        "messages": [
            { "role": "user", "content": scenario.user_prompt(message) }
        ],
        "tools": [scenario.tool()],
    });
    match provider {
        Provider::Anthropic => body["model"] = json!(model),
        Provider::Bedrock => body["anthropic_version"] = json!(BEDROCK_ANTHROPIC_VERSION),
    }
    body
}

/// Blocking messages-API client. Cheap to share: the underlying HTTP client pools
/// connections internally and the struct is never mutated after construction.
pub struct MessagesClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    config: ClientConfig,
    scenario: Scenario,
}

impl MessagesClient {
    pub fn new(config: ClientConfig, scenario: Scenario) -> Result<Self> {
        scenario.validate()?;
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;
        let endpoint = config.endpoint();
        tracing::info!(
            provider = %config.provider,
            model = %config.model,
            endpoint = %endpoint,
            scenario = %scenario.id,
            "scoring client ready"
        );
        Ok(Self {
            http,
            endpoint,
            config,
            scenario,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    fn send(&self, body: &Value) -> Result<MessagesResponse, ScoreFailure> {
        let request = self.http.post(&self.endpoint).json(body);
        let request = match self.config.provider {
            Provider::Anthropic => request
                .header("x-api-key", &self.config.credential)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::Bedrock => request.bearer_auth(&self.config.credential),
        };

        let response = request
            .send()
            .map_err(|err| ScoreFailure::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ScoreFailure::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        response
            .json::<MessagesResponse>()
            .map_err(|err| ScoreFailure::Decode(err.to_string()))
    }
}

impl Scorer for MessagesClient {
    fn score(&self, message: &str) -> ScoreResult {
        let body = build_request_body(
            self.config.provider,
            &self.config.model,
            self.config.max_tokens,
            &self.scenario,
            message,
        );
        let response = self.send(&body)?;
        extract_score(&response, &self.scenario.tool_name)
    }
}
