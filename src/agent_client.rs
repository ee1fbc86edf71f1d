use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client as AsyncOpenAiClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::{read_env, read_first};

pub type SharedAgentClient = Arc<dyn AgentClient>;

/// Payload handed to the remote conversational agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub input: String,
    pub session_id: String,
}

impl AgentRequest {
    pub fn new(input: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            session_id: session_id.into(),
        }
    }
}

/// Whatever the agent sent back.
///
/// Agents either finish with an `output` field or hand back some other value,
/// which is shown to the user as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    Finished { output: String },
    Raw(Value),
}

impl AgentReply {
    pub fn from_json(value: Value) -> Self {
        let output = value
            .get("output")
            .or_else(|| value.pointer("/return_values/output"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match output {
            Some(output) => Self::Finished { output },
            None => Self::Raw(value),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Finished { output } => output,
            Self::Raw(Value::String(text)) => text,
            Self::Raw(other) => other.to_string(),
        }
    }
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<AgentReply>;
}

/// Stand-in used when no agent backend is configured.
#[derive(Debug, Default, Clone)]
pub struct EchoAgentClient;

#[async_trait]
impl AgentClient for EchoAgentClient {
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<AgentReply> {
        Ok(AgentReply::Finished {
            output: format!(
                "[stubbed agent response]\nI received {} characters: {}",
                request.input.chars().count(),
                preview(&request.input, 200)
            ),
        })
    }
}

impl EchoAgentClient {
    pub fn shared() -> SharedAgentClient {
        Arc::new(Self)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

/// Agent exposed behind a plain JSON endpoint that accepts `{input, session_id}`.
pub struct HttpAgentClient {
    http: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpAgentClient {
    const ENDPOINT_VARS: [&'static str; 2] = ["AGENT_ENDPOINT_URL", "KB_CHAT_AGENT_URL"];
    const TOKEN_VARS: [&'static str; 2] = ["AGENT_API_TOKEN", "KB_CHAT_AGENT_TOKEN"];
    const TIMEOUT_VARS: [&'static str; 1] = ["AGENT_HTTP_TIMEOUT_MS"];

    pub fn shared_from_env() -> anyhow::Result<SharedAgentClient> {
        Ok(Arc::new(Self::from_env()?))
    }

    fn endpoint_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        read_first(&Self::ENDPOINT_VARS, &lookup)
    }

    fn from_env() -> anyhow::Result<Self> {
        let endpoint = read_env(&Self::ENDPOINT_VARS)
            .context("Set AGENT_ENDPOINT_URL to use the HTTP agent client")?;
        let timeout_ms = read_env(&Self::TIMEOUT_VARS)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(120_000);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()
            .context("Failed to build agent HTTP client")?;

        Ok(Self {
            http,
            endpoint,
            api_token: read_env(&Self::TOKEN_VARS),
        })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    #[instrument(level = "debug", skip_all, fields(session = %request.session_id))]
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<AgentReply> {
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("Agent request failed")?
            .error_for_status()
            .context("Agent endpoint returned error status")?;

        let body = response
            .text()
            .await
            .context("Failed to read agent response body")?;
        debug!(bytes = body.len(), "Received agent response");

        Ok(match serde_json::from_str::<Value>(&body) {
            Ok(value) => AgentReply::from_json(value),
            Err(_) => AgentReply::Raw(Value::String(body)),
        })
    }
}

/// OpenAI-compatible chat backend (OpenAI, vLLM, or any compatible gateway).
pub struct OpenAiAgentClient {
    client: AsyncOpenAiClient<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAiAgentClient {
    const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    const DEFAULT_SYSTEM_PROMPT: &'static str =
        "You are a helpful assistant. When documents or repository documentation are appended \
         to the user's message, ground your answer in them.";

    pub fn shared_from_env() -> anyhow::Result<SharedAgentClient> {
        Ok(Arc::new(Self::from_env()?))
    }

    fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("Set OPENAI_API_KEY to use the OpenAI-compatible agent client")?;
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            config = config.with_api_base(base_url);
        }

        let model = env::var("KB_CHAT_MODEL").unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string());
        let system_prompt = env::var("KB_CHAT_SYSTEM_PROMPT")
            .unwrap_or_else(|_| Self::DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            client: AsyncOpenAiClient::with_config(config),
            model,
            system_prompt,
        })
    }
}

#[async_trait]
impl AgentClient for OpenAiAgentClient {
    #[instrument(level = "debug", skip_all, fields(session = %request.session_id))]
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<AgentReply> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(&self.system_prompt)
            .build()?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(request.input.as_str())
            .build()?;

        let completion = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.0)
            .user(request.session_id.as_str())
            .messages(vec![system_message.into(), user_message.into()])
            .build()?;

        let response = self.client.chat().create(completion).await?;
        let choice = response
            .choices
            .first()
            .context("Agent response did not contain any choices")?;

        let output = choice
            .message
            .content
            .clone()
            .unwrap_or_else(|| String::from("[empty agent response]"));

        Ok(AgentReply::Finished { output })
    }
}

/// Pick an agent backend from the environment: HTTP endpoint, then OpenAI, then echo.
pub fn build_agent_client_from_env(default_to_echo: bool) -> anyhow::Result<SharedAgentClient> {
    if HttpAgentClient::endpoint_from(|key| env::var(key).ok()).is_some() {
        match HttpAgentClient::shared_from_env() {
            Ok(client) => return Ok(client),
            Err(err) => warn!(?err, "HTTP agent client could not be built; trying OpenAI"),
        }
    }

    match OpenAiAgentClient::shared_from_env() {
        Ok(client) => Ok(client),
        Err(err) if default_to_echo => {
            warn!(?err, "No agent backend configured; falling back to EchoAgentClient");
            Ok(EchoAgentClient::shared())
        }
        Err(err) => Err(err),
    }
}
