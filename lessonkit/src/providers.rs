//! # HTTP text providers
//!
//! Concrete [`TextProvider`] clients for the OpenAI chat completions API and
//! the Anthropic messages API, plus [`build_chain`], which assembles the
//! fallback chain from settings and credentials.
//!
//! Response decoding lives in free functions so it can be tested without a
//! network.

use std::sync::Arc;

use async_trait::async_trait;
use lessonkit_core::config::{AiSettings, ModelSettings, ProviderKind};
use lessonkit_core::contract::{GenerationRequest, ProviderError, ProviderId, TextProvider};
use lessonkit_core::provider::ProviderChain;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::load_config::Credentials;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: ModelSettings,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, model: ModelSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        json!({
            "model": self.model.model,
            "messages": messages,
            "temperature": self.model.temperature,
            "max_tokens": self.model.max_tokens,
        })
    }
}

#[async_trait]
impl TextProvider for OpenAiClient {
    fn id(&self) -> ProviderId {
        ProviderId::new(ProviderKind::OpenAi.to_string())
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unconfigured);
        };
        let url = endpoint(&self.model.base_url, "/v1/chat/completions");
        debug!(url = %url, model = %self.model.model, "Calling OpenAI");
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, url = %url, "OpenAI request failed");
                ProviderError::CallFailed(e.to_string())
            })?;
        let body = read_json(response).await?;
        parse_openai_reply(&body)
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: ModelSettings,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, model: ModelSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// The messages API call carries no separate system field here: the
    /// system instruction is prepended to the prompt.
    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        let content = match request.system.as_deref().filter(|s| !s.is_empty()) {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };
        json!({
            "model": self.model.model,
            "max_tokens": self.model.max_tokens,
            "temperature": self.model.temperature,
            "messages": [{"role": "user", "content": content}],
        })
    }
}

#[async_trait]
impl TextProvider for AnthropicClient {
    fn id(&self) -> ProviderId {
        ProviderId::new(ProviderKind::Anthropic.to_string())
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unconfigured);
        };
        let url = endpoint(&self.model.base_url, "/v1/messages");
        debug!(url = %url, model = %self.model.model, "Calling Anthropic");
        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, url = %url, "Anthropic request failed");
                ProviderError::CallFailed(e.to_string())
            })?;
        let body = read_json(response).await?;
        parse_anthropic_reply(&body)
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Decodes a response body, turning non-success statuses into call failures
/// that carry the API's own error message when there is one.
async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::CallFailed(format!("failed to read response body: {e}")))?;
    let body: Option<Value> = serde_json::from_str(&text).ok();
    if !status.is_success() {
        let message = body
            .as_ref()
            .and_then(|b| b["error"]["message"].as_str())
            .unwrap_or(text.as_str());
        warn!(%status, detail = message, "Provider returned an error status");
        return Err(ProviderError::CallFailed(format!("HTTP {status}: {message}")));
    }
    body.ok_or_else(|| ProviderError::CallFailed("response body is not JSON".to_string()))
}

/// Extracts `choices[0].message.content` from a chat completion.
pub fn parse_openai_reply(body: &Value) -> Result<String, ProviderError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::CallFailed("chat completion has no message content".to_string())
        })
}

/// Extracts `content[0].text` from a messages response.
pub fn parse_anthropic_reply(body: &Value) -> Result<String, ProviderError> {
    body["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::CallFailed("message has no text content".to_string()))
}

/// Client for `kind`, carrying its credential if there is one.
pub fn client(kind: ProviderKind, settings: &AiSettings, credentials: &Credentials) -> Arc<dyn TextProvider> {
    let key = credentials.key(kind).map(str::to_string);
    let model = settings.model(kind).clone();
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(key, model)),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(key, model)),
    }
}

/// Whether each known provider could be called, in declaration order.
pub fn provider_status(settings: &AiSettings, credentials: &Credentials) -> Vec<(ProviderId, bool)> {
    ProviderKind::ALL
        .iter()
        .map(|kind| {
            let client = client(*kind, settings, credentials);
            (client.id(), client.is_configured())
        })
        .collect()
}

/// Builds the fallback chain in the configured provider order. Unconfigured
/// providers are left out, so a process with no keys at all gets an empty
/// chain and a "nothing configured" failure.
pub fn build_chain(settings: &AiSettings, credentials: &Credentials) -> ProviderChain {
    let mut providers: Vec<Arc<dyn TextProvider>> = Vec::new();
    for kind in &settings.providers {
        let client = client(*kind, settings, credentials);
        if !client.is_configured() {
            warn!(provider = %kind, "Provider has no API key, skipping");
            continue;
        }
        providers.push(client);
    }
    info!(
        providers = providers.len(),
        attempt_timeout = ?settings.attempt_timeout(),
        retries = settings.retries,
        "Built provider chain"
    );
    ProviderChain::from_settings(providers, settings)
}
