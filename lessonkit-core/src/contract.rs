//! # contract: the text provider seam
//!
//! A [`TextProvider`] is one external text-generation backend. Concrete
//! clients (HTTP APIs) live in the `lessonkit` crate; the core only ever
//! talks to this trait, which keeps the fallback chain and the AI services
//! testable with `mockall` mocks.
//!
//! ## Adding a backend
//! - Implement [`TextProvider`] for your client.
//! - Report [`ProviderError::Unconfigured`] when the client has no usable
//!   credential, rather than failing at construction time.
//! - Convert transport and decoding failures into [`ProviderError::CallFailed`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use thiserror::Error;

/// A single generation request: the user prompt plus an optional system instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Stable identity of a provider, reported with every success and failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why one provider attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider has no credential configured")]
    Unconfigured,
    #[error("provider call failed: {0}")]
    CallFailed(String),
    #[error("provider call timed out after {0:?}")]
    TimedOut(Duration),
}

/// One text-generation backend.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Whether the provider holds a credential it can call with.
    fn is_configured(&self) -> bool;

    /// Generates text for `request`. Unconfigured providers return
    /// [`ProviderError::Unconfigured`] without doing any I/O.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}
