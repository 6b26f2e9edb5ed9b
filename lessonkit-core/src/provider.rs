//! # provider: ordered fallback across text providers
//!
//! [`ProviderChain::generate`] walks the configured providers strictly in
//! order and stops at the first success. The walk is an explicit state
//! machine: every run ends in exactly one of the two terminal states of
//! [`ProviderChainResult`].
//!
//! An optional per-attempt deadline and a retry count apply to every
//! provider. With the defaults (no deadline, zero retries) each provider is
//! attempted once and may block for as long as its transport does.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::AiSettings;
use crate::contract::{GenerationRequest, ProviderError, ProviderId, TextProvider};

/// A recorded failure of one provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    #[serde(serialize_with = "as_display")]
    pub cause: ProviderError,
}

fn as_display<S: serde::Serializer>(cause: &ProviderError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(cause)
}

/// Terminal failure of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllFailed {
    /// The provider list was empty; nothing was attempted.
    #[error("no text provider is configured")]
    NothingConfigured,
    /// Every provider was attempted and failed, in this order.
    #[error("all text providers failed: {}", summarize(.0))]
    Exhausted(Vec<ProviderFailure>),
}

impl AllFailed {
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, AllFailed::NothingConfigured)
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderChainResult {
    Success { text: String, provider: ProviderId },
    AllFailed(AllFailed),
}

impl ProviderChainResult {
    pub fn into_result(self) -> Result<(String, ProviderId), AllFailed> {
        match self {
            ProviderChainResult::Success { text, provider } => Ok((text, provider)),
            ProviderChainResult::AllFailed(reason) => Err(reason),
        }
    }
}

enum ChainState {
    NotAttempted,
    Trying(usize),
    NextProvider(usize),
    Done(ProviderChainResult),
}

#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn TextProvider>>,
    attempt_timeout: Option<Duration>,
    retries: u32,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<ProviderId> = self.providers.iter().map(|p| p.id()).collect();
        f.debug_struct("ProviderChain")
            .field("providers", &ids)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn TextProvider>>) -> Self {
        Self {
            providers,
            attempt_timeout: None,
            retries: 0,
        }
    }

    /// Builds a chain over `providers` with the deadline and retries from `settings`.
    pub fn from_settings(providers: Vec<Arc<dyn TextProvider>>, settings: &AiSettings) -> Self {
        Self::new(providers)
            .with_attempt_timeout(settings.attempt_timeout())
            .with_retries(settings.retries)
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn TextProvider>] {
        &self.providers
    }

    pub async fn generate(&self, request: &GenerationRequest) -> ProviderChainResult {
        let mut failures = Vec::new();
        let mut state = ChainState::NotAttempted;
        loop {
            state = match state {
                ChainState::NotAttempted if self.providers.is_empty() => {
                    error!("No text provider configured");
                    ChainState::Done(ProviderChainResult::AllFailed(AllFailed::NothingConfigured))
                }
                ChainState::NotAttempted => ChainState::Trying(0),
                ChainState::Trying(index) => {
                    let provider = &self.providers[index];
                    let id = provider.id();
                    match self.attempt(provider.as_ref(), request).await {
                        Ok(text) => {
                            info!(provider = %id, chars = text.len(), "Text generation succeeded");
                            ChainState::Done(ProviderChainResult::Success { text, provider: id })
                        }
                        Err(cause) => {
                            warn!(provider = %id, error = %cause, "Provider failed, falling back");
                            failures.push(ProviderFailure { provider: id, cause });
                            ChainState::NextProvider(index + 1)
                        }
                    }
                }
                ChainState::NextProvider(index) if index < self.providers.len() => {
                    ChainState::Trying(index)
                }
                ChainState::NextProvider(_) => {
                    error!(attempted = failures.len(), "All text providers failed");
                    ChainState::Done(ProviderChainResult::AllFailed(AllFailed::Exhausted(
                        std::mem::take(&mut failures),
                    )))
                }
                ChainState::Done(result) => return result,
            };
        }
    }

    /// One provider, up to `1 + retries` fresh attempts. Unconfigured
    /// providers are not retried.
    async fn attempt(
        &self,
        provider: &dyn TextProvider,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError> {
        let mut last = ProviderError::Unconfigured;
        for attempt in 0..=self.retries {
            let outcome = match self.attempt_timeout {
                Some(deadline) => tokio::time::timeout(deadline, provider.complete(request))
                    .await
                    .unwrap_or(Err(ProviderError::TimedOut(deadline))),
                None => provider.complete(request).await,
            };
            match outcome {
                Ok(text) => return Ok(text),
                Err(ProviderError::Unconfigured) => return Err(ProviderError::Unconfigured),
                Err(cause) => {
                    debug!(provider = %provider.id(), attempt, error = %cause, "Provider attempt failed");
                    last = cause;
                }
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockTextProvider;
    use mockall::Sequence;

    fn named(id: &'static str) -> MockTextProvider {
        let mut mock = MockTextProvider::new();
        mock.expect_id().return_const(ProviderId::new(id));
        mock
    }

    #[tokio::test]
    async fn empty_chain_reports_nothing_configured() {
        let chain = ProviderChain::new(vec![]);
        let result = chain.generate(&GenerationRequest::new("hi")).await;
        assert_eq!(result, ProviderChainResult::AllFailed(AllFailed::NothingConfigured));
    }

    #[tokio::test]
    async fn falls_back_in_order_and_attributes_success() {
        let mut seq = Sequence::new();
        let mut first = named("a");
        first
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::CallFailed("503".into())));
        let mut second = named("b");
        second
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("hello".into()));

        let chain = ProviderChain::new(vec![Arc::new(first), Arc::new(second)]);
        let result = chain.generate(&GenerationRequest::new("hi")).await;

        assert_eq!(
            result,
            ProviderChainResult::Success {
                text: "hello".into(),
                provider: ProviderId::new("b"),
            }
        );
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let mut first = named("a");
        first.expect_complete().times(1).returning(|_| Ok("done".into()));
        let mut second = named("b");
        second.expect_complete().never();

        let chain = ProviderChain::new(vec![Arc::new(first), Arc::new(second)]);
        let (text, provider) = chain
            .generate(&GenerationRequest::new("hi"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(text, "done");
        assert_eq!(provider.as_str(), "a");
    }

    #[tokio::test]
    async fn exhausted_chain_lists_every_failure() {
        let mut first = named("a");
        first
            .expect_complete()
            .returning(|_| Err(ProviderError::Unconfigured));
        let mut second = named("b");
        second
            .expect_complete()
            .returning(|_| Err(ProviderError::CallFailed("boom".into())));

        let chain = ProviderChain::new(vec![Arc::new(first), Arc::new(second)]);
        let result = chain.generate(&GenerationRequest::new("hi")).await;

        let ProviderChainResult::AllFailed(AllFailed::Exhausted(failures)) = result else {
            panic!("expected exhaustion, got {result:?}");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].provider.as_str(), "a");
        assert_eq!(failures[0].cause, ProviderError::Unconfigured);
        assert_eq!(failures[1].cause, ProviderError::CallFailed("boom".into()));
        assert!(!AllFailed::Exhausted(failures).is_configuration_error());
    }

    #[tokio::test]
    async fn retries_make_fresh_attempts() {
        let mut flaky = named("a");
        let mut seq = Sequence::new();
        flaky
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::CallFailed("reset".into())));
        flaky
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("second try".into()));

        let chain = ProviderChain::new(vec![Arc::new(flaky)]).with_retries(1);
        let (text, _) = chain
            .generate(&GenerationRequest::new("hi"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(text, "second try");
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl TextProvider for Stalled {
        fn id(&self) -> ProviderId {
            ProviderId::new("stalled")
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn complete(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }
    }

    #[tokio::test]
    async fn deadline_counts_as_provider_failure() {
        let mut backup = named("backup");
        backup.expect_complete().returning(|_| Ok("fallback".into()));

        let chain = ProviderChain::new(vec![Arc::new(Stalled), Arc::new(backup)])
            .with_attempt_timeout(Some(Duration::from_millis(20)));
        let (text, provider) = chain
            .generate(&GenerationRequest::new("hi"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(text, "fallback");
        assert_eq!(provider.as_str(), "backup");
    }
}
