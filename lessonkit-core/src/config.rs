use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const MIB: u64 = 1024 * 1024;

/// Process-wide settings, built once at startup and passed by reference to
/// every component that needs them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub limits: Limits,
    pub ai: AiSettings,
}

impl Settings {
    pub fn trace_loaded(&self) {
        info!(
            upload_dir = %self.storage.upload_dir.display(),
            output_dir = %self.storage.output_dir.display(),
            scratch_dir = %self.storage.scratch_dir.display(),
            max_file_size = self.limits.max_file_size,
            providers = ?self.ai.providers,
            "Loaded Settings"
        );
        debug!(?self, "Settings loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            scratch_dir: PathBuf::from("temp"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Limits {
    /// Ceiling in bytes for every ingested payload, inclusive.
    pub max_file_size: u64,
    /// Write increment for chunked ingestion.
    pub chunk_size: usize,
    pub pages_per_part: usize,
    pub text_chunk_chars: usize,
    /// Age after which the janitor removes unreferenced artifacts.
    pub max_artifact_age_secs: u64,
}

impl Limits {
    pub fn max_artifact_age(&self) -> Duration {
        Duration::from_secs(self.max_artifact_age_secs)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: 25 * MIB,
            chunk_size: MIB as usize,
            pages_per_part: 50,
            text_chunk_chars: 10_000,
            max_artifact_age_secs: 3600,
        }
    }
}

/// Which concrete backend a provider slot refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => f.write_str("openai"),
            ProviderKind::Anthropic => f.write_str("anthropic"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiSettings {
    /// Providers in the order they are attempted.
    pub providers: Vec<ProviderKind>,
    pub openai: ModelSettings,
    pub anthropic: ModelSettings,
    /// Deadline for a single provider attempt. `None` leaves calls unbounded.
    pub attempt_timeout_secs: Option<u64>,
    /// Extra attempts per provider after the first failure.
    pub retries: u32,
}

impl AiSettings {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }

    pub fn model(&self, kind: ProviderKind) -> &ModelSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            providers: vec![ProviderKind::OpenAi, ProviderKind::Anthropic],
            openai: ModelSettings {
                model: "gpt-4o-mini".to_string(),
                base_url: "https://api.openai.com".to_string(),
                ..ModelSettings::default()
            },
            anthropic: ModelSettings {
                model: "claude-3-5-sonnet-20241022".to_string(),
                base_url: "https://api.anthropic.com".to_string(),
                ..ModelSettings::default()
            },
            attempt_timeout_secs: None,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            base_url: String::new(),
            max_tokens: 2000,
            temperature: 0.7,
        }
    }
}
