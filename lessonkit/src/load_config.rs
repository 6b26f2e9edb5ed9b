/// `load_config` module: reads the optional YAML settings file and the provider
/// credentials from the environment.
///
/// YAML never carries secrets. Every section and key is optional; anything
/// left out takes the defaults of [`Settings`]. API keys come from
/// `OPENAI_API_KEY` and `ANTHROPIC_API_KEY`, after a `.env` file (if any)
/// has been loaded.
///
/// # Errors
/// All errors in this module use `anyhow::Error` and name the step that failed,
/// so they read well at the CLI boundary.
use anyhow::Result;
use lessonkit_core::config::{ProviderKind, Settings};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Loads settings from `path`, or the defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path_ref) = path else {
        info!("No config file given, using default settings");
        return Ok(Settings::default());
    };
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file deserialises to `null`, which means "all defaults".
    if config_content.trim().is_empty() {
        warn!(config_path = ?path_ref, "Config file is empty, using default settings");
        return Ok(Settings::default());
    }

    let settings: Settings = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if settings.limits.pages_per_part == 0 {
        error!(config_path = ?path_ref, "limits.pages_per_part must be positive");
        return Err(anyhow::anyhow!(
            "Invalid config: limits.pages_per_part must be at least 1"
        ));
    }

    Ok(settings)
}

/// Provider API keys. A missing or blank variable counts as not configured.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.is_some())
            .field("anthropic_api_key", &self.anthropic_api_key.is_some())
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let credentials = Self {
            openai_api_key: non_blank_var(OPENAI_API_KEY),
            anthropic_api_key: non_blank_var(ANTHROPIC_API_KEY),
        };
        info!(
            openai_configured = credentials.openai_api_key.is_some(),
            anthropic_configured = credentials.anthropic_api_key.is_some(),
            "Read provider credentials from environment"
        );
        credentials
    }

    pub fn key(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
