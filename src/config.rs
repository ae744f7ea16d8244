use crate::error::{BridgeError, Result};
use crate::format::FormatKind;
use crate::json::JsonObject;
use crate::providers::ProviderPreset;
use crate::stream::ReasoningTokens;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "chat-bridge.toml";
const APP_DIR: &str = "chat-bridge";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub provider: ProviderConfig,
    /// Extra HTTP headers. These override the generated ones, Authorization included.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Extra top-level body fields, merged last.
    #[serde(default)]
    pub extra: JsonObject,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub reasoning: ReasoningTokens,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatKind>,
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Body keys removed before sending.
    #[serde(default)]
    pub drop: Vec<String>,
}

impl BridgeConfig {
    /// A config for a known provider preset with everything else defaulted.
    pub fn for_provider(name: &str, model: impl Into<String>) -> Self {
        Self {
            provider: ProviderConfig {
                name: name.to_string(),
                base_url: None,
                api_key_env: None,
                format: None,
                model: model.into(),
            },
            headers: BTreeMap::new(),
            extra: JsonObject::new(),
            params: ParamsConfig::default(),
            reasoning: ReasoningTokens::default(),
            trace_log: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: explicit path > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(BridgeError::config(format!(
            "No config file found. Searched: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    fn preset(&self) -> Option<&'static ProviderPreset> {
        ProviderPreset::from_name(&self.provider.name)
    }

    /// Configured base URL, or the preset's.
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.provider.base_url {
            return Ok(url.clone());
        }

        let preset = self.preset().ok_or_else(|| {
            BridgeError::config(format!(
                "Unknown provider '{}' and no base_url configured. Known providers: {}",
                self.provider.name,
                ProviderPreset::names().join(", ")
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Configured wire format, or the preset's, or OpenAI Chat.
    pub fn effective_format(&self) -> FormatKind {
        self.provider
            .format
            .or_else(|| self.preset().map(|p| p.format))
            .unwrap_or(FormatKind::OpenAiChat)
    }

    pub fn api_key_env(&self) -> String {
        self.provider
            .api_key_env
            .clone()
            .or_else(|| self.preset().map(|p| p.default_api_key_env.to_string()))
            .unwrap_or_else(|| "API_KEY".to_string())
    }

    /// Resolve the bearer token from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        let var = self.api_key_env();
        std::env::var(&var).map_err(|_| {
            BridgeError::config(format!(
                "Environment variable '{var}' not set. Set it with your provider API key."
            ))
        })
    }
}

/// Candidate config files, in search order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join(APP_DIR).join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join(APP_DIR).join("config.toml"));
        paths.push(home.join(format!(".{CONFIG_FILE_NAME}")));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
