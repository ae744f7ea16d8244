//! Built-in provider presets.
//!
//! Each preset defines the base URL, wire format, and default environment variable
//! for the API key, so a config only needs a provider name and a model.

use crate::format::FormatKind;

#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub format: FormatKind,
    pub default_api_key_env: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        format: FormatKind::OpenAiChat,
        default_api_key_env: "OPENAI_API_KEY",
    },
    ProviderPreset {
        name: "openai-responses",
        base_url: "https://api.openai.com/v1",
        format: FormatKind::OpenAiResponses,
        default_api_key_env: "OPENAI_API_KEY",
    },
    ProviderPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        format: FormatKind::OpenAiChat,
        default_api_key_env: "OPENROUTER_API_KEY",
    },
    ProviderPreset {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference/v1",
        format: FormatKind::OpenAiChat,
        default_api_key_env: "FIREWORKS_API_KEY",
    },
    ProviderPreset {
        name: "together",
        base_url: "https://api.together.xyz/v1",
        format: FormatKind::OpenAiChat,
        default_api_key_env: "TOGETHER_API_KEY",
    },
    ProviderPreset {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        format: FormatKind::OpenAiChat,
        default_api_key_env: "GROQ_API_KEY",
    },
    ProviderPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        format: FormatKind::OpenAiChat,
        default_api_key_env: "DEEPSEEK_API_KEY",
    },
    ProviderPreset {
        name: "anthropic",
        base_url: "https://api.anthropic.com",
        format: FormatKind::AnthropicMessages,
        default_api_key_env: "ANTHROPIC_API_KEY",
    },
    // Bearer token comes from the ChatGPT OAuth flow, not an API key.
    ProviderPreset {
        name: "chatgpt-codex",
        base_url: "https://chatgpt.com/backend-api/codex",
        format: FormatKind::OpenAiResponses,
        default_api_key_env: "CHATGPT_ACCESS_TOKEN",
    },
];

impl ProviderPreset {
    /// Case-insensitive; `_` and `-` are interchangeable.
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ProviderPreset> {
        let wanted = name.trim().to_lowercase().replace('_', "-");
        PRESETS.iter().find(|p| p.name == wanted)
    }

    #[must_use]
    pub fn all() -> &'static [ProviderPreset] {
        PRESETS
    }

    pub fn names() -> Vec<&'static str> {
        PRESETS.iter().map(|p| p.name).collect()
    }
}
