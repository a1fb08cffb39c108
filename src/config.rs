// Process configuration, read once at startup.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::llm::{AiProvider, MockProvider, OpenAiCompatibleProvider, ProviderFlavor};
use crate::rag::QueryMode;

const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiBackend {
    Mock,
    OpenAi,
    LmStudio,
    OpenRouter,
}

impl AiBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "mock" => Ok(AiBackend::Mock),
            "openai" => Ok(AiBackend::OpenAi),
            "lmstudio" => Ok(AiBackend::LmStudio),
            "openrouter" => Ok(AiBackend::OpenRouter),
            other => Err(anyhow!("unknown AI_BACKEND: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiBackend::Mock => "mock",
            AiBackend::OpenAi => "openai",
            AiBackend::LmStudio => "lmstudio",
            AiBackend::OpenRouter => "openrouter",
        }
    }

    /// The offline mock has no meaningful embeddings, so it searches by keyword.
    pub fn default_query_mode(&self) -> QueryMode {
        match self {
            AiBackend::Mock => QueryMode::Lexical,
            _ => QueryMode::Vector,
        }
    }

    pub fn flavor(&self) -> Option<ProviderFlavor> {
        match self {
            AiBackend::Mock => None,
            AiBackend::OpenAi => Some(ProviderFlavor::OpenAi),
            AiBackend::LmStudio => Some(ProviderFlavor::LmStudio),
            AiBackend::OpenRouter => Some(ProviderFlavor::OpenRouter),
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            AiBackend::Mock => "MOCK",
            AiBackend::OpenAi => "OPENAI",
            AiBackend::LmStudio => "LMSTUDIO",
            AiBackend::OpenRouter => "OPENROUTER",
        }
    }
}

/// Connection settings for a networked backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSettings {
    pub flavor: ProviderFlavor,
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embed_model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: AiBackend,
    pub data_dir: PathBuf,
    /// `None` for the mock backend.
    pub provider: Option<ProviderSettings>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = AiBackend::parse(&get("AI_BACKEND").unwrap_or_default())?;
        let data_dir = PathBuf::from(
            get("PORTAL_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );

        let provider = backend.flavor().map(|flavor| {
            let prefix = backend.env_prefix();
            // OpenRouter exposes no embedding model; ignore any override.
            let embed_model = flavor.default_embed_model().map(|default| {
                get(&format!("{prefix}_EMBED_MODEL")).unwrap_or_else(|| default.to_string())
            });
            ProviderSettings {
                flavor,
                base_url: get(&format!("{prefix}_BASE_URL"))
                    .unwrap_or_else(|| flavor.default_base_url().to_string()),
                api_key: get(&format!("{prefix}_API_KEY")),
                chat_model: get(&format!("{prefix}_CHAT_MODEL"))
                    .unwrap_or_else(|| flavor.default_chat_model().to_string()),
                embed_model,
            }
        });

        Ok(Self {
            backend,
            data_dir,
            provider,
        })
    }

    pub fn default_query_mode(&self) -> QueryMode {
        self.backend.default_query_mode()
    }
}

/// Constructs the one provider the process uses for its whole lifetime.
///
/// A networked backend with a missing API key still builds; its calls fail
/// with `NotConfigured` and degrade to fallback text.
pub fn build_provider(config: &AppConfig) -> Box<dyn AiProvider> {
    match &config.provider {
        None => Box::new(MockProvider::new()),
        Some(settings) => Box::new(OpenAiCompatibleProvider::new(
            settings.flavor,
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.chat_model.clone(),
            settings.embed_model.clone(),
        )),
    }
}
