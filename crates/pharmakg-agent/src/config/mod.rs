//! Configuration loading for PharmaKG.
//! Reads pharmakg.toml from the current directory or the path in the PHARMAKG_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use pharmakg_enrich::{EnrichmentConfig, FixedDelay};
use pharmakg_llm::{BackendConfig, BackendKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub enrichment: EnrichmentSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: BackendKind,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

fn default_provider()     -> BackendKind { BackendKind::Ollama }
fn default_model()        -> String { "llama3.1:8b".to_string() }
fn default_timeout_secs() -> u64 { 60 }
fn default_rpm()          -> u32 { 20 }
fn default_max_tokens()   -> u32 { 1024 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            requests_per_minute: default_rpm(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    fn api_key_env(&self) -> Option<&'static str> {
        match self.provider {
            BackendKind::Ollama => None,
            BackendKind::OpenAi => Some("PHARMAKG_OPENAI_API_KEY"),
            BackendKind::Anthropic => Some("PHARMAKG_ANTHROPIC_API_KEY"),
            BackendKind::OpenAiCompatible => Some("PHARMAKG_COMPAT_API_KEY"),
        }
    }

    /// Backend settings, taking the API key from the environment when the
    /// file leaves it empty.
    pub fn backend_config(&self) -> BackendConfig {
        let api_key = if self.api_key.is_empty() {
            self.api_key_env()
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.is_empty())
        } else {
            Some(self.api_key.clone())
        };
        BackendConfig {
            kind: self.provider,
            model: self.model.clone(),
            api_key,
            base_url: self.base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Neo4j,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,
    #[serde(default = "default_neo4j_user")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: Option<String>,
    /// JSON seed for the in-memory store.
    pub seed_file: Option<String>,
}

fn default_neo4j_uri()  -> String { "bolt://localhost:7687".to_string() }
fn default_neo4j_user() -> String { "neo4j".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            uri: default_neo4j_uri(),
            username: default_neo4j_user(),
            password: String::new(),
            database: None,
            seed_file: None,
        }
    }
}

impl StoreConfig {
    /// Password from the file, else `PHARMAKG_NEO4J_PASSWORD`.
    pub fn resolved_password(&self) -> String {
        if self.password.is_empty() {
            std::env::var("PHARMAKG_NEO4J_PASSWORD").unwrap_or_default()
        } else {
            self.password.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSection {
    /// Provenance tag; defaults to the configured model id.
    pub predicted_by: Option<String>,
    /// Overrides the delay derived from `llm.requests_per_minute`.
    pub inter_call_delay_ms: Option<u64>,
    #[serde(default = "default_cascade_depth")]
    pub default_cascade_depth: u8,
    #[serde(default = "default_max_effects")]
    pub max_effects_per_call: usize,
}

fn default_cascade_depth() -> u8 { 2 }
fn default_max_effects()   -> usize { 8 }

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            predicted_by: None,
            inter_call_delay_ms: None,
            default_cascade_depth: default_cascade_depth(),
            max_effects_per_call: default_max_effects(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("PHARMAKG_CONFIG")
            .unwrap_or_else(|_| "pharmakg.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy pharmakg.example.toml to pharmakg.toml and edit it.",
                path
            );
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if !(1..=3).contains(&config.enrichment.default_cascade_depth) {
            anyhow::bail!(
                "enrichment.default_cascade_depth must be 1, 2 or 3 (got {})",
                config.enrichment.default_cascade_depth
            );
        }
        Ok(config)
    }

    pub fn inter_call_delay(&self) -> Duration {
        match self.enrichment.inter_call_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => FixedDelay::per_minute(self.llm.requests_per_minute).delay(),
        }
    }

    /// Pipeline settings. A local backend has no call budget, so it runs
    /// unthrottled unless `inter_call_delay_ms` is set explicitly.
    pub fn enrichment_config(&self, local_backend: bool) -> EnrichmentConfig {
        let inter_call_delay = if local_backend && self.enrichment.inter_call_delay_ms.is_none() {
            Duration::ZERO
        } else {
            self.inter_call_delay()
        };
        EnrichmentConfig {
            predicted_by: self
                .enrichment
                .predicted_by
                .clone()
                .unwrap_or_else(|| self.llm.model.clone()),
            inter_call_delay,
            call_timeout: Duration::from_secs(self.llm.timeout_secs),
            max_effects_per_call: self.enrichment.max_effects_per_call,
            max_tokens: Some(self.llm.max_tokens),
            temperature: Some(self.llm.temperature),
        }
    }
}
