use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub snippets: SnippetConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub augment: AugmentConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    /// Upload size ceiling, enforced before parsing begins.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnippetConfig {
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_snippet_length")]
    pub snippet_length: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            max_snippets: default_max_snippets(),
            snippet_length: default_snippet_length(),
        }
    }
}

fn default_max_snippets() -> usize {
    3
}
fn default_snippet_length() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    /// Timeout around the knowledge store call; on expiry the search
    /// degrades to an empty, flagged outcome.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}
fn default_store_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval for the optional background sweep of expired entries.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AugmentConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Soft token budget for the context block; approximated by
    /// character count / chars_per_token.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            token_budget: default_token_budget(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_token_budget() -> usize {
    1500
}
fn default_chars_per_token() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Primary provider: "openai", "anthropic", or "disabled".
    #[serde(default = "default_provider_name")]
    pub primary: String,
    /// Optional fallback provider, tried once when the primary fails.
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_provider_max_retries")]
    pub max_retries: u32,
    /// Override API base URLs (tests, proxies).
    #[serde(default)]
    pub openai_url: Option<String>,
    #[serde(default)]
    pub anthropic_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary: default_provider_name(),
            fallback: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout_secs(),
            max_retries: default_provider_max_retries(),
            openai_url: None,
            anthropic_url: None,
        }
    }
}

fn default_provider_name() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_provider_timeout_secs() -> u64 {
    30
}
fn default_provider_max_retries() -> u32 {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.parser.max_upload_bytes == 0 {
        anyhow::bail!("parser.max_upload_bytes must be > 0");
    }
    if config.snippets.snippet_length == 0 {
        anyhow::bail!("snippets.snippet_length must be > 0");
    }
    if config.search.default_limit == 0 {
        anyhow::bail!("search.default_limit must be >= 1");
    }
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }
    if config.augment.chars_per_token == 0 {
        anyhow::bail!("augment.chars_per_token must be > 0");
    }
    if !(0.0..=2.0).contains(&config.provider.temperature) {
        anyhow::bail!("provider.temperature must be in [0.0, 2.0]");
    }

    for name in std::iter::once(config.provider.primary.as_str())
        .chain(config.provider.fallback.as_deref())
    {
        match name {
            "disabled" | "openai" | "anthropic" => {}
            other => anyhow::bail!(
                "Unknown provider: '{}'. Must be disabled, openai, or anthropic.",
                other
            ),
        }
    }

    Ok(())
}
