//! TOML configuration.
//!
//! Loaded once at startup from `--config` (default
//! `./config/article-sync.toml`). Connection strings and tokens may also be
//! supplied through the environment, which wins over the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `ARTICLE_SYNC_SOURCE_URL` | `[source].url` |
//! | `ARTICLE_SYNC_MIRROR_URL` | `[mirror].url` |
//! | `MILVUS_TOKEN` | `[index].token` |
//!
//! `OPENAI_API_KEY` is read by the OpenAI embedding provider at call time.

use anyhow::{Context, Result};
use article_sync_core::permalink::PermalinkBuilder;
use article_sync_core::render::RenderConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::mirror_pg::MAX_BATCH_SIZE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub mirror: MirrorConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// MySQL/MariaDB connection URL.
    #[serde(default)]
    pub url: String,
    /// Prefix of every permalink.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path segment used when an article sits in a top-level category.
    #[serde(default = "default_section")]
    pub default_section: String,
}

fn default_base_url() -> String {
    "https://nguoidonghanh.viettel.vn".to_string()
}
fn default_section() -> String {
    "tin-tuc".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    /// PostgreSQL connection URL.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Rows per INSERT statement.
    #[serde(default = "default_mirror_batch")]
    pub batch_size: usize,
}

fn default_schema() -> String {
    "via_ndh".to_string()
}
fn default_table() -> String {
    "data_ndh".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_mirror_batch() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Milvus base URI, e.g. `http://localhost:19530`.
    pub uri: String,
    pub collection: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_dense_dims")]
    pub dense_dims: usize,
}

fn default_dense_dims() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderSection {
    /// Defaults to `[source].base_url`.
    #[serde(default)]
    pub base_domain: Option<String>,
    #[serde(default = "default_max_url_len")]
    pub max_url_len: usize,
    #[serde(default = "default_author_label")]
    pub author_label: String,
    #[serde(default = "default_unknown_author")]
    pub unknown_author: String,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            base_domain: None,
            max_url_len: default_max_url_len(),
            author_label: default_author_label(),
            unknown_author: default_unknown_author(),
        }
    }
}

fn default_max_url_len() -> usize {
    300
}
fn default_author_label() -> String {
    "Tác giả".to_string()
}
fn default_unknown_author() -> String {
    "không xác định".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Also reconcile once right after startup.
    #[serde(default)]
    pub reconcile_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            poll_interval_secs: default_poll_interval(),
            reconcile_on_startup: false,
        }
    }
}

fn default_sync_interval() -> u64 {
    60
}
fn default_reconcile_interval() -> u64 {
    2 * 24 * 60 * 60
}
fn default_poll_interval() -> u64 {
    1
}

impl ScheduleConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            base_domain: self
                .render
                .base_domain
                .clone()
                .unwrap_or_else(|| self.source.base_url.clone()),
            max_url_len: self.render.max_url_len,
            author_label: self.render.author_label.clone(),
            unknown_author: self.render.unknown_author.clone(),
        }
    }

    pub fn permalinks(&self) -> PermalinkBuilder {
        PermalinkBuilder::new(&self.source.base_url, &self.source.default_section)
    }

    /// `"schema"."table"`, already validated as plain identifiers.
    pub fn mirror_table(&self) -> String {
        format!("\"{}\".\"{}\"", self.mirror.schema, self.mirror.table)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parses, applies environment overrides from `env`, and validates.
pub fn parse_config(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(url) = env("ARTICLE_SYNC_SOURCE_URL") {
        config.source.url = url;
    }
    if let Some(url) = env("ARTICLE_SYNC_MIRROR_URL") {
        config.mirror.url = url;
    }
    if let Some(token) = env("MILVUS_TOKEN") {
        config.index.token = Some(token);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.url.trim().is_empty() {
        anyhow::bail!("source.url must be set (or ARTICLE_SYNC_SOURCE_URL)");
    }
    if config.mirror.url.trim().is_empty() {
        anyhow::bail!("mirror.url must be set (or ARTICLE_SYNC_MIRROR_URL)");
    }
    if config.index.uri.trim().is_empty() {
        anyhow::bail!("index.uri must be set");
    }
    if !is_identifier(&config.index.collection) {
        anyhow::bail!(
            "index.collection '{}' must be letters, digits and underscores",
            config.index.collection
        );
    }

    for (name, value) in [
        ("mirror.schema", &config.mirror.schema),
        ("mirror.table", &config.mirror.table),
    ] {
        if !is_identifier(value) {
            anyhow::bail!("{} '{}' must be letters, digits and underscores", name, value);
        }
    }
    if config.mirror.max_connections == 0 {
        anyhow::bail!("mirror.max_connections must be > 0");
    }
    if config.mirror.batch_size == 0 || config.mirror.batch_size > MAX_BATCH_SIZE {
        anyhow::bail!(
            "mirror.batch_size must be between 1 and {} (PostgreSQL allows 65535 parameters per statement)",
            MAX_BATCH_SIZE
        );
    }

    if config.render.max_url_len == 0 {
        anyhow::bail!("render.max_url_len must be > 0");
    }

    let schedule = &config.schedule;
    if schedule.sync_interval_secs == 0 {
        anyhow::bail!("schedule.sync_interval_secs must be > 0");
    }
    if schedule.reconcile_interval_secs == 0 {
        anyhow::bail!("schedule.reconcile_interval_secs must be > 0");
    }
    if schedule.poll_interval_secs == 0 {
        anyhow::bail!("schedule.poll_interval_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        match config.embedding.dims {
            None | Some(0) => anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            ),
            Some(dims) if dims != config.index.dense_dims => anyhow::bail!(
                "embedding.dims ({}) must match index.dense_dims ({})",
                dims,
                config.index.dense_dims
            ),
            Some(_) => {}
        }
    }

    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
