use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8019;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// The reserved tenant that always exists.
pub const ROOT_PROJECT_ID: &str = "__root__";
/// Hard cap on a project's profile-config document.
pub const MAX_PROFILE_CONFIG_BYTES: usize = 65_535;

/// Top-level config (recall.toml + RECALL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub flush: FlushConfig,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            memory: MemoryConfig::default(),
            flush: FlushConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Process-wide root bearer token. Per-project tokens live in the
    /// projects table.
    #[serde(default = "default_token")]
    pub access_token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            access_token: default_token(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint, without trailing slash.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Model for extract/merge/organize/tagging.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Cheaper model for chat summaries.
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Retry budget for transient provider errors.
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            summary_model: default_summary_model(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

/// Knobs of the consolidation pipeline and the stores. Per-project YAML
/// config overrides the flags, never the sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "en" or "zh"; prompt pack and context rendering language.
    #[serde(default = "default_language")]
    pub language: String,
    /// Buffer size that triggers a flush on enqueue.
    #[serde(default = "default_max_buffer_tokens")]
    pub max_buffer_tokens: usize,
    /// Largest transcript suffix one flush will process.
    #[serde(default = "default_max_process_tokens")]
    pub max_process_tokens: usize,
    /// Per-topic slot cap; exceeding topics get reorganized.
    #[serde(default = "default_max_profile_subtopics")]
    pub max_profile_subtopics: usize,
    /// Per-slot content cap in tokens; longer values are re-summarized.
    #[serde(default = "default_max_pre_profile_tokens")]
    pub max_pre_profile_token_size: usize,
    /// Transcripts below this size skip the event summary.
    #[serde(default = "default_min_event_summary_tokens")]
    pub min_event_summary_tokens: usize,
    #[serde(default = "default_profile_cache_ttl")]
    pub profile_cache_ttl_secs: u64,
    /// Keep chat blobs after successful consolidation.
    #[serde(default)]
    pub persist_chat_blobs: bool,
    #[serde(default = "bool_true")]
    pub enable_event_summary: bool,
    /// Drop extracted facts outside the project taxonomy.
    #[serde(default)]
    pub profile_strict_mode: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            max_buffer_tokens: default_max_buffer_tokens(),
            max_process_tokens: default_max_process_tokens(),
            max_profile_subtopics: default_max_profile_subtopics(),
            max_pre_profile_token_size: default_max_pre_profile_tokens(),
            min_event_summary_tokens: default_min_event_summary_tokens(),
            profile_cache_ttl_secs: default_profile_cache_ttl(),
            persist_chat_blobs: false,
            enable_event_summary: true,
            profile_strict_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Lock TTL; must sit well above one flush's expected duration.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    /// How long a synchronous flush blocks waiting for the user lock.
    #[serde(default = "default_lock_block")]
    pub lock_block_secs: u64,
    /// Background worker: batches drained per lock acquisition.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Background worker: total wall-clock budget.
    #[serde(default = "default_max_total_time")]
    pub max_total_time_secs: u64,
    /// Background worker: stop after this many consecutive batch failures.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl(),
            lock_block_secs: default_lock_block(),
            max_iterations: default_max_iterations(),
            max_total_time_secs: default_max_total_time(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_token() -> String {
    "change-me".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.recall/recall.db", home)
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dim() -> usize {
    1536
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_llm_retries() -> u32 {
    4
}
fn default_language() -> String {
    "en".to_string()
}
fn default_max_buffer_tokens() -> usize {
    2048
}
fn default_max_process_tokens() -> usize {
    8192
}
fn default_max_profile_subtopics() -> usize {
    12
}
fn default_max_pre_profile_tokens() -> usize {
    128
}
fn default_min_event_summary_tokens() -> usize {
    64
}
fn default_profile_cache_ttl() -> u64 {
    300
}
fn default_lock_ttl() -> u64 {
    300
}
fn default_lock_block() -> u64 {
    32
}
fn default_max_iterations() -> u32 {
    100
}
fn default_max_total_time() -> u64 {
    900
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn bool_true() -> bool {
    true
}

impl RecallConfig {
    /// Load config from a TOML file with RECALL_* env var overrides.
    ///
    /// Env keys use `__` as the section separator so keys that themselves
    /// contain underscores stay addressable, e.g.
    /// `RECALL_MEMORY__MAX_BUFFER_TOKENS=4096`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RecallConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RECALL_").split("__"))
            .extract()
            .map_err(|e| crate::error::MemoryError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.recall/recall.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = RecallConfig::default();
        assert_eq!(c.gateway.port, DEFAULT_PORT);
        assert!(c.memory.max_process_tokens >= c.memory.max_buffer_tokens);
        assert!(c.flush.lock_ttl_secs > c.flush.lock_block_secs);
        assert!(c.memory.enable_event_summary);
        assert!(!c.memory.profile_strict_mode);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let c = RecallConfig::load(Some("/nonexistent/recall.toml")).unwrap();
        assert_eq!(c.memory.max_buffer_tokens, 2048);
        assert_eq!(c.llm.model, "gpt-4o");
    }
}
