//! Configuration for the lead harvester

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Remote service
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub session_cookie: Option<String>,
    pub csrf_token: Option<String>,

    // Item budgets (hard ceilings per collection type)
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    #[serde(default = "default_max_records")]
    pub max_comments: usize,
    #[serde(default = "default_max_records")]
    pub max_likers: usize,
    #[serde(default = "default_max_records")]
    pub max_followers: usize,
    #[serde(default = "default_max_records")]
    pub max_leads: usize,

    // Pagination pacing
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    // Concurrency
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    // Enrichment worker pool sizing
    #[serde(default = "default_worker_pool_floor")]
    pub worker_pool_floor: usize,
    #[serde(default = "default_worker_pool_ceiling")]
    pub worker_pool_ceiling: usize,
    #[serde(default = "default_batches_per_worker")]
    pub batches_per_worker: usize,
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    #[serde(default = "default_enrich_delay_ms")]
    pub enrich_delay_ms: u64,

    // Artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_seed_dir")]
    pub seed_dir: PathBuf,

    // Seed overrides (comma/whitespace separated; used only when the
    // corresponding artifact has no content)
    pub post_ids: Option<String>,
    pub media_ids: Option<String>,
    pub followers: Option<String>,
}

fn default_api_base_url() -> String {
    "https://www.instagram.com".to_string()
}

fn default_max_posts() -> usize {
    1000
}

fn default_max_records() -> usize {
    500
}

fn default_page_delay_ms() -> u64 {
    2000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_rate_limit_rpm() -> u32 {
    60
}

fn default_worker_pool_floor() -> usize {
    4
}

fn default_worker_pool_ceiling() -> usize {
    16
}

fn default_batches_per_worker() -> usize {
    3
}

fn default_min_batch_size() -> usize {
    10
}

fn default_enrich_delay_ms() -> u64 {
    2000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_seed_dir() -> PathBuf {
    PathBuf::from("./seed")
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        // Build config from environment
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Checks whether an authenticated session is configured.
    pub fn has_session(&self) -> bool {
        self.session_cookie.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            session_cookie: None,
            csrf_token: None,
            max_posts: default_max_posts(),
            max_comments: default_max_records(),
            max_likers: default_max_records(),
            max_followers: default_max_records(),
            max_leads: default_max_records(),
            page_delay_ms: default_page_delay_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
            rate_limit_rpm: default_rate_limit_rpm(),
            worker_pool_floor: default_worker_pool_floor(),
            worker_pool_ceiling: default_worker_pool_ceiling(),
            batches_per_worker: default_batches_per_worker(),
            min_batch_size: default_min_batch_size(),
            enrich_delay_ms: default_enrich_delay_ms(),
            output_dir: default_output_dir(),
            seed_dir: default_seed_dir(),
            post_ids: None,
            media_ids: None,
            followers: None,
        }
    }
}

/// Config with pacing delays suppressed, for fast unit tests.
#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        page_delay_ms: 0,
        retry_base_delay_ms: 1,
        enrich_delay_ms: 0,
        ..Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_enters_the_taxonomy() {
        let err: crate::error::HarvestError =
            config::ConfigError::Message("bad value".into()).into();
        assert!(matches!(err, crate::error::HarvestError::ConfigError(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.max_leads, 500);
        assert_eq!(config.max_comments, 500);
        assert_eq!(config.page_delay_ms, 2000);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.worker_pool_floor, 4);
        assert_eq!(config.worker_pool_ceiling, 16);
        assert!(!config.has_session());
    }
}
