/*!
common/src/lib.rs

Shared configuration types for dailybrief.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file
- Default + override merging so a deployment only has to state what differs
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default region passed to the news source
pub const DEFAULT_REGION: &str = "us";
/// Default number of headlines per digest
pub const DEFAULT_HEADLINE_COUNT: usize = 5;
/// Default per-call timeout applied to every collaborator call
pub const DEFAULT_CALL_TIMEOUT_SECONDS: u64 = 60;
/// Default number of claims verified at the same time
pub const DEFAULT_VERIFY_CONCURRENCY: usize = 4;

/// News source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsConfig {
    /// "newsapi" (default) or "feeds"
    pub adapter: Option<String>,
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub region: Option<String>,
    pub count: Option<usize>,
    pub timeout_seconds: Option<u64>,
    /// Region code -> RSS/Atom feed URL, used when `adapter = "feeds"`
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,
}

/// Web search (evidence) configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: Option<String>,
    pub max_results: Option<usize>,
    pub timeout_seconds: Option<u64>,
    /// Upper bound on evidence characters embedded in a verification prompt
    pub evidence_chars: Option<usize>,
}

/// Remote LLM config (OpenAI-compatible chat completion endpoint)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// Pipeline tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub verify_concurrency: Option<usize>,
    pub call_timeout_seconds: Option<u64>,
}

/// SMTP delivery. Omit the section to disable email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: Option<u16>,
    /// Sender address, also the login user
    pub address: String,
    pub password_env: Option<String>,
    /// Recipient; defaults to `address`
    pub to: Option<String>,
    pub subject: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Chat webhook delivery. Omit the section to disable it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Name of an env var holding the webhook URL (takes precedence over `url`)
    pub url_env: Option<String>,
}

/// Quality-scoring sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// "log", "http" or "none" (default)
    pub adapter: Option<String>,
    pub endpoint: Option<String>,
    pub queue_size: Option<usize>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub email: Option<EmailConfig>,
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    /// With neither present, every section falls back to its defaults.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn region(&self) -> &str {
        self.news.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn headline_count(&self) -> usize {
        self.news.count.unwrap_or(DEFAULT_HEADLINE_COUNT)
    }

    pub fn verify_concurrency(&self) -> usize {
        self.pipeline
            .verify_concurrency
            .unwrap_or(DEFAULT_VERIFY_CONCURRENCY)
            .max(1)
    }

    pub fn call_timeout_seconds(&self) -> u64 {
        self.pipeline
            .call_timeout_seconds
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECONDS)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_from_string() {
        let toml = r#"
            [news]
            region = "gb"
            count = 3

            [llm]
            model = "gemini-1.5-pro"
            api_key_env = "GOOGLE_API_KEY"

            [email]
            smtp_server = "smtp.example.com"
            address = "me@example.com"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.region(), "gb");
        assert_eq!(cfg.headline_count(), 3);
        assert_eq!(cfg.llm.model.as_deref(), Some("gemini-1.5-pro"));
        let email = cfg.email.expect("email section");
        assert_eq!(email.address, "me@example.com");
        assert!(email.to.is_none());
        assert!(cfg.webhook.is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty config");
        assert_eq!(cfg.region(), DEFAULT_REGION);
        assert_eq!(cfg.headline_count(), DEFAULT_HEADLINE_COUNT);
        assert_eq!(cfg.verify_concurrency(), DEFAULT_VERIFY_CONCURRENCY);
        assert_eq!(cfg.call_timeout_seconds(), DEFAULT_CALL_TIMEOUT_SECONDS);
        assert!(cfg.email.is_none());
        assert!(cfg.news.feeds.is_empty());
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let cfg: Config = toml::from_str("[pipeline]\nverify_concurrency = 0").expect("parse");
        assert_eq!(cfg.verify_concurrency(), 1);
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let mut default_file = tempfile::NamedTempFile::new().expect("tmp default");
        writeln!(
            default_file,
            "[news]\nregion = \"us\"\ncount = 5\n\n[news.feeds]\nus = \"https://example.com/us.xml\"\n\n[pipeline]\ncall_timeout_seconds = 30"
        )
        .expect("write default");

        let mut override_file = tempfile::NamedTempFile::new().expect("tmp override");
        writeln!(
            override_file,
            "[news]\ncount = 2\n\n[news.feeds]\nfr = \"https://example.com/fr.xml\""
        )
        .expect("write override");

        let cfg = Config::load_with_defaults(Some(default_file.path()), Some(override_file.path()))
            .await
            .expect("load merged config");

        assert_eq!(cfg.region(), "us");
        assert_eq!(cfg.headline_count(), 2);
        assert_eq!(cfg.call_timeout_seconds(), 30);
        assert_eq!(cfg.news.feeds.len(), 2);
        assert_eq!(cfg.news.feeds["fr"], "https://example.com/fr.xml");
    }

    #[tokio::test]
    async fn missing_files_are_skipped() {
        let cfg = Config::load_with_defaults(
            Some(Path::new("/nonexistent/config.default.toml")),
            None,
        )
        .await
        .expect("load without files");
        assert_eq!(cfg.headline_count(), DEFAULT_HEADLINE_COUNT);
    }

    #[tokio::test]
    async fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(file, "[news\ncount = ").expect("write");
        let err = Config::from_file(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }
}
