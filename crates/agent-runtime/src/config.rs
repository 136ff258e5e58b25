//! Process configuration, read from `EVOAGENT_*` environment variables
//! (spec §6), grounded on the teacher's `LlmConfig`/`SwarmConfig`
//! env-var-driven `Default` idiom.

use std::time::Duration;

/// LLM provider configuration for the default HTTP-backed collaborator.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: std::env::var("EVOAGENT_LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
            model: std::env::var("EVOAGENT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key: std::env::var("EVOAGENT_LLM_API_KEY").ok(),
            base_url: std::env::var("EVOAGENT_LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            timeout: std::env::var("EVOAGENT_LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60)),
            max_retries: std::env::var("EVOAGENT_LLM_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(3),
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub log_level: String,
    pub data_dir: std::path::PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            log_level: std::env::var("EVOAGENT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            data_dir: std::env::var("EVOAGENT_DATA_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|_| std::path::PathBuf::from(".evoagent")),
        }
    }
}

impl AppConfig {
    pub fn session_dir(&self) -> std::path::PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn knowledge_dir(&self) -> std::path::PathBuf {
        self.data_dir.join("knowledge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_defaults_when_env_unset() {
        std::env::remove_var("EVOAGENT_LLM_PROVIDER");
        let config = LlmConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn app_config_derives_subdirectories_from_data_dir() {
        let mut config = AppConfig::default();
        config.data_dir = std::path::PathBuf::from("/tmp/evoagent-test");
        assert_eq!(config.session_dir(), std::path::PathBuf::from("/tmp/evoagent-test/sessions"));
        assert_eq!(config.knowledge_dir(), std::path::PathBuf::from("/tmp/evoagent-test/knowledge"));
    }
}
