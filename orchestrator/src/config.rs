use crate::index::DEFAULT_DIMENSION;
use crate::orchestrator::OrchestratorSettings;
use anyhow::{bail, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub google_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub max_search_results: usize,
    pub search_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub vector_dimension: usize,
    pub run_ttl_secs: i64,
    pub max_retained_runs: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            port: parse_var("PORT", 8000)?,
            gemini_api_key: optional_var("GEMINI_API_KEY"),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            google_api_key: optional_var("GOOGLE_API_KEY"),
            search_engine_id: optional_var("SEARCH_ENGINE_ID"),
            max_search_results: parse_var("MAX_SEARCH_RESULTS", 10)?,
            search_timeout_secs: parse_var("SEARCH_TIMEOUT_SECS", 15)?,
            llm_timeout_secs: parse_var("LLM_TIMEOUT_SECS", 60)?,
            vector_dimension: parse_var("VECTOR_DIMENSION", DEFAULT_DIMENSION)?,
            run_ttl_secs: parse_var("RUN_TTL_SECS", 3600)?,
            max_retained_runs: parse_var("MAX_RETAINED_RUNS", 256)?,
            log_level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// API credentials are required to run the real worker agents.
    pub fn validate(&self) -> Result<()> {
        if self.gemini_api_key.is_none() {
            bail!("GEMINI_API_KEY is required. Please set it in your .env file");
        }
        if self.google_api_key.is_none() || self.search_engine_id.is_none() {
            bail!("GOOGLE_API_KEY and SEARCH_ENGINE_ID are required for web search");
        }
        if self.vector_dimension == 0 {
            bail!("VECTOR_DIMENSION must be greater than zero");
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_search_results: self.max_search_results,
            run_ttl: chrono::Duration::seconds(self.run_ttl_secs.max(0)),
            max_retained_runs: self.max_retained_runs,
        }
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 8000,
            gemini_api_key: Some("key".to_string()),
            gemini_model: "gemini-1.5-flash".to_string(),
            google_api_key: Some("key".to_string()),
            search_engine_id: Some("cx".to_string()),
            max_search_results: 10,
            search_timeout_secs: 15,
            llm_timeout_secs: 60,
            vector_dimension: 384,
            run_ttl_secs: 3600,
            max_retained_runs: 256,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_validate_requires_credentials() {
        assert!(config().validate().is_ok());

        let mut missing_llm = config();
        missing_llm.gemini_api_key = None;
        assert!(missing_llm.validate().is_err());

        let mut missing_search = config();
        missing_search.search_engine_id = None;
        assert!(missing_search.validate().is_err());
    }

    #[test]
    fn test_orchestrator_settings() {
        let settings = config().orchestrator_settings();
        assert_eq!(settings.max_search_results, 10);
        assert_eq!(settings.run_ttl, chrono::Duration::hours(1));
    }
}
