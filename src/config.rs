use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_URL: &str = "sqlite:data/lingua.db?mode=rwc";
const DEFAULT_LOG_DIR: &str = "./logs";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_TIMEOUT_MS: u64 = 60_000;

/// Everything the process reads from the environment, resolved once at
/// startup. Services take values from here instead of consulting env
/// variables themselves.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_dir: String,
    pub database_url: String,
    pub planner: PlannerConfig,
}

/// Connection settings for the generative planner backend.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_string("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let host = env_string("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        Self {
            host,
            port,
            log_level: env_string("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_to_file: env_string("ENABLE_FILE_LOGS")
                .map(|value| is_truthy(&value))
                .unwrap_or(false),
            log_dir: env_string("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
            database_url: env_string("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            planner: PlannerConfig::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PlannerConfig {
    pub fn from_env() -> Self {
        Self::resolve(
            env_string("LLM_API_KEY"),
            env_string("LLM_MODEL"),
            env_string("LLM_API_ENDPOINT"),
            env_string("LLM_TIMEOUT").and_then(|value| value.parse::<u64>().ok()),
        )
    }

    fn resolve(
        api_key: Option<String>,
        model: Option<String>,
        api_endpoint: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            api_endpoint: normalize_endpoint(
                api_endpoint.unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
            ),
            timeout: Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_LLM_TIMEOUT_MS)),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

/// The planner speaks the /v1 chat-completions shape; bare hostnames get
/// the version segment appended.
fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_config_fills_defaults() {
        let config = PlannerConfig::resolve(None, None, None, None);
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.api_endpoint, DEFAULT_LLM_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_LLM_TIMEOUT_MS));
    }

    #[test]
    fn planner_config_keeps_explicit_values() {
        let config = PlannerConfig::resolve(
            Some("sk-test".to_string()),
            Some("gpt-4o".to_string()),
            Some("https://llm.internal/v1".to_string()),
            Some(5_000),
        );
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.api_endpoint, "https://llm.internal/v1");
        assert_eq!(config.timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn bare_endpoints_gain_the_version_segment() {
        assert_eq!(
            normalize_endpoint("https://llm.internal".to_string()),
            "https://llm.internal/v1"
        );
        assert_eq!(
            normalize_endpoint("https://llm.internal/v1/".to_string()),
            "https://llm.internal/v1"
        );
        assert_eq!(
            normalize_endpoint("https://proxy.internal/v1/openai".to_string()),
            "https://proxy.internal/v1/openai"
        );
    }

    #[test]
    fn file_logging_flag_accepts_true_and_one() {
        assert!(is_truthy("true"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("yes"));
        assert!(!is_truthy("0"));
    }
}
