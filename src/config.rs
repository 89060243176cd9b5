use std::env;
use std::path::PathBuf;

use tracing::Level;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_SOURCE: &str = "./resources/definitions.xml";

/// Deployment environment, read from `CTMVIEW_ENVIRONMENT`. Unrecognized
/// names fall back to development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "development" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "staging" => Some(Environment::Staging),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Environment::Development => "DEVELOPMENT",
            Environment::Test => "TEST",
            Environment::Staging => "STAGING",
            Environment::Production => "PRODUCTION",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn default_log_level(&self) -> Level {
        match self {
            Environment::Development => Level::DEBUG,
            _ => Level::INFO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub source_path: PathBuf,
    pub environment: Environment,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = env::var("CTMVIEW_ENVIRONMENT")
            .ok()
            .and_then(|name| Environment::from_name(&name))
            .unwrap_or(Environment::Development);
        let host = env::var("CTMVIEW_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("CTMVIEW_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let source_path = env::var("CTMVIEW_SOURCE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOURCE));
        Self {
            host,
            port,
            source_path,
            environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_names_parse_case_insensitively() {
        assert_eq!(
            Environment::from_name("DEVELOPMENT"),
            Some(Environment::Development)
        );
        assert_eq!(
            Environment::from_name("production"),
            Some(Environment::Production)
        );
        assert_eq!(Environment::from_name("Staging"), Some(Environment::Staging));
        assert_eq!(Environment::from_name("qa"), None);
    }

    #[test]
    fn only_production_is_production() {
        assert!(Environment::Production.is_production());
        assert!(!Environment::Development.is_production());
        assert!(!Environment::Test.is_production());
        assert!(!Environment::Staging.is_production());
    }

    #[test]
    fn development_defaults_to_debug_logging() {
        assert_eq!(Environment::Development.default_log_level(), Level::DEBUG);
        assert_eq!(Environment::Production.default_log_level(), Level::INFO);
    }
}
