pub mod api;
pub mod controller;
pub mod domain;
pub mod session;

pub mod config {
    use anyhow::{Context, Result};
    use reqwest::Url;
    use std::time::Duration;

    use crate::domain::recommendation::Timeframe;

    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub base_url: String,
        pub request_timeout: Duration,
        pub username: Option<String>,
        pub password: Option<String>,
        pub default_symbol: String,
        pub default_interval: Timeframe,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> Result<Self> {
            let base_url = std::env::var("INVESTAI_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

            let timeout_secs = std::env::var("INVESTAI_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS);

            let default_symbol = std::env::var("INVESTAI_DEFAULT_SYMBOL")
                .ok()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SYMBOL.to_string());

            let default_interval = match std::env::var("INVESTAI_DEFAULT_INTERVAL") {
                Ok(code) => code
                    .parse::<Timeframe>()
                    .context("INVESTAI_DEFAULT_INTERVAL is invalid")?,
                Err(_) => Timeframe::default(),
            };

            let settings = Self {
                base_url,
                request_timeout: Duration::from_secs(timeout_secs),
                username: std::env::var("INVESTAI_USERNAME").ok(),
                password: std::env::var("INVESTAI_PASSWORD").ok(),
                default_symbol,
                default_interval,
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            };
            settings.validate()?;
            Ok(settings)
        }

        /// Checks that the base endpoint is an absolute http(s) URL with a host.
        pub fn validate(&self) -> Result<()> {
            let url = Url::parse(&self.base_url)
                .with_context(|| format!("INVESTAI_BASE_URL is not a valid URL: {}", self.base_url))?;
            anyhow::ensure!(
                matches!(url.scheme(), "http" | "https"),
                "INVESTAI_BASE_URL must use http or https (got {})",
                url.scheme()
            );
            anyhow::ensure!(
                url.host_str().is_some(),
                "INVESTAI_BASE_URL must include a host"
            );
            Ok(())
        }

        pub fn require_username(&self) -> Result<&str> {
            self.username
                .as_deref()
                .filter(|s| !s.is_empty())
                .context("INVESTAI_USERNAME is required (or pass --username)")
        }

        pub fn require_password(&self) -> Result<&str> {
            self.password
                .as_deref()
                .filter(|s| !s.is_empty())
                .context("INVESTAI_PASSWORD is required (or pass --password)")
        }
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                base_url: DEFAULT_BASE_URL.to_string(),
                request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                username: None,
                password: None,
                default_symbol: DEFAULT_SYMBOL.to_string(),
                default_interval: Timeframe::default(),
                sentry_dsn: None,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn default_settings_are_valid() {
            let settings = Settings::default();
            assert!(settings.validate().is_ok());
            assert_eq!(settings.default_interval, Timeframe::OneHour);
        }

        #[test]
        fn rejects_non_http_base_url() {
            let settings = Settings {
                base_url: "ftp://localhost:8000".to_string(),
                ..Settings::default()
            };
            assert!(settings.validate().is_err());

            let settings = Settings {
                base_url: "localhost:8000".to_string(),
                ..Settings::default()
            };
            assert!(settings.validate().is_err());
        }

        #[test]
        fn require_accessors_name_the_variable() {
            let settings = Settings::default();
            let err = settings.require_username().unwrap_err();
            assert!(err.to_string().contains("INVESTAI_USERNAME"));

            let settings = Settings {
                password: Some(String::new()),
                ..Settings::default()
            };
            assert!(settings.require_password().is_err());
        }
    }
}
