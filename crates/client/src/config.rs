use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Build environment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Development => "http://localhost:3000/api",
            Self::Staging => "https://staging-api.solarcare.app/api",
            Self::Production => "https://api.solarcare.app/api",
        }
    }

    /// Development tolerates slower local backends.
    pub fn default_timeout(self) -> Duration {
        match self {
            Self::Development => Duration::from_secs(10),
            Self::Staging | Self::Production => Duration::from_secs(8),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Timing of the session teardown latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutLatchConfig {
    /// Delay before the logout is dispatched, batching near-simultaneous
    /// auth failures.
    pub coalesce: Duration,
    /// Window after the dispatch during which further auth failures are
    /// treated as part of the same episode.
    pub cooldown: Duration,
}

impl Default for LogoutLatchConfig {
    fn default() -> Self {
        Self {
            coalesce: Duration::from_millis(100),
            cooldown: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Sent as `X-App-Version`.
    pub app_version: String,
    /// Sent as `X-Platform`.
    pub platform: String,
    pub retry: RetryPolicy,
    pub logout: LogoutLatchConfig,
    /// How long a cached query result is served without refetching.
    pub query_freshness: Duration,
    /// Route requests to the in-process demo backend.
    pub use_demo_api: bool,
}

impl ClientConfig {
    /// Defaults for `environment` with no overrides.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            base_url: environment.default_base_url().to_string(),
            timeout: environment.default_timeout(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: "android".to_string(),
            retry: RetryPolicy::default(),
            logout: LogoutLatchConfig::default(),
            query_freshness: Duration::from_secs(60),
            use_demo_api: true,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                          |
    /// |--------------------|----------------------------------|
    /// | `APP_ENV`          | `development`                    |
    /// | `API_BASE_URL`     | per environment                  |
    /// | `API_TIMEOUT_SECS` | `10` (development), `8` otherwise |
    /// | `API_MAX_RETRIES`  | `3`                              |
    /// | `APP_VERSION`      | crate version                    |
    /// | `APP_PLATFORM`     | `android`                        |
    /// | `USE_DEMO_API`     | `true` when `API_BASE_URL` unset |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment: Environment = match lookup("APP_ENV") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                var: "APP_ENV",
                value,
                reason,
            })?,
            None => Environment::default(),
        };

        let mut config = Self::for_environment(environment);

        let base_url = lookup("API_BASE_URL").filter(|v| !v.trim().is_empty());
        config.use_demo_api = match lookup("USE_DEMO_API") {
            Some(value) => parse_bool("USE_DEMO_API", value)?,
            None => base_url.is_none(),
        };
        if let Some(url) = base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(value) = lookup("API_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_num("API_TIMEOUT_SECS", value)?);
        }
        if let Some(value) = lookup("API_MAX_RETRIES") {
            config.retry.max_retries = parse_num("API_MAX_RETRIES", value)?;
        }
        if let Some(version) = lookup("APP_VERSION") {
            config.app_version = version;
        }
        if let Some(platform) = lookup("APP_PLATFORM") {
            config.platform = platform;
        }

        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

fn parse_num<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected true or false".into(),
        }),
    }
}
