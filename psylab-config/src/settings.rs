//! Typed application settings.
//!
//! Every field has a default; an environment variable that is present but
//! malformed is an error rather than a silent fallback.

use crate::size::parse_size;
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, EnvLoader, Result};
use psylab_core::logging::{LogFormat, LogLevel};
use std::collections::HashMap;
use std::str::FromStr;

/// Deployment environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
    Other(String),
}

impl Environment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            other => Environment::Other(other.to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub environment: Environment,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub origin: String,
    pub max_age_secs: u64,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
    pub credentials: bool,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_validity_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub secret: String,
    pub cookie_name: String,
    pub max_age_ms: u64,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct CompressionSettings {
    pub threshold: u64,
    pub br: bool,
    pub gzip: bool,
    pub deflate: bool,
    pub br_quality: u32,
    pub gzip_level: u32,
    pub deflate_level: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub attempts_per_day: u64,
    pub consecutive_attempts: u64,
    pub burst_block_ms: u64,
    pub redis_url: Option<String>,
    pub trust_proxy: bool,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Explicit level; `None` means derive it from the environment.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    pub dir: Option<String>,
}

/// All settings for one server process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub cors: CorsSettings,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub compression: CompressionSettings,
    pub rate_limit: RateLimitSettings,
    pub log: LogSettings,
}

impl AppConfig {
    /// Load `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_prefix(None)
    }

    /// Like [`from_env`](Self::from_env), reading `PREFIX_`-scoped variables.
    pub fn from_env_with_prefix(prefix: Option<String>) -> Result<Self> {
        let loader = EnvLoader::new(prefix);
        loader.load_dotenv(None)?;
        let vars = loader.load()?;
        Self::from_vars(&vars)
    }

    /// Build from an explicit variable map. Keys are matched case-insensitively.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let vars = Vars::new(vars);

        let environment = Environment::parse(
            &vars
                .get("node_env")
                .or_else(|| vars.get("app_env"))
                .unwrap_or_else(|| "development".to_string()),
        );
        let production = environment.is_production();
        let jwt_secret = vars.string_or("jwt_secret", "Shhh");

        let config = Self {
            server: ServerSettings {
                environment,
                port: vars.parse_or("port", 5000)?,
                body_limit: match vars.get("body_limit") {
                    Some(raw) => parse_size("BODY_LIMIT", &raw)?,
                    None => 100 * 1024,
                },
            },
            cors: CorsSettings {
                origin: vars.string_or("cors_url", "*"),
                max_age_secs: vars.parse_or("cors_maxage", 31_536_000)?,
                methods: vars.list_or(
                    "cors_methods",
                    &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"],
                ),
                headers: vars.list_or(
                    "cors_headers",
                    &["Content-Type", "Authorization", "Origin", "Accept"],
                ),
                credentials: vars.bool_or("cors_credentials", true)?,
            },
            session: SessionSettings {
                secret: vars.string_or("session_secret", &jwt_secret),
                cookie_name: vars.string_or("session_cookie_name", "user.sess"),
                max_age_ms: vars.parse_or("session_max_age_ms", 86_400_000)?,
                secure: vars.bool_or("session_secure", production)?,
            },
            auth: AuthSettings {
                jwt_secret,
                token_validity_secs: vars.parse_or("jwt_validity_sec", 86_400)?,
            },
            compression: CompressionSettings {
                threshold: match vars.get("compression_threshold") {
                    Some(raw) => parse_size("COMPRESSION_THRESHOLD", &raw)?,
                    None => 1024,
                },
                br: vars.bool_or("compression_br", true)?,
                gzip: vars.bool_or("compression_gzip", true)?,
                deflate: vars.bool_or("compression_deflate", true)?,
                br_quality: vars.parse_or("compression_br_quality", 4)?,
                gzip_level: vars.parse_or("compression_gzip_level", 6)?,
                deflate_level: vars.parse_or("compression_deflate_level", 6)?,
            },
            rate_limit: RateLimitSettings {
                attempts_per_day: vars.parse_or("limit_attempts_per_day", 100)?,
                consecutive_attempts: vars.parse_or("limit_consecutive_attempts", 10)?,
                burst_block_ms: vars.parse_or("rate_limit_block_ms", 1000)?,
                redis_url: vars.get("redis_url").filter(|url| !url.is_empty()),
                trust_proxy: vars.bool_or("trust_proxy", false)?,
            },
            log: LogSettings {
                level: vars.get("log_level").map(|raw| parse_with("LOG_LEVEL", &raw)).transpose()?,
                format: match vars.get("log_format") {
                    Some(raw) => parse_with("LOG_FORMAT", &raw)?,
                    None => LogFormat::Json,
                },
                dir: vars.get("log_dir").filter(|dir| !dir.is_empty()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Log level, defaulting to `debug` in development and `warn` elsewhere.
    pub fn log_level(&self) -> LogLevel {
        self.log.level.unwrap_or(match self.server.environment {
            Environment::Development => LogLevel::Debug,
            _ => LogLevel::Warn,
        })
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.auth.jwt_secret, "JWT_SECRET")?;
        ConfigValidator::positive(self.server.body_limit, "BODY_LIMIT")?;
        ConfigValidator::not_empty(&self.session.secret, "SESSION_SECRET")?;
        ConfigValidator::not_empty(&self.session.cookie_name, "SESSION_COOKIE_NAME")?;
        ConfigValidator::in_range(self.compression.br_quality, 0, 11, "COMPRESSION_BR_QUALITY")?;
        ConfigValidator::in_range(self.compression.gzip_level, 0, 9, "COMPRESSION_GZIP_LEVEL")?;
        ConfigValidator::in_range(
            self.compression.deflate_level,
            0,
            9,
            "COMPRESSION_DEFLATE_LEVEL",
        )?;
        ConfigValidator::positive(self.rate_limit.attempts_per_day, "LIMIT_ATTEMPTS_PER_DAY")?;
        ConfigValidator::positive(
            self.rate_limit.consecutive_attempts,
            "LIMIT_CONSECUTIVE_ATTEMPTS",
        )?;
        if let Some(url) = &self.rate_limit.redis_url {
            ConfigValidator::is_url(url, &["redis", "rediss", "redis+unix"], "REDIS_URL")?;
        }
        Ok(())
    }
}

fn parse_with<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Case-insensitive view over a variable map.
struct Vars {
    inner: HashMap<String, String>,
}

impl Vars {
    fn new(vars: &HashMap<String, String>) -> Self {
        Self {
            inner: vars
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn list_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key).filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            None => default.iter().map(|item| item.to_string()).collect(),
        }
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => parse_with(&key.to_uppercase(), &raw),
            None => Ok(default),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseError {
                key: key.to_uppercase(),
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}
