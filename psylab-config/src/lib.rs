//! Configuration loading for psylab.
//!
//! Variables come from an optional `.env` file and the process environment
//! (see [`EnvLoader`]) and are turned into a typed [`AppConfig`].
//!
//! ```
//! use psylab_config::AppConfig;
//! use std::collections::HashMap;
//!
//! let mut vars = HashMap::new();
//! vars.insert("COMPRESSION_THRESHOLD".to_string(), "1kb".to_string());
//!
//! let config = AppConfig::from_vars(&vars).unwrap();
//! assert_eq!(config.compression.threshold, 1024);
//! ```

pub mod env;
pub mod error;
pub mod settings;
pub mod size;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use settings::{
    AppConfig, AuthSettings, CompressionSettings, CorsSettings, Environment, LogSettings,
    RateLimitSettings, ServerSettings, SessionSettings,
};
pub use size::parse_size;
pub use validation::{ConfigValidator, Validate};
