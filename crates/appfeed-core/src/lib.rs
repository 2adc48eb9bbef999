pub mod app_config;
pub mod config;
pub mod products;

pub use app_config::{AppConfig, FeedConfig, ImportConfig, Limit, StorageConfig};
pub use config::{load_app_config, load_app_config_from_env};
pub use products::{
    CategoryRef, Currency, ImageSpec, ImageTarget, LocalizedDescription, NormalizedProduct,
    NormalizedProductBuilder, Platform, Price, Territory,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown currency type: {0}")]
    UnknownCurrency(String),

    #[error("product is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
