//! Configuration-level error types

use thiserror::Error;

/// Errors raised while loading and validating host configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid URL for {field}: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

impl Error {
    /// Wrap a URL parse failure with the name of the offending config field.
    pub fn url(field: &'static str, source: url::ParseError) -> Self {
        Self::Url { field, source }
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
