use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error while loading configuration: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config.toml: {0}")]
    TomlDeserialization(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
