// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing input files, bad time phrases, invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    Subprocess {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("repository error: {0}")]
    Repository(#[from] git2::Error),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store lock poisoned by a panicked writer")]
    StoreLockPoisoned,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
