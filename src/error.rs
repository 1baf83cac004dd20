use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown or unsupported city: {0}")]
    UnknownCity(String),

    #[error("Adapter '{adapter}' failed: {message}")]
    Adapter { adapter: String, message: String },

    #[error("Commit failed for {city}: {message}")]
    Commit { city: String, message: String },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Database {
            message: err.to_string(),
        }
    }
}

impl IngestError {
    pub fn adapter(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::Adapter {
            adapter: adapter.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
