// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Separates fatal session/API failures from filesystem and parse errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("DevTools protocol error: {0}")]
    Browser(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited on {endpoint}: still 429 after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::Browser(e.to_string())
    }
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Session(_) => 2,
            Error::Auth(_) => 3,
            Error::Browser(_) => 4,
            Error::Network(_) => 5,
            Error::Api { .. } => 6,
            Error::RateLimited { .. } => 7,
            Error::Parse(_) => 8,
            Error::Filesystem(_) => 9,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
