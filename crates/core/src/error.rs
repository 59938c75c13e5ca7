// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport failures keep the server-provided message as their display
    #[error(transparent)]
    Transport(#[from] crate::port::TransportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Message suitable for a user-facing notice
    pub fn user_message(&self) -> String {
        match self {
            AppError::Transport(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
