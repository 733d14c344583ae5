use thiserror::Error;

#[derive(Debug, Error)]
pub enum CortexError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CortexError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            CortexError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CortexError>;
