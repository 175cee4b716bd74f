//! Error types shared across loadcast crates.

/// Top-level error type for loadcast operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadcastError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Recording error: {message}")]
    Recording { message: String },

    #[error("Compositing error: {message}")]
    Compositing { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LoadcastError.
pub type LoadcastResult<T> = Result<T, LoadcastError>;

impl LoadcastError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser {
            message: msg.into(),
        }
    }

    pub fn recording(msg: impl Into<String>) -> Self {
        Self::Recording {
            message: msg.into(),
        }
    }

    pub fn compositing(msg: impl Into<String>) -> Self {
        Self::Compositing {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }
}
