//! Error handling for CowCatcher

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config error (unreadable or malformed config.json)
    #[error("Config error: {0}")]
    Config(String),

    /// Frame capture error
    #[error("Capture error: {0}")]
    Capture(String),

    /// Detector error (inference or rendering)
    #[error("Detector error: {0}")]
    Detector(String),

    /// Message transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short stage tag used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Capture(_) => "capture",
            Error::Detector(_) => "detector",
            Error::Transport(_) => "transport",
            Error::Serialization(_) => "serialization",
            Error::Http(_) => "http",
            Error::Io(_) => "io",
            Error::Image(_) => "image",
            Error::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_display_prefix() {
        let err = Error::Transport("chat 42 rejected".to_string());
        assert_eq!(err.to_string(), "Transport error: chat 42 rejected");
    }
}
