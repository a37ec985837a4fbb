use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewindError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document error: {0}")]
    Dom(#[from] crate::dom::DomError),

    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}
