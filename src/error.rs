use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed start line: {0:?}")]
    MalformedStartLine(String),

    #[error("message head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("connection idle for longer than the read timeout")]
    IdleTimeout,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("redirect to another origin is not supported: {0}")]
    UnsupportedRedirectTarget(String),

    #[error("user registry unavailable: {0}")]
    Registry(String),

    #[error("payload encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
