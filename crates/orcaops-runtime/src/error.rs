use std::fmt;

/// The adapter's failure surface (§4.1): "a distinguished not_found
/// condition, transient api_error, and terminal image_not_found. All other
/// errors collapse into api_error."
#[derive(Debug)]
pub enum RuntimeError {
    NotFound(String),
    ImageNotFound(String),
    ApiError(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::ImageNotFound(msg) => write!(f, "image not found: {msg}"),
            Self::ApiError(msg) => write!(f, "runtime api error: {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(e.to_string())
        } else {
            Self::ApiError(e.to_string())
        }
    }
}
