use std::fmt;

/// The closed set of failure modes the rest of the system branches on.
///
/// This is deliberately not `thiserror`-derived: call sites that just need to
/// propagate failures use `anyhow`, but anything that inspects *which* error
/// happened (the Job Manager deciding whether a `Submit` failure is a
/// `conflict` vs a `validation` error, for instance) matches on this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    RuntimeUnavailable,
    ImageNotFound,
    TransientRuntimeError,
    Timeout,
    Cancelled,
    CleanupFailed,
    PersistenceFailed,
    CorruptRecord,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RuntimeUnavailable => "runtime_unavailable",
            Self::ImageNotFound => "image_not_found",
            Self::TransientRuntimeError => "transient_runtime_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::CleanupFailed => "cleanup_failed",
            Self::PersistenceFailed => "persistence_failed",
            Self::CorruptRecord => "corrupt_record",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kinded error carrying an explanatory message and an optional cause.
#[derive(Debug)]
pub struct OrcaError {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl OrcaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }
}

impl fmt::Display for OrcaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for OrcaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let e = OrcaError::validation("bad job id");
        assert_eq!(e.to_string(), "validation: bad job id");
        assert_eq!(e.kind(), ErrorKind::Validation);
    }
}
