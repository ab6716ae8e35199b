use thiserror::Error;

/// Request rejected before anything is submitted to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("language required")]
    MissingLanguage,

    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    #[error("language {0} has no trace step configured")]
    TraceUnsupported(String),
}
