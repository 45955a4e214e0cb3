use crate::ExecutionContext;

/// Result alias that carries the custom [`RuntimeError`] type.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Common error type for the core crate.
///
/// The runtime itself is total: misses and guards resolve to defaults. This
/// type only surfaces at the edges (config files, event logs) and inside
/// [`ExecutionReport`](crate::ExecutionReport) for actions that were refused.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// An action that needs the full-capability context was reached from a
    /// context that cannot run it.
    #[error("action `{action}` cannot run in the {context} context")]
    ContextViolation {
        action: &'static str,
        context: ExecutionContext,
    },
    #[error("unknown node `{0}`")]
    UnknownNode(String),
}

impl RuntimeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for RuntimeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for RuntimeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
