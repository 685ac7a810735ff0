//! Session error types.
//!
//! Every failure a session can hit falls into one of four kinds. All of them
//! are fatal for the session: nothing is retried, and the process exits
//! non-zero after teardown.

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad user input. Reported before any resource is acquired.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Filesystem or workspace failure.
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    /// An external program (encoder, tor) failed or misbehaved.
    #[error("{tool} failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    /// A bounded wait ran out.
    #[error("Timed out after {}s waiting for {what}", after.as_secs_f64())]
    Timeout { what: String, after: Duration },
}

impl SessionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    pub fn tool(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid-argument",
            Self::Resource { .. } => "resource",
            Self::ExternalTool { .. } => "external-tool",
            Self::Timeout { .. } => "timeout",
        }
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// A teardown step that failed to release its resource.
#[derive(Debug, Clone, Error)]
#[error("Failed to release {resource}: {message}")]
pub struct ReleaseError {
    pub resource: &'static str,
    pub message: String,
}

impl ReleaseError {
    pub fn new(resource: &'static str, message: impl ToString) -> Self {
        Self {
            resource,
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
