use crate::error_code::CacheErrorCode;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Resource key the failing operation was working on (e.g., "agents")
    pub resource: Option<String>,
    /// Additional context about the error (e.g., HTTP status, elapsed time)
    pub details: Option<String>,
    /// Source of the error (e.g., "loader", "memory_backend", "lease")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            resource: None,
            details: None,
            source: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the field cache.
///
/// `Clone` because a single in-flight refresh hands the same outcome to every
/// waiting caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid resource config: {message}{}", format_context(.context))]
    InvalidConfig {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream fetch failed: {message}{}", format_context(.context))]
    UpstreamFetch {
        message: String,
        context: ErrorContext,
    },

    #[error("Cache backend error: {message}{}", format_context(.context))]
    CacheBackend {
        message: String,
        context: ErrorContext,
    },

    #[error("Timed out waiting for concurrent refresh: {message}{}", format_context(.context))]
    ConcurrentRefreshTimeout {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref resource) = ctx.resource {
        parts.push(format!("resource: {}", resource));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::InvalidConfig {
            message: msg.into(),
            context,
        }
    }

    pub fn upstream(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::UpstreamFetch {
            message: msg.into(),
            context,
        }
    }

    pub fn backend(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::CacheBackend {
            message: msg.into(),
            context,
        }
    }

    pub fn refresh_timeout(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::ConcurrentRefreshTimeout {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// The stable code for this error.
    pub fn code(&self) -> CacheErrorCode {
        match self {
            Error::InvalidConfig { .. } => CacheErrorCode::InvalidConfig,
            Error::UpstreamFetch { .. } => CacheErrorCode::UpstreamFetch,
            Error::CacheBackend { .. } => CacheErrorCode::CacheBackend,
            Error::ConcurrentRefreshTimeout { .. } => CacheErrorCode::ConcurrentRefreshTimeout,
            Error::Configuration { .. } => CacheErrorCode::Configuration,
            Error::Serialization(_) => CacheErrorCode::Serialization,
        }
    }

    /// True when the cache itself is broken, as opposed to the source of truth.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Error::CacheBackend { .. } | Error::ConcurrentRefreshTimeout { .. }
        )
    }

    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, Error::UpstreamFetch { .. })
    }

    /// Human-readable message without the context suffix.
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidConfig { message, .. }
            | Error::UpstreamFetch { message, .. }
            | Error::CacheBackend { message, .. }
            | Error::ConcurrentRefreshTimeout { message, .. }
            | Error::Configuration { message, .. } => message,
            Error::Serialization(message) => message,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::InvalidConfig { context, .. }
            | Error::UpstreamFetch { context, .. }
            | Error::CacheBackend { context, .. }
            | Error::ConcurrentRefreshTimeout { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            Error::Serialization(_) => None,
        }
    }
}
