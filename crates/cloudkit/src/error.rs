//! Error types for provider API calls.
//!
//! Errors are categorized to enable retry logic, idempotent deletes and
//! appropriate user feedback. Provider error codes from the different clouds
//! are folded into one small set of categories.

use thiserror::Error;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The resource does not exist
    NotFound,
    /// Request rate exceeded (transient, retryable)
    Throttled,
    /// Connectivity or server-side failure (transient, retryable)
    Network,
    /// The resource already exists or is in use
    Conflict,
    /// Credentials lack the required permission
    Permission,
    /// The request itself was rejected as invalid
    Invalid,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Network)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::Throttled => "Request rate exceeded",
            Self::Network => "Provider unreachable",
            Self::Conflict => "Resource conflict",
            Self::Permission => "Permission denied",
            Self::Invalid => "Invalid request",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the resource name and region",
            Self::Throttled => "Lower --jobs or try again later",
            Self::Network => "Check your connection to the provider endpoint",
            Self::Conflict => "Another resource with this name exists or still depends on it",
            Self::Permission => "Grant the missing permission to the credentials in use",
            Self::Invalid => "Fix the offending field in the cluster configuration",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors returned by provider clients.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested resource does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Resource kind (e.g. "role", "instance template")
        kind: String,
        /// Resource name or id
        name: String,
    },

    /// Request rate exceeded
    #[error("throttled: {message}")]
    Throttled {
        /// Provider message
        message: String,
    },

    /// Connectivity or 5xx error
    #[error("network error: {message}")]
    Network {
        /// Provider message
        message: String,
    },

    /// Resource already exists or is still in use
    #[error("conflict: {message}")]
    Conflict {
        /// Provider message
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Provider message
        message: String,
    },

    /// Request rejected as invalid
    #[error("invalid request: {message}")]
    Invalid {
        /// Provider message
        message: String,
    },

    /// Unclassified provider error
    #[error("provider error {code}: {message}")]
    Api {
        /// Provider error code
        code: String,
        /// Provider message
        message: String,
    },

    /// The caller gave up before the call completed
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Throttled { .. } => ErrorCategory::Throttled,
            Error::Network { .. } => ErrorCategory::Network,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::Invalid { .. } => ErrorCategory::Invalid,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the call was abandoned because the caller cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the provider answered "no such resource".
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Create an error from a provider error code.
    ///
    /// Understands the codes used by AWS (`NoSuchEntity`, `Throttling`),
    /// GCE (`notFound`, `rateLimitExceeded`) and OpenStack (HTTP status
    /// codes) so callers can classify any of them the same way.
    pub fn from_api(code: &str, message: &str, resource: Option<&str>) -> Self {
        let code_lower = code.to_lowercase();
        let message = message.trim().to_string();

        // Not found
        if code_lower.contains("nosuchentity")
            || code_lower.contains("notfound")
            || code_lower == "404"
        {
            return Error::NotFound {
                kind: "resource".into(),
                name: resource.unwrap_or("unknown").to_string(),
            };
        }

        // Throttling
        if code_lower.contains("throttl")
            || code_lower.contains("ratelimit")
            || code_lower.contains("requestlimitexceeded")
            || code_lower == "429"
        {
            return Error::Throttled { message };
        }

        // Transient server or transport failures
        if code_lower.contains("serviceunavailable")
            || code_lower.contains("internalerror")
            || code_lower.contains("internalfailure")
            || code_lower.contains("timeout")
            || matches!(code_lower.as_str(), "500" | "502" | "503" | "504")
        {
            return Error::Network { message };
        }

        // Conflicts
        if code_lower.contains("alreadyexists")
            || code_lower.contains("deleteconflict")
            || code_lower.contains("resourceinuse")
            || code_lower == "409"
        {
            return Error::Conflict { message };
        }

        // Permission errors
        if code_lower.contains("accessdenied")
            || code_lower.contains("unauthorized")
            || code_lower.contains("forbidden")
            || matches!(code_lower.as_str(), "401" | "403")
        {
            return Error::Permission { message };
        }

        // Validation errors
        if code_lower.contains("validation")
            || code_lower.contains("invalid")
            || code_lower.contains("malformed")
            || code_lower == "400"
        {
            return Error::Invalid { message };
        }

        Error::Api {
            code: code.to_string(),
            message,
        }
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;
