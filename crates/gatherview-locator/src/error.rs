//! Error types for gatherview-locator.

/// Result type alias using [`LocatorError`].
pub type LocatorResult<T> = Result<T, LocatorError>;

/// Errors raised while locating archives in a listing tree.
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    /// None of the listing heuristics matched.
    #[error("not found at {url}: {reason}")]
    NotFound {
        /// Page that was being inspected.
        url: String,
        /// What was missing.
        reason: String,
    },

    /// A URL or link reference could not be parsed.
    #[error("invalid URL {input:?}: {source}")]
    Parse {
        /// The offending input.
        input: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// A listing page could not be retrieved.
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// Page that was requested.
        url: String,
        /// Network or status failure.
        reason: String,
    },

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LocatorError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a fetch error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error means the heuristics found nothing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
