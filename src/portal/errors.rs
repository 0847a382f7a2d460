//! Error types for the booking-portal client.

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// Credentials or other settings are missing or invalid. Raised before any request is sent.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An HTML structure the login flow depends on was not found.
    #[error("expected page structure not found: {0}")]
    Extraction(String),
    /// Connection failure, timeout or non-2xx status.
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// A response body (or a field inside it) did not have the expected shape.
    #[error("malformed {context}")]
    Format {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PortalError {
    pub(crate) fn transport(url: impl Into<String>) -> impl FnOnce(reqwest::Error) -> Self {
        let url = url.into();
        move |source| PortalError::Transport { url, source }
    }

    pub(crate) fn format(context: impl Into<String>, source: anyhow::Error) -> Self {
        PortalError::Format {
            context: context.into(),
            source,
        }
    }
}
