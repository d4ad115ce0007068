use thiserror::Error;

/// Top-level error type for the `relaydeck-api` crate.
///
/// Covers every failure mode of the device transports: HTTP polling,
/// the push WebSocket, and payload decoding. `relaydeck-core` maps these
/// into domain errors and never shows raw transport detail to the UI.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Device answered with a non-success HTTP status.
    #[error("Device returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Platform ────────────────────────────────────────────────────
    /// Operation not supported by this device generation.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the device answered but the payload was unusable.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
            || matches!(self, Self::Http { status, .. } if *status < 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient() {
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
    }

    #[test]
    fn bad_payloads_are_protocol_errors() {
        let err = Error::Deserialization {
            message: "expected object".into(),
            body: "[]".into(),
        };
        assert!(err.is_protocol());
        assert!(!err.is_transient());

        let err = Error::Http {
            status: 404,
            message: "not found".into(),
        };
        assert!(err.is_protocol());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            message: "busy".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_protocol());
    }
}
