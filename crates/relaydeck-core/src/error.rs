// ── Core error types ──
//
// User-facing errors from relaydeck-core. Consumers never see reqwest or
// tungstenite errors directly; the `From<relaydeck_api::Error>` impl maps
// transport failures into domain variants, and `kind()` tells callers
// whether a retry can help.

use thiserror::Error;

/// Coarse classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    /// Network or device hiccup. The next poll may succeed.
    Transient,
    /// The device answered with something unusable.
    Protocol,
    /// Caller asked for something that cannot exist (unknown device, bad config).
    Invariant,
}

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach device: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Device did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Push channel closed: {reason}")]
    Disconnected { reason: String },

    #[error("Circuit open for {device}, next attempt in {retry_in_secs}s")]
    CircuitOpen { device: String, retry_in_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unexpected device response: {message}")]
    Protocol { message: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    #[error("Operation rejected by device: {message}")]
    Rejected { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. }
            | Self::Timeout { .. }
            | Self::Disconnected { .. }
            | Self::CircuitOpen { .. } => ErrorKind::Transient,
            Self::Protocol { .. } | Self::Rejected { .. } => ErrorKind::Protocol,
            Self::DeviceNotFound { .. }
            | Self::Unsupported { .. }
            | Self::Config { .. }
            | Self::Internal(_) => ErrorKind::Invariant,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<relaydeck_api::Error> for CoreError {
    fn from(err: relaydeck_api::Error) -> Self {
        use relaydeck_api::Error as Api;

        match err {
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_decode() {
                    CoreError::Protocol {
                        message: e.to_string(),
                    }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device address: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Http { status, message } if status >= 500 => CoreError::ConnectionFailed {
                reason: format!("HTTP {status}: {message}"),
            },
            Api::Http { status, message } => CoreError::Rejected {
                message: format!("HTTP {status}: {message}"),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::Disconnected {
                reason: format!("code {code}: {reason}"),
            },
            Api::Deserialization { message, body: _ } => CoreError::Protocol { message },
            Api::Unsupported(op) => CoreError::Unsupported {
                operation: op.to_owned(),
                required: "a newer device generation".into(),
            },
        }
    }
}
