use thiserror::Error;

/// Failure to turn one raw frame into a market event.
///
/// Parse errors are local to the message: the stream keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("malformed field {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    /// Frame is not a data frame (ack, heartbeat, snapshot). Skipped silently.
    #[error("unexpected payload shape")]
    UnexpectedShape,
}

impl ParseError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

/// Transport-level failure. Opaque to the indicator core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("send failed: {0}")]
    Send(String),
}
