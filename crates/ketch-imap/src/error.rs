//! Error types for the IMAP engine.

use thiserror::Error;

/// Errors that can occur while driving an IMAP connection.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Protocol grammar violation; the offending input is rendered in the
    /// message for diagnostics.
    #[error("Protocol error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// The server rejected the connection greeting.
    #[error("Connection rejected by server greeting: {0}")]
    Greeting(String),

    /// The stream reported end-of-data while a command was in flight.
    #[error("Connection closed by server")]
    Closed,

    /// A literal payload could not be sized or streamed.
    #[error("Literal payload error: {0}")]
    Literal(String),

    /// The reconnect callback failed to restore the connection.
    #[error("Reconnect failed: {0}")]
    Reconnect(String),

    /// A continuation handler rejected the server's challenge.
    #[error("Continuation handler failed: {0}")]
    Continuation(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    State(String),
}

impl Error {
    /// Shorthand for a [`Error::Parse`] with a rendered message.
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::State`] with a rendered message.
    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// True if this error means the transport itself is unusable and the
    /// connection must be considered dropped.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_renders_message() {
        let err = Error::parse("expected ')' but got Atom(\"x\")");
        assert!(err.to_string().contains("expected ')'"));
    }

    #[test]
    fn io_errors_are_disconnects() {
        let err = Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(err.is_disconnect());
        assert!(Error::Closed.is_disconnect());
    }

    #[test]
    fn grammar_errors_are_not_disconnects() {
        assert!(!Error::parse("bad token").is_disconnect());
        assert!(!Error::Greeting("* BYE".to_string()).is_disconnect());
    }
}
