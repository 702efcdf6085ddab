//! Byte transports the engine can run over.
//!
//! The engine itself is generic over any `AsyncRead + AsyncWrite`
//! stream; this module supplies the two transports real sessions use,
//! plaintext TCP and TLS, behind one [`ImapStream`] type so callers can
//! hold either without generics.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::{Error, Result};

/// How a dialed connection is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Bare TCP, for STARTTLS upgrades or local testing.
    Plaintext,
    /// TLS from the first byte, the usual port 993 arrangement.
    Tls,
}

/// A connection that is either bare TCP or TLS.
pub enum ImapStream {
    /// Unencrypted TCP.
    Plain(TcpStream),
    /// TLS session, boxed to keep the enum small.
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Wraps an already-connected TCP stream.
    #[must_use]
    pub const fn plain(stream: TcpStream) -> Self {
        Self::Plain(stream)
    }

    /// Wraps an established TLS session.
    #[must_use]
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(Box::new(stream))
    }

    /// Whether the connection is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Performs the client side of a STARTTLS upgrade. The STARTTLS
    /// command itself must have completed on the plaintext stream
    /// before calling this.
    ///
    /// # Errors
    ///
    /// [`Error::State`] when the stream is already encrypted, plus any
    /// handshake failure.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector();
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector.connect(server_name, tcp).await?;
                debug!(%host, "upgraded to tls");
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::state("connection is already encrypted")),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// A TLS connector trusting the bundled webpki roots, for callers that
/// want to drive the handshake themselves.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Opens a connection to `host:port` with the requested protection.
///
/// # Errors
///
/// Connection and TLS handshake failures, and
/// [`Error::InvalidDnsName`] when `host` is not a valid server name.
pub async fn dial(host: &str, port: u16, security: Security) -> Result<ImapStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    debug!(%addr, ?security, "connected");
    match security {
        Security::Plaintext => Ok(ImapStream::Plain(tcp)),
        Security::Tls => {
            let connector = create_tls_connector();
            let server_name = ServerName::try_from(host.to_string())?;
            let tls = connector.connect(server_name, tcp).await?;
            Ok(ImapStream::Tls(Box::new(tls)))
        }
    }
}

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
    fn connector_builds_from_bundled_roots() {
        let _connector = create_tls_connector();
    }

    #[tokio::test]
    async fn plain_wrapper_reports_no_tls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, _server) = tokio::join!(
            TcpStream::connect(addr),
            async { listener.accept().await.map(|(s, _)| s) },
        );
        let stream = ImapStream::plain(client.unwrap());
        assert!(!stream.is_tls());
    }
}
