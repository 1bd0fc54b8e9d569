use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use monoio::net::TcpStream;
use monoio_compat::{AsyncRead, AsyncWrite, StreamWrapper};
use tokio::io::ReadBuf;

use crate::error::WsError;
use crate::tls::{default_connector, handshake};
use crate::url::{Endpoint, Scheme};

/// Anything the connection can run over: a duplex byte stream with
/// `read`/`write`/`flush`.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + 'static> Transport for T {}

/// A unified IO stream that can be plain TCP or TLS over TCP, both wrapped
/// in `monoio_compat::StreamWrapper` to provide AsyncRead/AsyncWrite.
#[allow(clippy::large_enum_variant)]
pub enum AnyStream {
    Plain(StreamWrapper<TcpStream>),
    Tls(StreamWrapper<monoio_rustls::ClientTlsStream<TcpStream>>),
}

impl AsyncRead for AnyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AnyStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            AnyStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AnyStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            AnyStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            AnyStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AnyStream::Plain(s) => Pin::new(s).poll_flush(cx),
            AnyStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AnyStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            AnyStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Establish the underlying transport (TCP or TLS over TCP) for `endpoint`.
pub async fn connect(endpoint: &Endpoint) -> Result<AnyStream, WsError> {
    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    let stream = match endpoint.scheme {
        Scheme::Ws => AnyStream::Plain(StreamWrapper::new(tcp)),
        Scheme::Wss => {
            let tls = handshake(tcp, &endpoint.host, default_connector()).await?;
            AnyStream::Tls(StreamWrapper::new(tls))
        }
    };
    tracing::debug!(host = %endpoint.host, port = endpoint.port, "transport connected");
    Ok(stream)
}
