use crate::close::{CloseCode, ClosePayloadError};
use crate::frame::FrameError;
use crate::http_upgrade::HandshakeError;
use crate::tls::TlsError;
use crate::url::UrlError;

/// Errors surfaced by [`WebSocket`](crate::WebSocket) calls, completions and
/// the event sink.
#[derive(thiserror::Error, Debug)]
pub enum WsError {
    #[error("close code {0} may not be sent")]
    InvalidCloseCode(u16),
    #[error("close reason of {0} bytes exceeds 123")]
    CloseReasonTooLong(usize),
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[from] HandshakeError),
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),
    #[error("invalid close frame: {0}")]
    InvalidClose(#[from] ClosePayloadError),
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },
    #[error("peer did not answer the close frame in time")]
    CloseTimeout,
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error("connection is not open")]
    NotOpen,
    #[error("connection went away before the operation completed")]
    Disconnected,
    #[error("no monoio runtime is running on this thread")]
    NoRuntime,
}

impl WsError {
    /// Close code owed to the peer when this error ends the connection, or
    /// `None` when no close frame should be sent.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            WsError::InvalidFrame(FrameError::TooLarge { .. }) | WsError::MessageTooLarge { .. } => {
                Some(CloseCode::MESSAGE_TOO_BIG)
            }
            WsError::InvalidFrame(_) => Some(CloseCode::PROTOCOL_ERROR),
            WsError::InvalidClose(ClosePayloadError::InvalidUtf8) | WsError::InvalidUtf8 => {
                Some(CloseCode::INVALID_PAYLOAD)
            }
            WsError::InvalidClose(_) => Some(CloseCode::PROTOCOL_ERROR),
            _ => None,
        }
    }
}
