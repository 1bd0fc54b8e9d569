use std::sync::Arc;

use bytes::Bytes;

use crate::error::WsError;

/// Receives connection events.
///
/// Callbacks run on the connection's I/O task, one at a time and in the order
/// the underlying frames arrived. Each connection produces at most one
/// terminal callback: `on_close` or `on_error`.
///
/// Calling back into the [`WebSocket`](crate::WebSocket) from a callback is
/// allowed; no internal lock is held while the sink runs.
pub trait EventSink: Send + Sync + 'static {
    /// Handshake completed. `protocol` is the subprotocol the server selected.
    fn on_open(&self, protocol: Option<&str>) {
        let _ = protocol;
    }

    /// Close handshake finished. `code` is 1005 when the peer sent no code.
    fn on_close(&self, code: u16, reason: &str) {
        let _ = (code, reason);
    }

    /// The connection failed and is now closed.
    fn on_error(&self, error: WsError) {
        let _ = error;
    }

    fn on_text(&self, text: String) {
        let _ = text;
    }

    fn on_binary(&self, data: Bytes) {
        let _ = data;
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn on_open(&self, protocol: Option<&str>) {
        (**self).on_open(protocol)
    }

    fn on_close(&self, code: u16, reason: &str) {
        (**self).on_close(code, reason)
    }

    fn on_error(&self, error: WsError) {
        (**self).on_error(error)
    }

    fn on_text(&self, text: String) {
        (**self).on_text(text)
    }

    fn on_binary(&self, data: Bytes) {
        (**self).on_binary(data)
    }
}

/// Sink that logs every event through `tracing` and otherwise discards it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_open(&self, protocol: Option<&str>) {
        tracing::info!(?protocol, "websocket opened");
    }

    fn on_close(&self, code: u16, reason: &str) {
        tracing::info!(code, reason, "websocket closed");
    }

    fn on_error(&self, error: WsError) {
        tracing::warn!(%error, "websocket error");
    }

    fn on_text(&self, text: String) {
        tracing::debug!(len = text.len(), "websocket text message");
    }

    fn on_binary(&self, data: Bytes) {
        tracing::debug!(len = data.len(), "websocket binary message");
    }
}
