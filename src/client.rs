use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use futures::channel::{mpsc, oneshot};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::close::{CloseCode, CloseInfo, MAX_REASON_LEN};
use crate::config::Config;
use crate::connection::{self, Context, Outbound, Responder, Shared, ping_frame};
use crate::error::WsError;
use crate::frame::Frame;
use crate::message::Message;
use crate::sink::EventSink;
use crate::state::ReadyState;
use crate::transport::Transport;
use crate::url::Endpoint;

/// A WebSocket client handle.
///
/// The handle is cheap to share (`Send + Sync`) and every method returns
/// without waiting on the network. Events arrive on the [`EventSink`] given
/// at construction.
///
/// `open` and `open_with_stream` spawn the connection onto the current monoio
/// runtime, which must have its timer enabled; called from any other thread
/// they fail with [`WsError::NoRuntime`]. Sends, pings and `close` may be
/// called from any thread.
pub struct WebSocket {
    shared: Arc<Mutex<Shared>>,
    sink: Arc<dyn EventSink>,
    config: Arc<Config>,
}

impl WebSocket {
    pub fn new(sink: impl EventSink) -> Self {
        Self::with_config(sink, Config::default())
    }

    pub fn with_config(sink: impl EventSink, config: Config) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            sink: Arc::new(sink),
            config: Arc::new(config),
        }
    }

    /// Connect to a `ws://` or `wss://` URL, offering `protocols`.
    ///
    /// A malformed URL is rejected before anything else happens. Calling this
    /// while a connection is not `Closed` does nothing.
    pub fn open(&self, url: &str, protocols: &[&str]) -> Result<(), WsError> {
        let endpoint = Endpoint::parse(url)?;
        let Some(outbound) = self.begin_open() else {
            return Ok(());
        };
        let ctx = self.context();
        let protocols = protocols.iter().map(|p| (*p).to_owned()).collect();
        self.launch(connection::run_endpoint(ctx, endpoint, protocols, outbound))
    }

    /// Like [`open`](Self::open), but over an already connected stream. `url`
    /// only supplies the `Host` header and request path.
    pub fn open_with_stream<S: Transport>(
        &self,
        stream: S,
        url: &str,
        protocols: &[&str],
    ) -> Result<(), WsError> {
        let endpoint = Endpoint::parse(url)?;
        let Some(outbound) = self.begin_open() else {
            return Ok(());
        };
        let ctx = self.context();
        let protocols = protocols.iter().map(|p| (*p).to_owned()).collect();
        self.launch(connection::run(ctx, stream, endpoint, protocols, outbound))
    }

    fn begin_open(&self) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        let mut shared = self.shared.lock();
        if let Err(err) = shared.machine.transition(ReadyState::Connecting) {
            debug!(%err, "open ignored");
            return None;
        }
        let (tx, rx) = mpsc::unbounded();
        shared.outbound = Some(tx);
        shared.pings.clear();
        shared.protocol = None;
        shared.close_info = None;
        Some(rx)
    }

    /// Spawn the connection task. `monoio::spawn` panics when no runtime is
    /// running on this thread; in that case the handle goes back to `Closed`.
    fn launch<F>(&self, task: F) -> Result<(), WsError>
    where
        F: Future<Output = ()> + 'static,
    {
        let spawned = panic::catch_unwind(AssertUnwindSafe(|| {
            drop(monoio::spawn(task));
        }));
        if spawned.is_err() {
            let mut shared = self.shared.lock();
            shared.machine.force_closed();
            shared.outbound = None;
            warn!("open called outside a monoio runtime");
            return Err(WsError::NoRuntime);
        }
        Ok(())
    }

    fn context(&self) -> Context {
        Context {
            shared: self.shared.clone(),
            sink: self.sink.clone(),
            config: self.config.clone(),
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> Completion {
        self.send(Message::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<bytes::Bytes>) -> Completion {
        self.send(Message::Binary(data.into()))
    }

    /// Queue a message. The returned [`Completion`] resolves once the frame
    /// has been written; it may be dropped if the caller does not care.
    ///
    /// Messages sent while `Connecting` are held until the handshake succeeds.
    pub fn send(&self, message: impl Into<Message>) -> Completion {
        let (done, completion) = Completion::channel();
        let frame = message.into().into_frame();
        self.enqueue(frame, done, false);
        completion
    }

    /// Send a ping. The completion resolves when the matching pong arrives,
    /// or with [`WsError::Disconnected`] if the connection ends first.
    pub fn send_ping(&self) -> Completion {
        let (done, completion) = Completion::channel();
        self.enqueue(ping_frame(), done, true);
        completion
    }

    fn enqueue(&self, frame: Frame, done: Responder, is_ping: bool) {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;
        let accepting = matches!(
            shared.machine.state(),
            ReadyState::Connecting | ReadyState::Open
        );
        let Some(outbound) = shared.outbound.as_ref().filter(|_| accepting) else {
            let _ = done.send(Err(WsError::NotOpen));
            return;
        };
        if is_ping {
            if outbound
                .unbounded_send(Outbound::Frame { frame, done: None })
                .is_ok()
            {
                shared.pings.push_back(done);
            }
        } else {
            // On failure `done` is dropped with the item and the completion
            // reports Disconnected.
            let _ = outbound.unbounded_send(Outbound::Frame {
                frame,
                done: Some(done),
            });
        }
    }

    /// Start the close handshake.
    ///
    /// Only acts while `Open`; in any other state it does nothing. The code
    /// and reason are validated before any state changes. Completion is
    /// reported through [`EventSink::on_close`], or
    /// [`EventSink::on_error`] with [`WsError::CloseTimeout`] if the peer
    /// never answers.
    pub fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        let mut shared = self.shared.lock();
        let state = shared.machine.state();
        if state != ReadyState::Open {
            debug!(%state, "close ignored");
            return Ok(());
        }
        if !CloseCode::is_valid(code) {
            return Err(WsError::InvalidCloseCode(code));
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(WsError::CloseReasonTooLong(reason.len()));
        }
        if let Err(err) = shared.machine.transition(ReadyState::Closing) {
            debug!(%err, "close ignored");
            return Ok(());
        }

        let frame = Frame::close(CloseInfo::new(code, reason).encode());
        if let Some(outbound) = &shared.outbound {
            let _ = outbound.unbounded_send(Outbound::Close {
                frame,
                await_reply: true,
            });
        }
        info!(code, reason, "closing websocket");
        Ok(())
    }

    pub fn state(&self) -> ReadyState {
        self.shared.lock().machine.state()
    }

    /// Subprotocol selected by the server for the current connection.
    pub fn protocol(&self) -> Option<String> {
        self.shared.lock().protocol.clone()
    }

    /// Code and reason of the last completed close handshake.
    pub fn close_info(&self) -> Option<CloseInfo> {
        self.shared.lock().close_info.clone()
    }
}

/// Resolves when a queued send is written or a ping is answered. Dropping it
/// does not cancel the operation.
pub struct Completion {
    rx: oneshot::Receiver<Result<(), WsError>>,
}

impl Completion {
    fn channel() -> (Responder, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for Completion {
    type Output = Result<(), WsError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|res| res.unwrap_or(Err(WsError::Disconnected)))
    }
}
