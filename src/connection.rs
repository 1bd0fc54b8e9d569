//! Per-connection I/O.
//!
//! Each connection runs as two monoio tasks. The reader performs the opening
//! handshake, then owns the read half: it decodes frames, answers pings,
//! assembles messages and drives the close handshake. The writer owns the
//! write half and drains the single outbound queue, so frames from concurrent
//! callers never interleave on the wire.
//!
//! The reader is the only place a connection ends. The writer reports write
//! failures and close timeouts to it through a oneshot, and the reader turns
//! every ending into exactly one terminal sink callback.

use std::collections::VecDeque;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::channel::{mpsc, oneshot};
use futures::future::{Either, select};
use futures::StreamExt;
use monoio_compat::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use parking_lot::Mutex;
use tokio::io::{ReadHalf, split};
use tracing::{debug, info, warn};

use crate::close::{CloseCode, CloseInfo};
use crate::config::Config;
use crate::error::WsError;
use crate::frame::{self, Decoded, Frame, FrameError, OpCode, Role};
use crate::http_upgrade::{HandshakeError, Upgraded, build_request, read_response, write_request};
use crate::message::{Assembler, Message};
use crate::sink::EventSink;
use crate::state::{ReadyState, StateMachine};
use crate::transport::{self, Transport};
use crate::url::Endpoint;

pub(crate) type Responder = oneshot::Sender<Result<(), WsError>>;

/// Queued for the writer.
pub(crate) enum Outbound {
    Frame {
        frame: Frame,
        done: Option<Responder>,
    },
    /// Last frame the writer sends. With `await_reply` the writer then arms
    /// the close-handshake timer.
    Close { frame: Frame, await_reply: bool },
}

/// State shared between the public handle and the connection tasks.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) machine: StateMachine,
    pub(crate) outbound: Option<mpsc::UnboundedSender<Outbound>>,
    pub(crate) pings: VecDeque<Responder>,
    pub(crate) protocol: Option<String>,
    pub(crate) close_info: Option<CloseInfo>,
}

/// Writer to reader notifications.
enum Interrupt {
    CloseTimeout,
    WriteFailed(io::Error),
}

/// How a connection ended.
enum End {
    /// Close handshake finished. `echo` is the close frame still owed to the
    /// peer when it initiated.
    Closed {
        info: Option<CloseInfo>,
        echo: Option<Frame>,
    },
    Failed(WsError),
}

#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) shared: Arc<Mutex<Shared>>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) config: Arc<Config>,
}

impl Context {
    /// Mark the connection closed and deliver its single terminal event.
    fn finish(&self, end: End) {
        let (outbound, pings) = {
            let mut shared = self.shared.lock();
            shared.machine.force_closed();
            if let End::Closed { info, .. } = &end {
                shared.close_info = info.clone();
            }
            (shared.outbound.take(), std::mem::take(&mut shared.pings))
        };

        let last_frame = match &end {
            End::Closed { echo, .. } => echo.clone(),
            End::Failed(err) => err
                .close_code()
                .map(|code| Frame::close(CloseInfo::new(code, "").encode())),
        };
        if let (Some(outbound), Some(frame)) = (&outbound, last_frame) {
            let _ = outbound.unbounded_send(Outbound::Close {
                frame,
                await_reply: false,
            });
        }
        // Closing the queue lets the writer drain and exit.
        drop(outbound);

        for ping in pings {
            let _ = ping.send(Err(WsError::Disconnected));
        }

        match end {
            End::Closed { info, .. } => {
                let (code, reason) = match info {
                    Some(info) => (info.code, info.reason),
                    None => (CloseCode::NO_STATUS, String::new()),
                };
                info!(code, %reason, "websocket closed");
                self.sink.on_close(code, &reason);
            }
            End::Failed(err) => {
                warn!(error = %err, "websocket failed");
                self.sink.on_error(err);
            }
        }
    }

    fn opened(&self, protocol: Option<String>) -> bool {
        {
            let mut shared = self.shared.lock();
            if let Err(err) = shared.machine.transition(ReadyState::Open) {
                debug!(%err, "handshake finished on a connection that is no longer connecting");
                return false;
            }
            shared.protocol = protocol.clone();
        }
        info!(?protocol, "websocket open");
        self.sink.on_open(protocol.as_deref());
        true
    }

    /// Queue a control frame unless we have already stopped sending.
    fn reply(&self, frame: Frame) {
        let shared = self.shared.lock();
        if shared.machine.state() != ReadyState::Open {
            return;
        }
        if let Some(outbound) = &shared.outbound {
            let _ = outbound.unbounded_send(Outbound::Frame { frame, done: None });
        }
    }
}

/// Connect to `endpoint`, then run the connection to completion.
pub(crate) async fn run_endpoint(
    ctx: Context,
    endpoint: Endpoint,
    protocols: Vec<String>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    match transport::connect(&endpoint).await {
        Ok(stream) => run(ctx, stream, endpoint, protocols, outbound).await,
        Err(err) => ctx.finish(End::Failed(err)),
    }
}

/// Handshake over `stream`, then pump frames until the connection ends.
pub(crate) async fn run<S: Transport>(
    ctx: Context,
    mut stream: S,
    endpoint: Endpoint,
    protocols: Vec<String>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let upgraded = match handshake(&mut stream, &endpoint, &protocols, &ctx.config).await {
        Ok(upgraded) => upgraded,
        Err(err) => return ctx.finish(End::Failed(WsError::HandshakeFailed(err))),
    };
    if !ctx.opened(upgraded.protocol) {
        return;
    }

    let (read_half, write_half) = split(stream);
    let (interrupt_tx, interrupt_rx) = oneshot::channel();
    let _writer = monoio::spawn(write_loop(
        write_half,
        outbound,
        interrupt_tx,
        ctx.config.close_timeout,
    ));

    let reader = Reader {
        assembler: Assembler::new(ctx.config.max_message_size),
        ctx,
        stream: read_half,
        buf: upgraded.leftover,
        interrupt: interrupt_rx,
    };
    reader.run().await;
}

async fn handshake<S: Transport>(
    stream: &mut S,
    endpoint: &Endpoint,
    protocols: &[String],
    config: &Config,
) -> Result<Upgraded, HandshakeError> {
    let request = build_request(endpoint, protocols, &config.extra_headers)?;
    write_request(stream, &request).await?;
    let upgraded = read_response(stream, &request.key.sec_websocket_key, protocols).await?;
    debug!(resource = %endpoint.resource, "upgrade accepted");
    Ok(upgraded)
}

struct Reader<S> {
    ctx: Context,
    stream: ReadHalf<S>,
    buf: BytesMut,
    assembler: Assembler,
    interrupt: oneshot::Receiver<Interrupt>,
}

enum Wake {
    Read(io::Result<usize>),
    Interrupt(Result<Interrupt, oneshot::Canceled>),
}

impl<S: Transport> Reader<S> {
    async fn run(mut self) {
        let end = self.pump().await;
        self.ctx.finish(end);
    }

    async fn pump(&mut self) -> End {
        let max_frame = self.ctx.config.max_frame_size as u64;
        loop {
            loop {
                match frame::decode(&self.buf, max_frame) {
                    Ok(Decoded::Frame(frame, used)) => {
                        let _ = self.buf.split_to(used);
                        match self.on_frame(frame) {
                            Ok(None) => {}
                            Ok(Some(end)) => return end,
                            Err(err) => return End::Failed(err),
                        }
                    }
                    Ok(Decoded::NeedMoreData) => break,
                    Err(err) => return End::Failed(err.into()),
                }
            }

            self.buf.reserve(self.ctx.config.read_buffer_size);
            let wake = {
                let read = pin!(self.stream.read_buf(&mut self.buf));
                match select(read, &mut self.interrupt).await {
                    Either::Left((res, _)) => Wake::Read(res),
                    Either::Right((sig, _)) => Wake::Interrupt(sig),
                }
            };

            match wake {
                Wake::Read(Ok(0)) => {
                    return End::Failed(WsError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed without a close frame",
                    )));
                }
                Wake::Read(Ok(_)) => {}
                Wake::Read(Err(err)) => return End::Failed(WsError::Transport(err)),
                Wake::Interrupt(Ok(Interrupt::CloseTimeout)) => {
                    return End::Failed(WsError::CloseTimeout);
                }
                Wake::Interrupt(Ok(Interrupt::WriteFailed(err))) => {
                    return End::Failed(WsError::Transport(err));
                }
                Wake::Interrupt(Err(oneshot::Canceled)) => return End::Failed(WsError::Disconnected),
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<Option<End>, WsError> {
        if frame.mask.is_some() {
            return Err(FrameError::Masked.into());
        }
        match frame.opcode {
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                match self.assembler.push(frame)? {
                    Some(Message::Text(text)) => self.ctx.sink.on_text(text),
                    Some(Message::Binary(data)) => self.ctx.sink.on_binary(data),
                    None => {}
                }
                Ok(None)
            }
            OpCode::Ping => {
                self.ctx.reply(Frame::pong(frame.payload));
                Ok(None)
            }
            OpCode::Pong => {
                let waiter = self.ctx.shared.lock().pings.pop_front();
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(Ok(()));
                    }
                    None => debug!("unsolicited pong ignored"),
                }
                Ok(None)
            }
            OpCode::Close => {
                let info = CloseInfo::parse(&frame.payload)?;
                let state = self.ctx.shared.lock().machine.state();
                let echo = (state == ReadyState::Open).then(|| {
                    let code = info.as_ref().map_or(CloseCode::NORMAL, |info| info.code);
                    Frame::close(CloseInfo::new(code, "").encode())
                });
                debug!(?info, %state, "close frame received");
                Ok(Some(End::Closed { info, echo }))
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut interrupt: oneshot::Sender<Interrupt>,
    close_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    while let Some(item) = outbound.next().await {
        let (frame, done, close) = match item {
            Outbound::Frame { frame, done } => (frame, done, None),
            Outbound::Close { frame, await_reply } => (frame, None, Some(await_reply)),
        };

        buf.clear();
        if let Err(err) = frame.masked().encode(Role::Client, &mut buf) {
            if let Some(done) = done {
                let _ = done.send(Err(err.into()));
            }
            continue;
        }

        if let Err(err) = write_frame(&mut writer, &buf).await {
            warn!(error = %err, "websocket write failed");
            if let Some(done) = done {
                let _ = done.send(Err(WsError::Transport(io::Error::new(
                    err.kind(),
                    err.to_string(),
                ))));
            }
            let _ = interrupt.send(Interrupt::WriteFailed(err));
            return;
        }
        if let Some(done) = done {
            let _ = done.send(Ok(()));
        }

        match close {
            None => {}
            Some(false) => return,
            Some(true) => {
                // Wait for the reader to see the peer's close, or give up.
                let timer = pin!(monoio::time::sleep(close_timeout));
                let timed_out = matches!(
                    select(timer, interrupt.cancellation()).await,
                    Either::Left(_)
                );
                if timed_out {
                    debug!(?close_timeout, "close handshake timed out");
                    let _ = interrupt.send(Interrupt::CloseTimeout);
                }
                return;
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Ping payloads are empty; pongs are matched to pings in FIFO order.
pub(crate) fn ping_frame() -> Frame {
    Frame::ping(Bytes::new())
}
