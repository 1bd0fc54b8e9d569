//! Shared fixtures: a monoio runtime, a recording event sink, and an
//! in-memory server peer that speaks just enough RFC 6455 to drive the client.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::mpsc;
use monoio_wsclient::frame::{self, Decoded, Frame, Role};
use monoio_wsclient::http_upgrade::accept_for;
use monoio_wsclient::{Config, EventSink, WebSocket, WsError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

pub const URL: &str = "ws://example.test/chat";

pub fn run<F: Future>(fut: F) -> F::Output {
    let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_all()
        .build()
        .expect("failed to build monoio runtime");
    runtime.block_on(fut)
}

#[derive(Debug)]
pub enum Event {
    Open(Option<String>),
    Close(u16, String),
    Error(WsError),
    Text(String),
    Binary(Bytes),
}

pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl Recorder {
    pub fn new() -> (Self, Events) {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, Events { rx })
    }

    fn push(&self, event: Event) {
        let _ = self.tx.unbounded_send(event);
    }
}

impl EventSink for Recorder {
    fn on_open(&self, protocol: Option<&str>) {
        self.push(Event::Open(protocol.map(str::to_owned)));
    }

    fn on_close(&self, code: u16, reason: &str) {
        self.push(Event::Close(code, reason.to_owned()));
    }

    fn on_error(&self, error: WsError) {
        self.push(Event::Error(error));
    }

    fn on_text(&self, text: String) {
        self.push(Event::Text(text));
    }

    fn on_binary(&self, data: Bytes) {
        self.push(Event::Binary(data));
    }
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Events {
    pub async fn next(&mut self) -> Event {
        monoio::time::timeout(Duration::from_secs(5), self.rx.next())
            .await
            .expect("timed out waiting for a sink event")
            .expect("sink dropped")
    }

    /// Panics if an event is already waiting.
    pub fn assert_quiet(&mut self) {
        if let Ok(Some(event)) = self.rx.try_next() {
            panic!("unexpected event {event:?}");
        }
    }
}

/// Server end of a connection, in memory by default.
pub struct Peer<S = DuplexStream> {
    io: S,
    buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Peer<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
        }
    }

    /// Read the upgrade request and return it as text.
    pub async fn read_request(&mut self) -> String {
        loop {
            if let Some(end) = find(&self.buf, b"\r\n\r\n") {
                let head = self.buf.split_to(end + 4);
                return String::from_utf8(head.to_vec()).expect("request is utf-8");
            }
            let n = self.io.read_buf(&mut self.buf).await.expect("peer read");
            assert!(n > 0, "client hung up during handshake");
        }
    }

    /// Complete the handshake, optionally selecting `protocol`. Returns the
    /// request text.
    pub async fn accept(&mut self, protocol: Option<&str>) -> String {
        let request = self.read_request().await;
        let key = header(&request, "Sec-WebSocket-Key").expect("request carries a key");
        let response = response_for(&accept_for(key), protocol);
        self.send_raw(response.as_bytes()).await;
        request
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.expect("peer write");
    }

    pub async fn send(&mut self, frame: Frame) {
        let mut buf = BytesMut::new();
        frame.encode(Role::Server, &mut buf).expect("server frame encodes");
        self.send_raw(&buf).await;
    }

    /// Next frame from the client; asserts it was masked.
    pub async fn recv(&mut self) -> Frame {
        self.try_recv().await.expect("client hung up")
    }

    /// Next frame, or `None` once the client side of the stream is gone.
    pub async fn try_recv(&mut self) -> Option<Frame> {
        loop {
            match frame::decode(&self.buf, u64::MAX >> 1).expect("client sent a valid frame") {
                Decoded::Frame(frame, used) => {
                    let _ = self.buf.split_to(used);
                    assert!(frame.mask.is_some(), "client frame must be masked");
                    return Some(frame);
                }
                Decoded::NeedMoreData => {
                    let read = monoio::time::timeout(
                        Duration::from_secs(5),
                        self.io.read_buf(&mut self.buf),
                    )
                    .await
                    .expect("timed out waiting for a client frame")
                    .expect("peer read");
                    if read == 0 {
                        return None;
                    }
                }
            }
        }
    }
}

pub fn response_for(accept: &str, protocol: Option<&str>) -> String {
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n"
    );
    if let Some(protocol) = protocol {
        response.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
    }
    response.push_str("\r\n");
    response
}

pub fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Open a client over an in-memory pipe. Must run inside the runtime.
pub fn connect(config: Config, protocols: &[&str]) -> (WebSocket, Peer, Events) {
    let (client_io, server_io) = tokio::io::duplex(1 << 20);
    let (sink, events) = Recorder::new();
    let ws = WebSocket::with_config(sink, config);
    ws.open_with_stream(client_io, URL, protocols)
        .expect("valid url");
    (ws, Peer::new(server_io), events)
}

/// Like [`connect`] but also completes the handshake and consumes the open
/// event.
pub async fn connected(config: Config) -> (WebSocket, Peer, Events) {
    let (ws, mut peer, mut events) = connect(config, &[]);
    peer.accept(None).await;
    match events.next().await {
        Event::Open(None) => {}
        other => panic!("expected open, got {other:?}"),
    }
    (ws, peer, events)
}

/// Transport that answers the handshake and then fails every read with a
/// connection reset, counting reads.
pub struct ResetStream {
    written: Vec<u8>,
    answered: bool,
    pub reads: Arc<AtomicUsize>,
}

impl ResetStream {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let stream = Self {
            written: Vec::new(),
            answered: false,
            reads: reads.clone(),
        };
        (stream, reads)
    }
}

impl AsyncRead for ResetStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.answered {
            return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
        }
        let request = String::from_utf8_lossy(&self.written).into_owned();
        let key = header(&request, "Sec-WebSocket-Key").expect("request written before read");
        buf.put_slice(response_for(&accept_for(key), None).as_bytes());
        self.answered = true;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ResetStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Transport that completes the handshake, then fails every write with a
/// broken pipe. Reads after the handshake never complete.
pub struct BrokenWriteStream {
    written: Vec<u8>,
    answered: bool,
}

impl BrokenWriteStream {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            answered: false,
        }
    }
}

impl AsyncRead for BrokenWriteStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.answered {
            return Poll::Pending;
        }
        let request = String::from_utf8_lossy(&self.written).into_owned();
        let key = header(&request, "Sec-WebSocket-Key").expect("request written before read");
        buf.put_slice(response_for(&accept_for(key), None).as_bytes());
        self.answered = true;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for BrokenWriteStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.answered {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        self.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
