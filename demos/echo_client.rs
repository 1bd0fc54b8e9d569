//! A simple echo client example demonstrating basic WebSocket usage.
//!
//! Connects to a WebSocket echo server, sends a message and a ping, prints
//! the echoed response and closes cleanly. Set `RUST_LOG=monoio_wsclient=debug`
//! to watch the connection's own logging.

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use monoio_wsclient::{EventSink, LogSink, WebSocket, WsError};
use tracing::info;
use tracing_subscriber::EnvFilter;

const URL: &str = "wss://echo.websocket.org/";

enum Event {
    Open,
    Text(String),
    Binary(usize),
    Closed(u16, String),
    Failed(WsError),
}

/// Logs every event and forwards it to `main`.
struct Forward {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink for Forward {
    fn on_open(&self, protocol: Option<&str>) {
        LogSink.on_open(protocol);
        let _ = self.tx.unbounded_send(Event::Open);
    }

    fn on_close(&self, code: u16, reason: &str) {
        LogSink.on_close(code, reason);
        let _ = self.tx.unbounded_send(Event::Closed(code, reason.to_owned()));
    }

    fn on_error(&self, error: WsError) {
        let _ = self.tx.unbounded_send(Event::Failed(error));
    }

    fn on_text(&self, text: String) {
        let _ = self.tx.unbounded_send(Event::Text(text));
    }

    fn on_binary(&self, data: Bytes) {
        let _ = self.tx.unbounded_send(Event::Binary(data.len()));
    }
}

async fn next(events: &mut mpsc::UnboundedReceiver<Event>) -> Result<Event> {
    monoio::time::timeout(Duration::from_secs(10), events.next())
        .await
        .map_err(|_| anyhow!("timed out waiting for the server"))?
        .ok_or_else(|| anyhow!("event stream ended"))
}

async fn run() -> Result<()> {
    let (tx, mut events) = mpsc::unbounded();
    let ws = WebSocket::new(Forward { tx });

    info!(url = URL, "connecting to websocket echo server");
    ws.open(URL, &[])?;

    loop {
        match next(&mut events).await? {
            Event::Open => break,
            // echo.websocket.org greets every new connection.
            Event::Text(text) => info!(%text, "server greeting"),
            Event::Failed(err) => return Err(err.into()),
            _ => bail!("unexpected event before open"),
        }
    }

    let message = "Hello from monoio-wsclient!";
    ws.send_text(message).await?;
    info!(message, "message sent, waiting for echo");

    ws.send_ping().await?;
    info!("ping answered");

    loop {
        match next(&mut events).await? {
            Event::Text(text) if text == message => {
                info!(%text, "echo received");
                break;
            }
            Event::Text(text) => info!(%text, "other text frame"),
            Event::Binary(len) => info!(len, "received binary frame"),
            Event::Failed(err) => return Err(err.into()),
            Event::Closed(code, reason) => bail!("server closed the connection: {code} {reason}"),
            Event::Open => {}
        }
    }

    ws.close(1000, "done")?;
    loop {
        match next(&mut events).await? {
            Event::Closed(code, reason) => {
                info!(code, %reason, "closed");
                break;
            }
            Event::Failed(err) => return Err(err.into()),
            _ => {}
        }
    }

    println!("Example completed successfully!");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_all()
        .build()?;
    runtime.block_on(run())
}
