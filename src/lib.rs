//! # monoio-wsclient
//!
//! A WebSocket client for the [`monoio`] async runtime that speaks RFC 6455
//! itself: the opening handshake, the frame codec, ping/pong and the close
//! handshake all live in this crate. `ws://` and `wss://` (via `monoio-rustls`)
//! are supported out of the box, and any duplex byte stream can be used with
//! [`WebSocket::open_with_stream`].
//!
//! ## Model
//!
//! A [`WebSocket`] is a handle with four states ([`ReadyState`]):
//! `Connecting → Open → Closing → Closed`. Calls never block on the network:
//! `open` spawns the connection, sends are queued on a single ordered outbound
//! queue, and everything the peer does is reported to an [`EventSink`] from
//! the connection's I/O task. Each connection ends with exactly one
//! `on_close` or `on_error`; a failed connection is never resumed.
//!
//! ## Example
//!
//! ```no_run
//! use monoio_wsclient::{EventSink, WebSocket, WsError};
//!
//! struct Printer;
//!
//! impl EventSink for Printer {
//!     fn on_open(&self, protocol: Option<&str>) {
//!         println!("open ({protocol:?})");
//!     }
//!     fn on_text(&self, text: String) {
//!         println!("received: {text}");
//!     }
//!     fn on_close(&self, code: u16, reason: &str) {
//!         println!("closed: {code} {reason}");
//!     }
//!     fn on_error(&self, error: WsError) {
//!         eprintln!("error: {error}");
//!     }
//! }
//!
//! fn main() -> Result<(), WsError> {
//!     let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
//!         .enable_all()
//!         .build()?;
//!
//!     runtime.block_on(async {
//!         let ws = WebSocket::new(Printer);
//!         ws.open("wss://echo.websocket.org/", &[])?;
//!
//!         // Queued until the handshake completes.
//!         ws.send_text("Hello, WebSocket!").await?;
//!         ws.send_ping().await?;
//!         ws.close(1000, "bye")
//!     })
//! }
//! ```
//!
//! ## Platform Support
//!
//! - **Linux**: Full support with `io_uring` (recommended)
//! - **macOS/Windows**: Limited support (falls back to standard async I/O)
//!
//! [`monoio`]: https://docs.rs/monoio

pub mod client;
pub mod close;
pub mod config;
mod connection;
pub mod error;
pub mod frame;
pub mod http_upgrade;
pub mod message;
pub mod sink;
pub mod state;
pub mod tls;
pub mod transport;
pub mod url;

pub use client::{Completion, WebSocket};
pub use close::{CloseCode, CloseInfo};
pub use config::Config;
pub use error::WsError;
pub use message::Message;
pub use sink::{EventSink, LogSink};
pub use state::ReadyState;
pub use transport::{AnyStream, Transport};
