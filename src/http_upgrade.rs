//! Client side of the RFC 6455 opening handshake.

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use bytes::BytesMut;
use http::StatusCode;
use http::header::{
    CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL, UPGRADE,
};
use httparse::Status;
use memchr::memmem::Finder;
use monoio_compat::{AsyncReadExt, AsyncWriteExt};
use rand::RngCore;
use sha1::{Digest, Sha1};
use smallvec::SmallVec;

use crate::url::Endpoint;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_RESPONSE_HEADER: usize = 16 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum HandshakeError {
    #[error("eof during handshake")]
    Eof,
    #[error("oversized handshake")]
    Oversized,
    #[error("malformed HTTP response")]
    Malformed,
    #[error("expected status 101, got {0}")]
    Status(u16),
    #[error("missing upgrade headers")]
    Headers,
    #[error("bad Sec-WebSocket-Accept")]
    Accept,
    #[error("server selected subprotocol {0:?} which was not offered")]
    Protocol(String),
    #[error("server enabled extensions that were not offered")]
    Extensions,
    #[error("invalid request header {0:?}")]
    RequestHeader(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ClientKey {
    pub sec_websocket_key: String,
    pub expected_accept: String,
}

pub fn generate_client_key() -> ClientKey {
    let mut key_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut key_bytes);
    let sec_websocket_key = b64.encode(key_bytes);
    let expected_accept = accept_for(&sec_websocket_key);

    ClientKey {
        sec_websocket_key,
        expected_accept,
    }
}

/// `Sec-WebSocket-Accept` value a server must answer `key` with.
pub fn accept_for(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    b64.encode(sha1.finalize())
}

/// A serialized upgrade request and the key it carries.
pub struct UpgradeRequest {
    pub key: ClientKey,
    pub bytes: SmallVec<[u8; 512]>,
}

pub fn build_request(
    endpoint: &Endpoint,
    protocols: &[String],
    extra_headers: &[(String, String)],
) -> Result<UpgradeRequest, HandshakeError> {
    const REQUEST_PREFIX: &[u8] = b"GET ";
    const REQUEST_SUFFIX: &[u8] = b" HTTP/1.1\r\nHost: ";
    const UPGRADE_HEADERS: &[u8] = b"\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: ";
    const PROTOCOL_HEADER: &[u8] = b"Sec-WebSocket-Protocol: ";
    const HEADER_SEPARATOR: &[u8] = b": ";
    const CRLF: &[u8] = b"\r\n";

    for (name, value) in extra_headers {
        if !is_token(name) || value.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(HandshakeError::RequestHeader(name.clone()));
        }
    }
    if let Some(bad) = protocols.iter().find(|p| !is_token(p)) {
        return Err(HandshakeError::RequestHeader(bad.clone()));
    }

    let key = generate_client_key();
    let host = endpoint.host_header();
    let protocol_list = protocols.join(", ");

    let extra_len: usize = extra_headers
        .iter()
        .map(|(k, v)| k.len() + HEADER_SEPARATOR.len() + v.len() + CRLF.len())
        .sum();
    let protocol_len = if protocols.is_empty() {
        0
    } else {
        PROTOCOL_HEADER.len() + protocol_list.len() + CRLF.len()
    };
    let total_len = REQUEST_PREFIX.len()
        + endpoint.resource.len()
        + REQUEST_SUFFIX.len()
        + host.len()
        + UPGRADE_HEADERS.len()
        + key.sec_websocket_key.len()
        + CRLF.len() // after Sec-WebSocket-Key
        + protocol_len
        + extra_len
        + CRLF.len(); // terminating CRLF

    let mut bytes = SmallVec::<[u8; 512]>::with_capacity(total_len);
    bytes.extend_from_slice(REQUEST_PREFIX);
    bytes.extend_from_slice(endpoint.resource.as_bytes());
    bytes.extend_from_slice(REQUEST_SUFFIX);
    bytes.extend_from_slice(host.as_bytes());
    bytes.extend_from_slice(UPGRADE_HEADERS);
    bytes.extend_from_slice(key.sec_websocket_key.as_bytes());
    bytes.extend_from_slice(CRLF);

    if !protocols.is_empty() {
        bytes.extend_from_slice(PROTOCOL_HEADER);
        bytes.extend_from_slice(protocol_list.as_bytes());
        bytes.extend_from_slice(CRLF);
    }

    for (k, v) in extra_headers {
        bytes.extend_from_slice(k.as_bytes());
        bytes.extend_from_slice(HEADER_SEPARATOR);
        bytes.extend_from_slice(v.as_bytes());
        bytes.extend_from_slice(CRLF);
    }

    bytes.extend_from_slice(CRLF);

    Ok(UpgradeRequest { key, bytes })
}

pub async fn write_request<S>(stream: &mut S, request: &UpgradeRequest) -> Result<(), HandshakeError>
where
    S: AsyncWriteExt + Unpin,
{
    stream.write_all(&request.bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Check a parsed `101` response against the key that was sent.
///
/// Returns the subprotocol the server selected, if any.
pub fn validate_response(
    status: u16,
    headers: &[httparse::Header<'_>],
    sent_key: &str,
    requested: &[String],
) -> Result<Option<String>, HandshakeError> {
    if status != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
        return Err(HandshakeError::Status(status));
    }

    let connection = find_header(headers, CONNECTION.as_str()).ok_or(HandshakeError::Headers)?;
    if !header_has_token(connection, "upgrade") {
        return Err(HandshakeError::Headers);
    }

    let upgrade = find_header(headers, UPGRADE.as_str()).ok_or(HandshakeError::Headers)?;
    if !upgrade.eq_ignore_ascii_case(b"websocket") {
        return Err(HandshakeError::Headers);
    }

    let accept =
        find_header(headers, SEC_WEBSOCKET_ACCEPT.as_str()).ok_or(HandshakeError::Headers)?;
    if accept.trim_ascii() != accept_for(sent_key).as_bytes() {
        return Err(HandshakeError::Accept);
    }

    if find_header(headers, SEC_WEBSOCKET_EXTENSIONS.as_str()).is_some_and(|v| !v.is_empty()) {
        return Err(HandshakeError::Extensions);
    }

    match find_header(headers, SEC_WEBSOCKET_PROTOCOL.as_str()) {
        None => Ok(None),
        Some(raw) => {
            let selected = String::from_utf8_lossy(raw).trim().to_owned();
            if requested.iter().any(|p| *p == selected) {
                Ok(Some(selected))
            } else {
                Err(HandshakeError::Protocol(selected))
            }
        }
    }
}

/// Result of a successful upgrade.
#[derive(Debug)]
pub struct Upgraded {
    pub protocol: Option<String>,
    /// Bytes that arrived after the response headers; these already belong to
    /// the frame stream.
    pub leftover: BytesMut,
}

pub async fn read_response<S>(
    stream: &mut S,
    sent_key: &str,
    requested: &[String],
) -> Result<Upgraded, HandshakeError>
where
    S: AsyncReadExt + Unpin,
{
    let mut hdr = Vec::with_capacity(2048);
    let mut chunk = [0u8; 1024];
    let finder = Finder::new(b"\r\n\r\n");
    let mut scan_pos = 0;

    let header_end = loop {
        if let Some(i) = finder.find(&hdr[scan_pos..]) {
            break scan_pos + i + 4;
        }

        scan_pos = hdr.len().saturating_sub(3);

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Eof);
        }

        hdr.extend_from_slice(&chunk[..n]);
        if hdr.len() > MAX_RESPONSE_HEADER {
            return Err(HandshakeError::Oversized);
        }
    };

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(&hdr[..header_end]) {
        Ok(Status::Complete(_)) => {}
        _ => return Err(HandshakeError::Malformed),
    }
    let status = response.code.ok_or(HandshakeError::Malformed)?;
    let protocol = validate_response(status, response.headers, sent_key, requested)?;

    Ok(Upgraded {
        protocol,
        leftover: BytesMut::from(&hdr[header_end..]),
    })
}

fn find_header<'a>(headers: &'a [httparse::Header<'a>], name: &str) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value)
}

fn header_has_token(value: &[u8], token: &str) -> bool {
    value
        .split(|b| *b == b',')
        .any(|part| part.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
}

// RFC 7230 token characters, good enough for header names and subprotocols.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
