//! Close codes and close frame payloads (RFC 6455 section 7.4).

use bytes::{BufMut, Bytes, BytesMut};

/// Longest reason that still fits a 125 byte control payload after the code.
pub const MAX_REASON_LEN: usize = 123;

/// Well-known close codes.
pub struct CloseCode;

impl CloseCode {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED: u16 = 1003;
    /// Reported locally when the peer's close frame carried no code.
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const MANDATORY_EXTENSION: u16 = 1010;
    pub const INTERNAL_ERROR: u16 = 1011;

    /// Whether `code` may appear in a close frame on the wire.
    ///
    /// 1004, 1005, 1006 and 1015 are reserved for local reporting, the rest
    /// of 1000-2999 belongs to the protocol, and 3000-4999 is open to
    /// libraries and applications.
    pub const fn is_valid(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClosePayloadError {
    #[error("close payload of one byte")]
    Truncated,
    #[error("close code {0} is not allowed on the wire")]
    InvalidCode(u16),
    #[error("close reason is not valid UTF-8")]
    InvalidUtf8,
}

/// Code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Parse a received close payload. `Ok(None)` means the peer sent no code.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, ClosePayloadError> {
        match payload {
            [] => Ok(None),
            [_] => Err(ClosePayloadError::Truncated),
            [hi, lo, reason @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                if !CloseCode::is_valid(code) {
                    return Err(ClosePayloadError::InvalidCode(code));
                }
                let reason =
                    std::str::from_utf8(reason).map_err(|_| ClosePayloadError::InvalidUtf8)?;
                Ok(Some(Self::new(code, reason)))
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(self.code);
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_code_ranges() {
        for code in [1000, 1001, 1002, 1003, 1007, 1011, 1014, 3000, 4999] {
            assert!(CloseCode::is_valid(code), "{code}");
        }
        for code in [0, 999, 1004, 1005, 1006, 1015, 1016, 2999, 5000, u16::MAX] {
            assert!(!CloseCode::is_valid(code), "{code}");
        }
    }

    #[test]
    fn parse_and_encode() {
        let info = CloseInfo::new(1000, "bye");
        assert_eq!(&info.encode()[..], b"\x03\xe8bye");
        assert_eq!(CloseInfo::parse(&info.encode()), Ok(Some(info)));
        assert_eq!(CloseInfo::parse(&[]), Ok(None));
        assert_eq!(
            CloseInfo::parse(&[0x03, 0xe9]),
            Ok(Some(CloseInfo::new(1001, "")))
        );
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        assert_eq!(CloseInfo::parse(&[0x03]), Err(ClosePayloadError::Truncated));
        assert_eq!(
            CloseInfo::parse(&[0x03, 0xed]),
            Err(ClosePayloadError::InvalidCode(1005))
        );
        assert_eq!(
            CloseInfo::parse(&[0x03, 0xe8, 0xff, 0xfe]),
            Err(ClosePayloadError::InvalidUtf8)
        );
    }
}
