//! RFC 6455 frame codec.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! The decoder is stateless: it is handed the whole unconsumed read buffer
//! each time and either returns a frame plus the number of bytes it used, or
//! asks for more data. Header problems are reported as soon as the bytes
//! that reveal them are present, never earlier.

use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,
    #[error("unknown opcode 0x{0:X}")]
    UnknownOpcode(u8),
    #[error("control frame cannot be fragmented")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlTooLarge(u64),
    #[error("payload length is not minimally encoded")]
    NonCanonicalLength,
    #[error("64-bit payload length has its most significant bit set")]
    LengthOverflow,
    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("client frames must carry a mask key")]
    Unmasked,
    #[error("server frames must not be masked")]
    Masked,
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("new data frame while a fragmented message is in progress")]
    InterleavedMessage,
    #[error("{0:?} frame is not part of a data message")]
    NotData(OpCode),
}

/// Which end of the connection is encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A single frame. Payloads are always held unmasked; `mask` records the key
/// used (or to be used) on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// Close frame carrying an already encoded close payload.
    pub fn close(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    /// Attach a fresh random mask key.
    pub fn masked(mut self) -> Self {
        let mut key = [0u8; 4];
        rand::rng().fill_bytes(&mut key);
        self.mask = Some(key);
        self
    }

    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Size of the encoded frame on the wire.
    pub fn encoded_len(&self) -> usize {
        let len = self.payload.len();
        let ext = match len {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + ext + mask + len
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// A client must mask every frame it sends and a server must never mask,
    /// so the role decides which frames are refused.
    pub fn encode(&self, role: Role, dst: &mut BytesMut) -> Result<(), FrameError> {
        match (role, self.mask) {
            (Role::Client, None) => return Err(FrameError::Unmasked),
            (Role::Server, Some(_)) => return Err(FrameError::Masked),
            _ => {}
        }
        let len = self.payload.len();
        if self.opcode.is_control() {
            if !self.fin {
                return Err(FrameError::FragmentedControl);
            }
            if len > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlTooLarge(len as u64));
            }
        }

        dst.reserve(self.encoded_len());
        let fin = if self.fin { FIN } else { 0 };
        dst.put_u8(fin | self.opcode as u8);

        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };
        if len <= MAX_CONTROL_PAYLOAD {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= 0xFFFF {
            dst.put_u8(mask_bit | LEN_16);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | LEN_64);
            dst.put_u64(len as u64);
        }

        match self.mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
        Ok(())
    }
}

/// Outcome of a decode attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied.
    Frame(Frame, usize),
    NeedMoreData,
}

/// Decode one frame from the front of `src`.
///
/// `max_payload` bounds the declared payload length; anything larger is
/// rejected before its bytes are waited for.
pub fn decode(src: &[u8], max_payload: u64) -> Result<Decoded, FrameError> {
    let [first, second, ..] = *src else {
        return Ok(Decoded::NeedMoreData);
    };

    if first & RSV_MASK != 0 {
        return Err(FrameError::ReservedBits);
    }
    let fin = first & FIN != 0;
    let opcode = OpCode::from_bits(first & OPCODE_MASK)?;
    let masked = second & MASK_BIT != 0;
    let len7 = second & LEN_MASK;

    if opcode.is_control() {
        if !fin {
            return Err(FrameError::FragmentedControl);
        }
        if len7 as usize > MAX_CONTROL_PAYLOAD {
            // 126/127 would announce at least 126 bytes.
            return Err(FrameError::ControlTooLarge(u64::from(len7)));
        }
    }

    let mut pos = 2;
    let payload_len = match len7 {
        LEN_16 => {
            let Some(ext) = src.get(pos..pos + 2) else {
                return Ok(Decoded::NeedMoreData);
            };
            pos += 2;
            let len = u64::from(u16::from_be_bytes([ext[0], ext[1]]));
            if len <= MAX_CONTROL_PAYLOAD as u64 {
                return Err(FrameError::NonCanonicalLength);
            }
            len
        }
        LEN_64 => {
            let Some(ext) = src.get(pos..pos + 8) else {
                return Ok(Decoded::NeedMoreData);
            };
            pos += 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(ext);
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(FrameError::LengthOverflow);
            }
            if len <= 0xFFFF {
                return Err(FrameError::NonCanonicalLength);
            }
            len
        }
        short => u64::from(short),
    };

    if payload_len > max_payload {
        return Err(FrameError::TooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let mask = if masked {
        let Some(key) = src.get(pos..pos + 4) else {
            return Ok(Decoded::NeedMoreData);
        };
        pos += 4;
        Some([key[0], key[1], key[2], key[3]])
    } else {
        None
    };

    // max_payload keeps this within usize on every supported target.
    let payload_len = payload_len as usize;
    let Some(body) = src.get(pos..pos + payload_len) else {
        return Ok(Decoded::NeedMoreData);
    };
    let mut payload = BytesMut::from(body);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Decoded::Frame(
        Frame {
            fin,
            opcode,
            mask,
            payload: payload.freeze(),
        },
        pos + payload_len,
    ))
}

/// XOR `buf` with the repeating 4-byte key. Masking and unmasking are the same
/// operation.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        chunk[0] ^= key[0];
        chunk[1] ^= key[1];
        chunk[2] ^= key[2];
        chunk[3] ^= key[3];
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}
