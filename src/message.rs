use bytes::{Bytes, BytesMut};

use crate::error::WsError;
use crate::frame::{Frame, FrameError, OpCode};

/// A complete application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    pub(crate) fn into_frame(self) -> Frame {
        match self {
            Message::Text(text) => Frame::text(text),
            Message::Binary(data) => Frame::binary(data),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Message::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data.into())
    }
}

/// Reassembles fragmented data frames into messages.
#[derive(Debug)]
pub(crate) struct Assembler {
    current: Option<OpCode>,
    buf: BytesMut,
    max_message_size: usize,
}

impl Assembler {
    pub(crate) fn new(max_message_size: usize) -> Self {
        Self {
            current: None,
            buf: BytesMut::new(),
            max_message_size,
        }
    }

    /// Feed one data frame. Returns a message once its final fragment arrives.
    pub(crate) fn push(&mut self, frame: Frame) -> Result<Option<Message>, WsError> {
        let opcode = match (frame.opcode, self.current) {
            (OpCode::Continuation, Some(opcode)) => opcode,
            (OpCode::Continuation, None) => {
                return Err(FrameError::UnexpectedContinuation.into());
            }
            (OpCode::Text | OpCode::Binary, None) => frame.opcode,
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(FrameError::InterleavedMessage.into());
            }
            (control, _) => return Err(FrameError::NotData(control).into()),
        };

        let size = self.buf.len() + frame.payload.len();
        if size > self.max_message_size {
            return Err(WsError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }

        if !frame.fin {
            self.current = Some(opcode);
            self.buf.extend_from_slice(&frame.payload);
            return Ok(None);
        }

        self.current = None;
        let payload = if self.buf.is_empty() {
            frame.payload
        } else {
            self.buf.extend_from_slice(&frame.payload);
            self.buf.split().freeze()
        };

        let message = match opcode {
            OpCode::Text => {
                let text = String::from_utf8(payload.into()).map_err(|_| WsError::InvalidUtf8)?;
                Message::Text(text)
            }
            _ => Message::Binary(payload),
        };
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_text() {
        let mut asm = Assembler::new(1024);
        assert_eq!(
            asm.push(Frame::text("hello")).unwrap(),
            Some(Message::Text("hello".into()))
        );
    }

    #[test]
    fn fragments_concatenate() {
        let mut asm = Assembler::new(1024);
        assert_eq!(asm.push(Frame::new(false, OpCode::Binary, "ab")).unwrap(), None);
        assert_eq!(asm.push(Frame::new(false, OpCode::Continuation, "cd")).unwrap(), None);
        assert_eq!(
            asm.push(Frame::new(true, OpCode::Continuation, "ef")).unwrap(),
            Some(Message::Binary(Bytes::from_static(b"abcdef")))
        );
        // ready for the next message
        assert_eq!(
            asm.push(Frame::text("next")).unwrap(),
            Some(Message::Text("next".into()))
        );
    }

    #[test]
    fn utf8_checked_on_the_whole_message() {
        // "é" split across two fragments
        let mut asm = Assembler::new(1024);
        assert_eq!(asm.push(Frame::new(false, OpCode::Text, vec![0xC3])).unwrap(), None);
        assert_eq!(
            asm.push(Frame::new(true, OpCode::Continuation, vec![0xA9])).unwrap(),
            Some(Message::Text("é".into()))
        );

        let mut asm = Assembler::new(1024);
        assert!(matches!(
            asm.push(Frame::text(vec![0xff, 0xfe])),
            Err(WsError::InvalidUtf8)
        ));
    }

    #[test]
    fn continuation_without_a_message_is_invalid() {
        let mut asm = Assembler::new(1024);
        assert!(matches!(
            asm.push(Frame::new(true, OpCode::Continuation, "x")),
            Err(WsError::InvalidFrame(FrameError::UnexpectedContinuation))
        ));
    }

    #[test]
    fn new_message_inside_a_fragmented_one_is_invalid() {
        let mut asm = Assembler::new(1024);
        asm.push(Frame::new(false, OpCode::Text, "a")).unwrap();
        assert!(matches!(
            asm.push(Frame::binary("b")),
            Err(WsError::InvalidFrame(FrameError::InterleavedMessage))
        ));
    }

    #[test]
    fn control_frames_are_refused() {
        let mut asm = Assembler::new(1024);
        asm.push(Frame::new(false, OpCode::Text, "a")).unwrap();
        assert!(matches!(
            asm.push(Frame::ping("p")),
            Err(WsError::InvalidFrame(FrameError::NotData(OpCode::Ping)))
        ));
    }

    #[test]
    fn enforces_message_limit_across_fragments() {
        let mut asm = Assembler::new(4);
        asm.push(Frame::new(false, OpCode::Binary, "abc")).unwrap();
        assert!(matches!(
            asm.push(Frame::new(true, OpCode::Continuation, "de")),
            Err(WsError::MessageTooLarge { size: 5, max: 4 })
        ));
    }
}
