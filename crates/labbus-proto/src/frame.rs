//! Byte-stuffed frame delimiter: `DLE STX <stuffed body> DLE ETX`.
//!
//! [`Destuffer`] is a push-style state machine that recovers frame payloads
//! from a raw byte stream, one byte (or chunk) at a time. It owns no
//! payload-level semantics — turning a payload into a [`crate::packet::Packet`]
//! is the caller's job.

/// `DLE` (Data Link Escape).
pub const DLE: u8 = 0x10;
/// `STX` (Start of Text).
pub const STX: u8 = 0x02;
/// `ETX` (End of Text).
pub const ETX: u8 = 0x03;

/// Encode a payload into a framed byte sequence: `DLE STX <stuffed> DLE ETX`,
/// doubling every `DLE` byte found in `payload`.
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(DLE);
    out.push(STX);
    for &byte in payload {
        out.push(byte);
        if byte == DLE {
            out.push(DLE);
        }
    }
    out.push(DLE);
    out.push(ETX);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Hunt,
    ExpectStx,
    InFrame,
    Esc,
}

/// Recovers frame payloads from a raw byte stream.
///
/// Feed bytes with [`Destuffer::push_byte`] or [`Destuffer::push_bytes`]; a
/// completed frame is returned from the call that closes it. A framing
/// violation (anything other than `DLE`/`ETX` right after an in-frame `DLE`)
/// silently discards the partial buffer and returns to hunting for the next
/// `DLE STX` — it never surfaces as an error.
#[derive(Debug)]
pub struct Destuffer {
    state: State,
    buffer: Vec<u8>,
}

impl Default for Destuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Destuffer {
    /// Create a destuffer in the `HUNT` state with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { state: State::Hunt, buffer: Vec::new() }
    }

    /// Feed a single byte into the state machine.
    ///
    /// Returns `Some(payload)` when this byte completes a frame. The
    /// returned `Vec` is the destuffer's buffer for that frame; the internal
    /// buffer is cleared and ready for the next one.
    pub fn push_byte(&mut self, byte: u8) -> Option<Vec<u8>> {
        match self.state {
            State::Hunt => {
                if byte == DLE {
                    self.state = State::ExpectStx;
                }
                None
            }
            State::ExpectStx => {
                if byte == STX {
                    self.buffer.clear();
                    self.state = State::InFrame;
                } else {
                    self.state = State::Hunt;
                }
                None
            }
            State::InFrame => {
                if byte == DLE {
                    self.state = State::Esc;
                } else {
                    self.buffer.push(byte);
                }
                None
            }
            State::Esc => match byte {
                DLE => {
                    self.buffer.push(DLE);
                    self.state = State::InFrame;
                    None
                }
                ETX => {
                    self.state = State::Hunt;
                    Some(std::mem::take(&mut self.buffer))
                }
                _ => {
                    self.buffer.clear();
                    self.state = State::Hunt;
                    None
                }
            },
        }
    }

    /// Feed a chunk of bytes, returning every frame completed along the way
    /// in order.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if let Some(frame) = self.push_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }
}
