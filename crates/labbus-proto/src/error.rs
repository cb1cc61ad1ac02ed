//! Error types for packet encoding and decoding.
//!
//! Framing violations (an unexpected byte after `DLE` inside a frame) never
//! reach this type — the destuffer recovers from those silently by
//! discarding its partial buffer (see [`crate::frame::Destuffer`]). Only
//! malformed *packet* bodies produce an error here.

use thiserror::Error;

/// Errors raised while decoding a [`crate::packet::Packet`] from a frame
/// payload, or while constructing one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// The frame payload was too short to contain even a code and a format
    /// byte.
    #[error("frame too short: need at least 2 bytes, got {actual}")]
    FrameTooShort {
        /// Number of bytes actually present.
        actual: usize,
    },

    /// The low two bits of an extended format byte did not map to a known
    /// length encoding.
    #[error("invalid length encoding bits: {0:#04b}")]
    InvalidLengthEncoding(u8),

    /// The checksum byte at the end of the frame did not match the value
    /// computed over the preceding bytes.
    #[error("checksum mismatch: frame says {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch {
        /// Checksum byte read from the frame.
        expected: u8,
        /// Checksum computed over the frame by the decoder.
        computed: u8,
    },
}

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, PacketError>;
