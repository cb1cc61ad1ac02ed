//! Packet codec: the decoded body of one frame.
//!
//! A [`Packet`] carries an opcode, a body of exactly `length` bytes, and
//! optionally an address and a checksum. Whether a packet is *extended*
//! (carries an address/checksum/wide length encoding) is derived, never
//! stored independently — see [`Packet::extended`].

use crate::checksum;
use crate::error::{PacketError, Result};

/// Opcode threshold: `code < 128` is a function-class packet, `code >= 128`
/// is a message-class packet.
pub const FUNCTION_CODE_LIMIT: u8 = 128;

/// Reserved opcode for NAK/error responses to the currently executing
/// function.
pub const NAK_CODE: u8 = 0x00;

const EXTENDED_BIT: u8 = 0x80;
const LENGTH_ENCODING_MASK: u8 = 0x03;
const CHECKSUM_MASK: u8 = 0x0C;
const ADDRESS_ENABLED_BIT: u8 = 0x10;

/// The wire width used to encode a packet's body length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// One byte, for bodies up to 255 bytes (used for non-extended packets
    /// up to 127 bytes too, via the plain format byte).
    Uint8,
    /// Two bytes, little-endian, for bodies up to 65535 bytes.
    Uint16,
    /// Four bytes, little-endian, for larger bodies.
    Uint32,
}

impl LengthEncoding {
    /// The encoding that fits `length` using the smallest available width.
    #[must_use]
    pub fn smallest_for(length: usize) -> Self {
        if length > usize::from(u16::MAX) {
            Self::Uint32
        } else if length > usize::from(u8::MAX) {
            Self::Uint16
        } else {
            Self::Uint8
        }
    }

    /// Number of bytes this encoding occupies on the wire.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }

    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x00 => Ok(Self::Uint8),
            0x01 => Ok(Self::Uint16),
            0x02 => Ok(Self::Uint32),
            other => Err(PacketError::InvalidLengthEncoding(other)),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Uint8 => 0x00,
            Self::Uint16 => 0x01,
            Self::Uint32 => 0x02,
        }
    }
}

/// Checksum algorithm applied to an extended packet's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// No checksum byte.
    None,
    /// Sum of all preceding bytes, truncated to one byte.
    Additive,
    /// CRC-8/CCITT over all preceding bytes.
    Crc8Ccitt,
}

impl ChecksumAlgorithm {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0x04 => Self::Additive,
            0x08 => Self::Crc8Ccitt,
            _ => Self::None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Additive => 0x04,
            Self::Crc8Ccitt => 0x08,
        }
    }

    fn compute(self, frame_minus_checksum: &[u8]) -> u8 {
        match self {
            Self::None => 0,
            Self::Additive => checksum::additive(frame_minus_checksum),
            Self::Crc8Ccitt => checksum::crc8_ccitt(frame_minus_checksum),
        }
    }
}

/// The decoded body of one frame.
///
/// `body` is always exactly `length` bytes. Typed accessors (`get_byte`,
/// `insert_uint16`, ...) read and write within `body`; callers are expected
/// to size the packet for the fields they intend to access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    code: u8,
    length_encoding: LengthEncoding,
    checksum_algorithm: ChecksumAlgorithm,
    /// Peripheral address; `0` means "not addressed".
    pub address: u8,
    /// When `true`, multi-byte accessors byte-swap the serialized form.
    pub reverse_endianity: bool,
    body: Vec<u8>,
}

impl Packet {
    /// Construct a new packet with a zero-filled body of `length` bytes.
    #[must_use]
    pub fn new(code: u8, length: usize, checksum_algorithm: ChecksumAlgorithm) -> Self {
        Self {
            code,
            length_encoding: LengthEncoding::smallest_for(length),
            checksum_algorithm,
            address: 0,
            reverse_endianity: false,
            body: vec![0u8; length],
        }
    }

    /// Opcode.
    #[must_use]
    pub fn code(&self) -> u8 {
        self.code
    }

    /// `true` if `code < 128` (a function-class packet).
    #[must_use]
    pub fn is_function(&self) -> bool {
        self.code < FUNCTION_CODE_LIMIT
    }

    /// `true` if `code == 0x00` (reserved NAK/error-response opcode).
    #[must_use]
    pub fn is_nak(&self) -> bool {
        self.code == NAK_CODE
    }

    /// Body length in bytes.
    #[must_use]
    pub fn length(&self) -> usize {
        self.body.len()
    }

    /// `true` if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// The length encoding this packet would serialize with.
    #[must_use]
    pub fn length_encoding(&self) -> LengthEncoding {
        self.length_encoding
    }

    /// The checksum algorithm this packet was constructed with.
    #[must_use]
    pub fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.checksum_algorithm
    }

    /// `true` if `address != 0`.
    #[must_use]
    pub fn address_enabled(&self) -> bool {
        self.address != 0
    }

    /// `true` iff this packet requires the extended format byte: a nonzero
    /// address, a checksum, a length encoding wider than `Uint8`, or a body
    /// of 128 bytes or more.
    #[must_use]
    pub fn extended(&self) -> bool {
        self.address_enabled()
            || !matches!(self.checksum_algorithm, ChecksumAlgorithm::None)
            || !matches!(self.length_encoding, LengthEncoding::Uint8)
            || self.body.len() >= usize::from(FUNCTION_CODE_LIMIT)
    }

    /// Read-only view of the body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize this packet to its wire representation:
    /// `code | format | length_bytes | [address] | body | [checksum]`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        if !self.extended() {
            let mut out = Vec::with_capacity(2 + self.body.len());
            out.push(self.code);
            #[allow(clippy::cast_possible_truncation)]
            out.push(self.body.len() as u8);
            out.extend_from_slice(&self.body);
            return out;
        }

        let mut out = Vec::with_capacity(
            2 + self.length_encoding.width() + usize::from(self.address_enabled()) + self.body.len() + 1,
        );
        out.push(self.code);
        out.push(
            EXTENDED_BIT
                | self.length_encoding.bits()
                | self.checksum_algorithm.bits()
                | if self.address_enabled() { ADDRESS_ENABLED_BIT } else { 0 },
        );
        push_length(&mut out, self.length_encoding, self.body.len());
        if self.address_enabled() {
            out.push(self.address);
        }
        out.extend_from_slice(&self.body);

        if !matches!(self.checksum_algorithm, ChecksumAlgorithm::None) {
            let computed = self.checksum_algorithm.compute(&out);
            out.push(computed);
        }

        out
    }

    /// Decode a packet from a destuffed frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::FrameTooShort`] if `frame` has fewer than two
    /// bytes, [`PacketError::InvalidLengthEncoding`] if an extended format
    /// byte's length-encoding bits don't map to a known width, and
    /// [`PacketError::ChecksumMismatch`] if a present checksum doesn't match
    /// the value recomputed over the frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < 2 {
            return Err(PacketError::FrameTooShort { actual: frame.len() });
        }

        let code = frame[0];
        let format = frame[1];

        if format & EXTENDED_BIT == 0 {
            let length = usize::from(format);
            let body_start = 2;
            let body = frame.get(body_start..body_start + length).unwrap_or(&[]).to_vec();
            return Ok(Self {
                code,
                length_encoding: LengthEncoding::Uint8,
                checksum_algorithm: ChecksumAlgorithm::None,
                address: 0,
                reverse_endianity: false,
                body,
            });
        }

        let length_encoding = LengthEncoding::from_bits(format & LENGTH_ENCODING_MASK)?;
        let checksum_algorithm = ChecksumAlgorithm::from_bits(format & CHECKSUM_MASK);
        let address_enabled = format & ADDRESS_ENABLED_BIT != 0;

        let mut offset = 2;
        let length = read_length(frame, length_encoding, offset)?;
        offset += length_encoding.width();

        let address = if address_enabled {
            let byte = *frame.get(offset).ok_or(PacketError::FrameTooShort { actual: frame.len() })?;
            offset += 1;
            byte
        } else {
            0
        };

        let body = frame
            .get(offset..offset + length)
            .ok_or(PacketError::FrameTooShort { actual: frame.len() })?
            .to_vec();
        offset += length;

        if !matches!(checksum_algorithm, ChecksumAlgorithm::None) {
            let expected = *frame.get(offset).ok_or(PacketError::FrameTooShort { actual: frame.len() })?;
            let computed = checksum_algorithm.compute(&frame[..offset]);
            if expected != computed {
                return Err(PacketError::ChecksumMismatch { expected, computed });
            }
        }

        Ok(Self {
            code,
            length_encoding,
            checksum_algorithm,
            address,
            reverse_endianity: false,
            body,
        })
    }

    fn swap_if_reversed(&self, mut bytes: Vec<u8>) -> Vec<u8> {
        if self.reverse_endianity {
            bytes.reverse();
        }
        bytes
    }

    /// Read a single byte at `pos`.
    #[must_use]
    pub fn get_byte(&self, pos: usize) -> u8 {
        self.body[pos]
    }

    /// Write a single byte at `pos`.
    pub fn insert_byte(&mut self, pos: usize, value: u8) {
        self.body[pos] = value;
    }

    /// Read a boolean at `pos` (`0` is `false`, anything else is `true`).
    #[must_use]
    pub fn get_bool(&self, pos: usize) -> bool {
        self.body[pos] != 0
    }

    /// Write a boolean at `pos`.
    pub fn insert_bool(&mut self, pos: usize, value: bool) {
        self.body[pos] = u8::from(value);
    }

    /// Read a little-endian (or byte-swapped, per `reverse_endianity`)
    /// `u16` at `pos`.
    #[must_use]
    pub fn get_uint16(&self, pos: usize) -> u16 {
        let raw = self.swap_if_reversed(self.body[pos..pos + 2].to_vec());
        u16::from_le_bytes([raw[0], raw[1]])
    }

    /// Write a `u16` at `pos`.
    pub fn insert_uint16(&mut self, pos: usize, value: u16) {
        let encoded = self.swap_if_reversed(value.to_le_bytes().to_vec());
        self.body[pos..pos + 2].copy_from_slice(&encoded);
    }

    /// Read a signed `i16` at `pos`.
    #[must_use]
    pub fn get_int16(&self, pos: usize) -> i16 {
        self.get_uint16(pos) as i16
    }

    /// Write a signed `i16` at `pos`.
    pub fn insert_int16(&mut self, pos: usize, value: i16) {
        self.insert_uint16(pos, value as u16);
    }

    /// Read a `u32` at `pos`.
    #[must_use]
    pub fn get_uint32(&self, pos: usize) -> u32 {
        let raw = self.swap_if_reversed(self.body[pos..pos + 4].to_vec());
        u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
    }

    /// Write a `u32` at `pos`.
    pub fn insert_uint32(&mut self, pos: usize, value: u32) {
        let encoded = self.swap_if_reversed(value.to_le_bytes().to_vec());
        self.body[pos..pos + 4].copy_from_slice(&encoded);
    }

    /// Read a fixed-width ASCII string of `width` bytes at `pos`, trimming
    /// trailing NUL padding.
    #[must_use]
    pub fn get_string(&self, pos: usize, width: usize) -> String {
        let raw = &self.body[pos..pos + width];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Write `value` as a fixed-width ASCII string of `width` bytes at
    /// `pos`, truncating if longer and NUL-padding if shorter.
    pub fn insert_string(&mut self, pos: usize, width: usize, value: &str) {
        let bytes = value.as_bytes();
        let copy_len = bytes.len().min(width);
        self.body[pos..pos + copy_len].copy_from_slice(&bytes[..copy_len]);
        for slot in &mut self.body[pos + copy_len..pos + width] {
            *slot = 0;
        }
    }
}

fn push_length(out: &mut Vec<u8>, encoding: LengthEncoding, length: usize) {
    match encoding {
        #[allow(clippy::cast_possible_truncation)]
        LengthEncoding::Uint8 => out.push(length as u8),
        #[allow(clippy::cast_possible_truncation)]
        LengthEncoding::Uint16 => out.extend_from_slice(&(length as u16).to_le_bytes()),
        #[allow(clippy::cast_possible_truncation)]
        LengthEncoding::Uint32 => out.extend_from_slice(&(length as u32).to_le_bytes()),
    }
}

fn read_length(frame: &[u8], encoding: LengthEncoding, offset: usize) -> Result<usize> {
    let width = encoding.width();
    let slice =
        frame.get(offset..offset + width).ok_or(PacketError::FrameTooShort { actual: frame.len() })?;
    Ok(match encoding {
        LengthEncoding::Uint8 => usize::from(slice[0]),
        LengthEncoding::Uint16 => usize::from(u16::from_le_bytes([slice[0], slice[1]])),
        LengthEncoding::Uint32 => {
            u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]) as usize
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_extended_roundtrip() {
        let mut pkt = Packet::new(0x10, 4, ChecksumAlgorithm::None);
        pkt.insert_uint16(0, 0x1234);
        pkt.insert_uint16(2, 0x5678);

        let bytes = pkt.to_bytes();
        assert!(!pkt.extended());
        assert_eq!(bytes[0], 0x10);
        assert_eq!(bytes[1], 4);

        let decoded = Packet::from_frame(&bytes).unwrap();
        assert_eq!(decoded.code(), 0x10);
        assert_eq!(decoded.get_uint16(0), 0x1234);
        assert_eq!(decoded.get_uint16(2), 0x5678);
    }

    #[test]
    fn extended_with_address_and_additive_checksum_roundtrips() {
        let mut pkt = Packet::new(0x05, 3, ChecksumAlgorithm::Additive);
        pkt.address = 0x07;
        pkt.insert_byte(0, 0xAA);
        pkt.insert_byte(1, 0xBB);
        pkt.insert_byte(2, 0xCC);

        assert!(pkt.extended());
        let bytes = pkt.to_bytes();

        let decoded = Packet::from_frame(&bytes).unwrap();
        assert_eq!(decoded.address, 0x07);
        assert_eq!(decoded.body(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(decoded.checksum_algorithm(), ChecksumAlgorithm::Additive);
    }

    #[test]
    fn extended_with_crc8_checksum_roundtrips() {
        let mut pkt = Packet::new(0x05, 2, ChecksumAlgorithm::Crc8Ccitt);
        pkt.insert_byte(0, 0x11);
        pkt.insert_byte(1, 0x22);

        let bytes = pkt.to_bytes();
        let decoded = Packet::from_frame(&bytes).unwrap();
        assert_eq!(decoded.body(), &[0x11, 0x22]);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let pkt = Packet::new(0x05, 1, ChecksumAlgorithm::Additive);
        let mut bytes = pkt.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let err = Packet::from_frame(&bytes).unwrap_err();
        assert!(matches!(err, PacketError::ChecksumMismatch { .. }));
    }

    #[test]
    fn frame_too_short_is_rejected() {
        let err = Packet::from_frame(&[0x01]).unwrap_err();
        assert!(matches!(err, PacketError::FrameTooShort { actual: 1 }));
    }

    #[test]
    fn invalid_length_encoding_is_rejected() {
        // Extended bit set, length-encoding bits 0b11 is not a valid width.
        let err = Packet::from_frame(&[0x05, 0x83, 0x00]).unwrap_err();
        assert!(matches!(err, PacketError::InvalidLengthEncoding(0x03)));
    }

    #[test]
    fn length_beyond_127_forces_extended_but_encoding_stays_uint8_through_255() {
        let pkt = Packet::new(0x01, 200, ChecksumAlgorithm::None);
        assert!(pkt.extended());
        assert_eq!(pkt.length_encoding(), LengthEncoding::Uint8);
    }

    #[test]
    fn length_beyond_255_forces_uint16_encoding() {
        let pkt = Packet::new(0x01, 300, ChecksumAlgorithm::None);
        assert!(pkt.extended());
        assert_eq!(pkt.length_encoding(), LengthEncoding::Uint16);
    }

    #[test]
    fn string_accessor_pads_and_truncates() {
        let mut pkt = Packet::new(0x01, 8, ChecksumAlgorithm::None);
        pkt.insert_string(0, 8, "hi");
        assert_eq!(pkt.get_string(0, 8), "hi");
        assert_eq!(pkt.body(), &[b'h', b'i', 0, 0, 0, 0, 0, 0]);

        pkt.insert_string(0, 4, "toolong");
        assert_eq!(pkt.get_string(0, 4), "tool");
    }

    #[test]
    fn reverse_endianity_byte_swaps_multibyte_accessors() {
        let mut pkt = Packet::new(0x01, 2, ChecksumAlgorithm::None);
        pkt.reverse_endianity = true;
        pkt.insert_uint16(0, 0x1234);
        assert_eq!(pkt.body(), &[0x12, 0x34]);
        assert_eq!(pkt.get_uint16(0), 0x1234);
    }

    #[test]
    fn is_function_and_nak_classification() {
        assert!(Packet::new(0x05, 0, ChecksumAlgorithm::None).is_function());
        assert!(!Packet::new(0x80, 0, ChecksumAlgorithm::None).is_function());
        assert!(Packet::new(NAK_CODE, 0, ChecksumAlgorithm::None).is_nak());
    }
}
