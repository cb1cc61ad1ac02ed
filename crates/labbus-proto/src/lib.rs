//! Wire format for the lab-bench instrument protocol: byte-stuffed framing
//! and the packet codec layered on top of it.
//!
//! This crate is synchronous and has no knowledge of any transport — see
//! `labbus-core` for the bus coordinator and device abstraction built on
//! top of it.

pub mod checksum;
pub mod error;
pub mod frame;
pub mod packet;

pub use error::{PacketError, Result};
pub use frame::Destuffer;
pub use packet::{ChecksumAlgorithm, LengthEncoding, Packet, FUNCTION_CODE_LIMIT, NAK_CODE};
