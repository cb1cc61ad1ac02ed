//! Error types for the bus coordinator and device layer.
//!
//! We avoid raw strings for protocol-level failures to keep error handling
//! typed end to end; only the peripheral-supplied and translated error
//! strings remain `String` since their content is device-specific.

use thiserror::Error;

use crate::pipe::PipeError;

/// Errors raised by [`crate::bus::Bus`] operations.
#[derive(Error, Debug)]
pub enum BusError {
    /// No response arrived for the current function within `timeout_ms`.
    #[error("peripheral not responding")]
    PeripheralNotResponding,

    /// The device returned a NAK (opcode `0x00`) for the current function.
    #[error("function not acknowledged: {message} (code {error_code:#04x})")]
    FunctionNotAcknowledged {
        /// Peripheral error code from the NAK body.
        error_code: u8,
        /// Human-readable translation of `error_code`.
        message: String,
    },

    /// Misuse of the bus API: duplicate message registration, a null
    /// argument, or similar caller error.
    #[error("usage error: {0}")]
    Usage(String),

    /// The underlying byte pipe failed.
    #[error(transparent)]
    Transport(#[from] PipeError),
}

impl BusError {
    /// Peripheral error code carried by a [`BusError::FunctionNotAcknowledged`],
    /// if this is that variant.
    #[must_use]
    pub fn error_code(&self) -> Option<u8> {
        match self {
            Self::FunctionNotAcknowledged { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }
}

/// Errors raised by [`crate::device::Device`] operations.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The connected peripheral failed its compatibility check.
    #[error("incompatible device: {0}")]
    Incompatible(String),

    /// An error from the underlying bus, propagated after retries are
    /// exhausted.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Translates a peripheral error code from a NAK packet into a
/// human-readable string.
///
/// This is the non-owning handle the bus holds to resolve error strings
/// without owning the device that defines them, breaking the bus/device
/// cyclic reference: a device builds a small `ErrorTranslator` implementor
/// first and hands it to `Bus::new`, then assembles itself around the bus.
pub trait ErrorTranslator: Send + Sync {
    /// Translate `error_code` into a human-readable string.
    fn translate(&self, error_code: u8) -> String;
}

/// Generic protocol error codes understood by every device, before
/// delegating to peripheral-specific codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCode {
    /// `0x00`: no error.
    NoError,
    /// `0x01`: the peripheral did not recognize the requested function.
    UnknownFunction,
    /// `0x02`: the request body was invalid for the function.
    InvalidContent,
}

impl ProtocolErrorCode {
    /// Map a raw error code to a known protocol-level code, if any.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::NoError),
            0x01 => Some(Self::UnknownFunction),
            0x02 => Some(Self::InvalidContent),
            _ => None,
        }
    }

    /// The human-readable string for this protocol-level code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoError => "No error (0x00)",
            Self::UnknownFunction => "Unknown function (0x01)",
            Self::InvalidContent => "Invalid content (0x02)",
        }
    }
}
