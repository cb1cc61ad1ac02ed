//! Standard functions every device gets for free: identification and ping.
//!
//! Both opcodes below are placeholder defaults — a concrete device is free
//! to override them by constructing the function with an explicit code via
//! `with_code`; only `0x00` is reserved by the protocol.

use std::time::Duration;

use labbus_proto::Packet;

use crate::function::DeviceFunction;

/// Default opcode for [`DeviceIdentification`].
pub const FUNCTION_IDENTIFICATION: u8 = 0x01;

/// Default opcode for [`Ping`].
pub const FUNCTION_PING: u8 = 0x02;

/// Zero-argument function whose response body is captured verbatim, for a
/// concrete [`crate::device::DeviceProfile`] to interpret in
/// `is_compatible`.
#[derive(Debug)]
pub struct DeviceIdentification {
    code: u8,
    identification_bytes: Vec<u8>,
    transmission_time: Duration,
}

impl Default for DeviceIdentification {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIdentification {
    /// Construct with the default identification opcode (`0x01`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_code(FUNCTION_IDENTIFICATION)
    }

    /// Construct with a device-specific override opcode.
    #[must_use]
    pub fn with_code(code: u8) -> Self {
        Self { code, identification_bytes: Vec::new(), transmission_time: Duration::ZERO }
    }

    /// Response body, captured verbatim.
    #[must_use]
    pub fn identification_bytes(&self) -> &[u8] {
        &self.identification_bytes
    }

    /// Wall-clock time the executor spent waiting for this request.
    #[must_use]
    pub fn transmission_time(&self) -> Duration {
        self.transmission_time
    }
}

impl DeviceFunction for DeviceIdentification {
    fn code(&self) -> u8 {
        self.code
    }

    fn encode_request(&self, _address: u8) -> Vec<u8> {
        Vec::new()
    }

    fn set_response(&mut self, packet: Packet) {
        self.identification_bytes = packet.body().to_vec();
    }

    fn set_transmission_time(&mut self, elapsed: Duration) {
        self.transmission_time = elapsed;
    }
}

/// Zero-argument function whose response body's first byte is a counter.
///
/// `Device::ping` executes this and mirrors the original's "ping never
/// raises, returns -1 on failure" contract with `Option<u8>` instead of a
/// sentinel value.
#[derive(Debug)]
pub struct Ping {
    code: u8,
    count: u8,
}

impl Default for Ping {
    fn default() -> Self {
        Self::new()
    }
}

impl Ping {
    /// Construct with the default ping opcode (`0x02`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_code(FUNCTION_PING)
    }

    /// Construct with a device-specific override opcode.
    #[must_use]
    pub fn with_code(code: u8) -> Self {
        Self { code, count: 0 }
    }

    /// The counter byte from the response body.
    #[must_use]
    pub fn count(&self) -> u8 {
        self.count
    }
}

impl DeviceFunction for Ping {
    fn code(&self) -> u8 {
        self.code
    }

    fn encode_request(&self, _address: u8) -> Vec<u8> {
        Vec::new()
    }

    fn set_response(&mut self, packet: Packet) {
        self.count = packet.body().first().copied().unwrap_or(0);
    }
}
