//! The `DeviceFunction` contract: a request/response transaction with
//! opcode `< 128`.

use std::time::Duration;

use labbus_proto::Packet;

/// A request/response transaction executed on a [`crate::bus::Bus`].
///
/// A function object is typically one-shot: populated with request
/// parameters, executed, inspected for its response, and discarded.
/// `Bus::execute` drives the lifecycle: `on_send()`, transmit
/// `encode_request`, wait for completion, then `set_response()` followed by
/// `on_received()` on success.
pub trait DeviceFunction: Send {
    /// Opcode for this function (shared between request and response).
    fn code(&self) -> u8;

    /// Serialize this function's request parameters into a packet body for
    /// `address` (`0` means unaddressed).
    fn encode_request(&self, address: u8) -> Vec<u8>;

    /// Called immediately before the request is transmitted.
    fn on_send(&mut self) {}

    /// Store the response packet. Called once, on a successful (non-NAK,
    /// non-timeout) completion.
    fn set_response(&mut self, packet: Packet);

    /// Called after `set_response`, once the response has been stored.
    fn on_received(&mut self) {}

    /// Wall-clock time the executor spent waiting for this function's
    /// response. Populated by the executor (`Bus`/`Device`), not by the
    /// function itself.
    fn set_transmission_time(&mut self, elapsed: Duration) {
        let _ = elapsed;
    }
}
