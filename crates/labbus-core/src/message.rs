//! The `DeviceMessage` contract: an unsolicited packet with opcode `>= 128`.
//!
//! Inbound messages are routed by code through a per-code handler
//! registered with [`crate::bus::Bus::add_message`], rather than the
//! original's duck-typed `dispatch(listener)` call — see `spec.md` §9,
//! option (b): "a code→handler map on the bus where each handler parses its
//! own packet", chosen to avoid an open-world reflective dispatch that has
//! no idiomatic Rust equivalent.

use labbus_proto::Packet;

/// An outbound, fire-and-forget message sent with [`crate::bus::Bus::send`].
pub trait DeviceMessage: Send {
    /// Opcode for this message (`>= 128`).
    fn code(&self) -> u8;

    /// Serialize this message's payload into a packet body for `address`
    /// (`0` means unaddressed).
    fn encode(&self, address: u8) -> Vec<u8>;

    /// Called immediately before transmission.
    fn on_send(&mut self) {}
}

/// A handler invoked with every inbound packet matching a registered code.
pub type MessageHandler = Box<dyn FnMut(Packet) + Send>;

/// Build a [`MessageHandler`] that first parses the raw packet into `T`,
/// then dispatches the parsed value to a typed callback.
///
/// This is the composable replacement for the original's per-message
/// `create_dispatcher()` + `dispatch(listener)` pair: callers supply a
/// parse step and a handle step instead of implementing a dispatcher type.
pub fn typed_handler<T, P, H>(mut parse: P, mut on_message: H) -> MessageHandler
where
    P: FnMut(&Packet) -> T + Send + 'static,
    H: FnMut(T) + Send + 'static,
{
    Box::new(move |packet| {
        let value = parse(&packet);
        on_message(value);
    })
}
