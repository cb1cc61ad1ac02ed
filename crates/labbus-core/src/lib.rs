//! Bus coordinator and device abstraction for the lab-bench instrument
//! protocol, built on top of `labbus-proto`.
//!
//! Scheduling model: single-threaded cooperative on the host-facing API. A
//! dedicated background task runs the reader loop; everything else —
//! function execution, message dispatch — executes on whichever task calls
//! `execute`/`send`, or on the reader task for inbound routing. There is no
//! worker pool.

pub mod bus;
pub mod device;
pub mod error;
pub mod function;
pub mod identification;
pub mod message;
pub mod pipe;

pub use bus::{Bus, BusConfig};
pub use device::{Device, DeviceConfig, DeviceProfile, ErrorTable};
pub use error::{BusError, DeviceError, ErrorTranslator, ProtocolErrorCode};
pub use function::DeviceFunction;
pub use identification::{DeviceIdentification, Ping};
pub use message::{typed_handler, DeviceMessage, MessageHandler};
pub use pipe::{BytePipe, PipeError};
