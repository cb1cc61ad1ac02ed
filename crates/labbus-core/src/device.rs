//! `Device`: owns a bus and adds retry policy, identification/compatibility
//! checking, and error-string translation.

use std::sync::Arc;

use crate::bus::{Bus, BusConfig};
use crate::error::{BusError, DeviceError, ErrorTranslator, ProtocolErrorCode};
use crate::function::DeviceFunction;
use crate::identification::{DeviceIdentification, Ping};
use crate::message::{DeviceMessage, MessageHandler};
use crate::pipe::BytePipe;

/// Device-level configuration.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Number of attempts `Device::execute` makes before giving up.
    pub retries: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { retries: 1 }
    }
}

/// Device-specific knowledge the generic `Device` type delegates to:
/// compatibility checking and peripheral error-code translation.
pub trait DeviceProfile: Send + Sync {
    /// Decide whether the connected peripheral is compatible, given a
    /// completed identification exchange.
    fn is_compatible(&self, identification: &DeviceIdentification) -> bool;

    /// Translate a peripheral-specific error code into a human-readable
    /// string. Only called for codes outside the generic protocol range
    /// (`0x00`-`0x02`).
    fn get_peripheral_error_string(&self, error_code: u8) -> String;
}

/// Two-stage error-code lookup shared between [`Bus`] (via
/// [`ErrorTranslator`]) and [`Device::get_error_string`]: generic protocol
/// codes are resolved directly, everything else is delegated to the
/// profile.
pub struct ErrorTable<Prof: DeviceProfile> {
    profile: Arc<Prof>,
}

impl<Prof: DeviceProfile> ErrorTable<Prof> {
    /// Wrap `profile` for error-code resolution.
    #[must_use]
    pub fn new(profile: Arc<Prof>) -> Self {
        Self { profile }
    }

    /// Resolve `error_code` to a human-readable string.
    #[must_use]
    pub fn resolve(&self, error_code: u8) -> String {
        match ProtocolErrorCode::from_code(error_code) {
            Some(code) => code.as_str().to_string(),
            None => self.profile.get_peripheral_error_string(error_code),
        }
    }
}

impl<Prof: DeviceProfile> ErrorTranslator for ErrorTable<Prof> {
    fn translate(&self, error_code: u8) -> String {
        self.resolve(error_code)
    }
}

/// A device: a bus plus retry policy, identification/compatibility
/// checking, and the peripheral's own error-code vocabulary.
pub struct Device<P: BytePipe, Prof: DeviceProfile> {
    bus: Bus<P>,
    profile: Arc<Prof>,
    error_table: Arc<ErrorTable<Prof>>,
    config: DeviceConfig,
    current_address: Option<u8>,
    functions: Vec<Box<dyn DeviceFunction>>,
}

impl<P: BytePipe, Prof: DeviceProfile + 'static> Device<P, Prof> {
    /// Build a device around `pipe` and `profile`.
    ///
    /// Constructs the `ErrorTable` (the device's error-translating handle)
    /// before the bus, then hands the bus an `Arc<dyn ErrorTranslator>` at
    /// construction — resolving the bus/device cyclic reference from
    /// `spec.md` §9 without either side owning the other.
    #[must_use]
    pub fn new(pipe: P, profile: Prof, bus_config: BusConfig, device_config: DeviceConfig) -> Self {
        let profile = Arc::new(profile);
        let error_table = Arc::new(ErrorTable::new(Arc::clone(&profile)));
        let translator: Arc<dyn ErrorTranslator> = Arc::clone(&error_table) as Arc<dyn ErrorTranslator>;
        let bus = Bus::new(pipe, translator, bus_config);

        Self {
            bus,
            profile,
            error_table,
            config: device_config,
            current_address: None,
            functions: Vec::new(),
        }
    }

    /// `true` if the underlying bus is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.bus.is_open()
    }

    /// Open the bus if not already open.
    ///
    /// # Errors
    ///
    /// Propagates [`BusError`] from the underlying pipe.
    pub async fn open(&self) -> Result<(), DeviceError> {
        if self.bus.is_open() {
            return Ok(());
        }
        self.bus.open().await.map_err(DeviceError::from)
    }

    /// Close the bus if open.
    pub async fn close(&self) {
        if self.bus.is_open() {
            self.bus.close().await;
        }
    }

    /// Set the peripheral address used for subsequent `execute`/`send`
    /// calls. `None` means unaddressed.
    pub fn set_address(&mut self, address: Option<u8>) {
        self.current_address = address;
    }

    /// Execute `function` with the device's retry policy: up to
    /// `config.retries` attempts, re-raising the last attempt's error.
    ///
    /// # Errors
    ///
    /// Returns the final attempt's [`BusError`], wrapped in
    /// [`DeviceError::Bus`].
    pub async fn execute(&self, function: &mut dyn DeviceFunction) -> Result<(), DeviceError> {
        let mut last_error: Option<BusError> = None;

        for attempt in 0..self.config.retries {
            match self.bus.execute(function, self.current_address).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let is_last = attempt + 1 == self.config.retries;
                    last_error = Some(err);
                    if is_last {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(err) => Err(DeviceError::Bus(err)),
            None => Ok(()),
        }
    }

    /// Send `message`, fire-and-forget, at the device's current address.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Bus`] if the pipe is open but the write
    /// fails.
    pub async fn send(&self, message: &mut dyn DeviceMessage) -> Result<(), DeviceError> {
        self.bus.send(message, self.current_address).await.map_err(DeviceError::from)
    }

    /// Register a handler for an unsolicited message code.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Bus`] if `code` is already registered.
    pub fn add_message(&self, code: u8, handler: MessageHandler) -> Result<(), DeviceError> {
        self.bus.add_message(code, handler).map_err(DeviceError::from)
    }

    /// Register a function prototype for introspection. Does not execute
    /// it.
    pub fn add_function(&mut self, function: Box<dyn DeviceFunction>) {
        self.functions.push(function);
    }

    /// Function prototypes registered via `add_function`.
    #[must_use]
    pub fn functions(&self) -> &[Box<dyn DeviceFunction>] {
        &self.functions
    }

    /// Translate `error_code` to a human-readable string: generic protocol
    /// codes (`0x00`-`0x02`) are resolved directly, everything else
    /// delegates to the profile.
    #[must_use]
    pub fn get_error_string(&self, error_code: u8) -> String {
        self.error_table.resolve(error_code)
    }

    /// Ping the connected device. Returns `None` on any failure, mirroring
    /// the original's "ping never raises" contract via `Option` instead of
    /// a sentinel.
    pub async fn ping(&self) -> Option<u8> {
        let mut ping = Ping::new();
        match self.execute(&mut ping).await {
            Ok(()) => Some(ping.count()),
            Err(_) => None,
        }
    }

    /// Execute a standard identification function, then delegate to
    /// `profile.is_compatible`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Incompatible`] if the profile rejects the
    /// identification response, or propagates the execution error.
    pub async fn identify_and_check(&self) -> Result<DeviceIdentification, DeviceError> {
        let mut identification = DeviceIdentification::new();
        self.execute(&mut identification).await?;

        if self.profile.is_compatible(&identification) {
            Ok(identification)
        } else {
            Err(DeviceError::Incompatible(format!(
                "identification bytes {:?} rejected by profile",
                identification.identification_bytes()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolErrorCode;

    struct AlwaysCompatible;

    impl DeviceProfile for AlwaysCompatible {
        fn is_compatible(&self, _identification: &DeviceIdentification) -> bool {
            true
        }

        fn get_peripheral_error_string(&self, error_code: u8) -> String {
            format!("peripheral error {error_code:#04x}")
        }
    }

    #[test]
    fn error_table_resolves_generic_codes_before_delegating() {
        let table = ErrorTable::new(Arc::new(AlwaysCompatible));

        assert_eq!(table.resolve(0x00), ProtocolErrorCode::NoError.as_str());
        assert_eq!(table.resolve(0x01), ProtocolErrorCode::UnknownFunction.as_str());
        assert_eq!(table.resolve(0x02), ProtocolErrorCode::InvalidContent.as_str());
        assert_eq!(table.resolve(0x55), "peripheral error 0x55");
    }
}
