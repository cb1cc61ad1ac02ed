//! The bus coordinator: single-outstanding-function execution, message
//! dispatch, and the reader task that drives both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use labbus_proto::packet::ChecksumAlgorithm;
use labbus_proto::{frame, Destuffer, Packet};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::error::{BusError, ErrorTranslator};
use crate::function::DeviceFunction;
use crate::message::{DeviceMessage, MessageHandler};
use crate::pipe::{BytePipe, PipeError};

/// Bus-level configuration.
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Time allowed for a function's response before `execute` fails with
    /// [`BusError::PeripheralNotResponding`].
    pub timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { timeout_ms: 500 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommState {
    Idle,
    Waiting,
    Completed,
    Error,
}

struct Inner {
    state: CommState,
    pending_response: Option<Packet>,
    pending_error: Option<BusError>,
}

impl Inner {
    fn new() -> Self {
        Self { state: CommState::Idle, pending_response: None, pending_error: None }
    }
}

fn recover<T>(poisoned: PoisonError<T>) -> T {
    poisoned.into_inner()
}

/// Single bus coordinator built on top of a [`BytePipe`].
///
/// Lives from [`Bus::open`] to [`Bus::close`]. At most one [`Bus::execute`]
/// call is in flight at any time — the exclusion primitive is a
/// [`tokio::sync::Mutex`] held for the duration of the call.
pub struct Bus<P: BytePipe> {
    pipe: Arc<StdMutex<P>>,
    inner: Arc<StdMutex<Inner>>,
    notify: Arc<Notify>,
    execute_lock: AsyncMutex<()>,
    dispatchers: Arc<StdMutex<HashMap<u8, MessageHandler>>>,
    error_translator: Arc<dyn ErrorTranslator>,
    config: BusConfig,
    reader_shutdown: Arc<AtomicBool>,
    reader_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl<P: BytePipe> Bus<P> {
    /// Construct a bus around `pipe`, not yet open.
    ///
    /// `error_translator` resolves peripheral error codes from NAK packets
    /// into human-readable strings; a device builds its translator before
    /// constructing the bus, which is how the bus/device cyclic reference
    /// from `spec.md` §9 is broken in this implementation.
    #[must_use]
    pub fn new(pipe: P, error_translator: Arc<dyn ErrorTranslator>, config: BusConfig) -> Self {
        Self {
            pipe: Arc::new(StdMutex::new(pipe)),
            inner: Arc::new(StdMutex::new(Inner::new())),
            notify: Arc::new(Notify::new()),
            execute_lock: AsyncMutex::new(()),
            dispatchers: Arc::new(StdMutex::new(HashMap::new())),
            error_translator,
            config,
            reader_shutdown: Arc::new(AtomicBool::new(false)),
            reader_handle: StdMutex::new(None),
        }
    }

    /// `true` if the underlying pipe is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.pipe.lock().unwrap_or_else(recover).is_open()
    }

    /// Open the underlying pipe and start the reader task.
    ///
    /// # Errors
    ///
    /// Propagates [`PipeError::OpenFailed`] from the pipe.
    pub async fn open(&self) -> Result<(), BusError> {
        if self.is_open() {
            return Ok(());
        }

        let pipe = Arc::clone(&self.pipe);
        tokio::task::spawn_blocking(move || pipe.lock().unwrap_or_else(recover).open())
            .await
            .map_err(|e| PipeError::OpenFailed(format!("open task panicked: {e}")))??;

        self.reader_shutdown.store(false, Ordering::SeqCst);
        let handle = tokio::spawn(Self::reader_loop(
            Arc::clone(&self.pipe),
            Arc::clone(&self.inner),
            Arc::clone(&self.notify),
            Arc::clone(&self.dispatchers),
            Arc::clone(&self.error_translator),
            Arc::clone(&self.reader_shutdown),
        ));
        *self.reader_handle.lock().unwrap_or_else(recover) = Some(handle);

        Ok(())
    }

    /// Close the pipe and stop the reader task. Idempotent: closing an
    /// already-closed bus is a no-op.
    ///
    /// Uses the "awaiting" shutdown variant: sets a cooperative flag the
    /// reader loop polls each iteration, then awaits its `JoinHandle` to
    /// completion rather than aborting it.
    pub async fn close(&self) {
        if !self.is_open() {
            return;
        }

        self.reader_shutdown.store(true, Ordering::SeqCst);

        let handle = self.reader_handle.lock().unwrap_or_else(recover).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let pipe = Arc::clone(&self.pipe);
        let _ = tokio::task::spawn_blocking(move || pipe.lock().unwrap_or_else(recover).close()).await;
    }

    /// Execute `function` against the bus: transmit its request, wait at
    /// most `timeout_ms`, then populate its response.
    ///
    /// At most one `execute` call is in flight on a given bus at any time.
    /// Regardless of outcome, the bus returns to `IDLE` before this call
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PeripheralNotResponding`] on timeout,
    /// [`BusError::FunctionNotAcknowledged`] on NAK, or
    /// [`BusError::Transport`] if the request could not be transmitted.
    pub async fn execute(
        &self,
        function: &mut dyn DeviceFunction,
        address: Option<u8>,
    ) -> Result<(), BusError> {
        let _permit = self.execute_lock.lock().await;

        function.on_send();
        let body = function.encode_request(address.unwrap_or(0));
        let packet = build_packet(function.code(), address, &body);
        let framed = frame::encode(&packet.to_bytes());

        {
            let mut inner = self.inner.lock().unwrap_or_else(recover);
            inner.state = CommState::Waiting;
            inner.pending_response = None;
            inner.pending_error = None;
        }

        let notified = self.notify.notified();
        let start = Instant::now();
        self.write_framed(framed).await?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let wait_result = tokio::time::timeout(timeout, notified).await;

        let outcome = {
            let mut inner = self.inner.lock().unwrap_or_else(recover);
            let outcome = if wait_result.is_err() {
                Err(BusError::PeripheralNotResponding)
            } else {
                match inner.state {
                    CommState::Completed => Ok(inner.pending_response.take()),
                    CommState::Error => {
                        Err(inner.pending_error.take().unwrap_or(BusError::PeripheralNotResponding))
                    }
                    CommState::Waiting | CommState::Idle => Err(BusError::PeripheralNotResponding),
                }
            };
            inner.state = CommState::Idle;
            inner.pending_response = None;
            inner.pending_error = None;
            outcome
        };

        let elapsed = start.elapsed();
        let response = outcome?;
        function.set_transmission_time(elapsed);
        if let Some(packet) = response {
            function.set_response(packet);
            function.on_received();
        }
        Ok(())
    }

    /// Best-effort, fire-and-forget transmission of `message`. A silent
    /// no-op if the bus is closed.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] if the pipe is open but the write
    /// fails.
    pub async fn send(
        &self,
        message: &mut dyn DeviceMessage,
        address: Option<u8>,
    ) -> Result<(), BusError> {
        if !self.is_open() {
            return Ok(());
        }

        message.on_send();
        let body = message.encode(address.unwrap_or(0));
        let packet = build_packet(message.code(), address, &body);
        let framed = frame::encode(&packet.to_bytes());
        self.write_framed(framed).await
    }

    /// Register a handler invoked for every inbound packet with a matching
    /// `code`. Each code may be registered at most once.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Usage`] if `code` is already registered.
    pub fn add_message(&self, code: u8, handler: MessageHandler) -> Result<(), BusError> {
        let mut dispatchers = self.dispatchers.lock().unwrap_or_else(recover);
        if dispatchers.contains_key(&code) {
            return Err(BusError::Usage(format!("message with code {code:#04x} already registered")));
        }
        dispatchers.insert(code, handler);
        Ok(())
    }

    async fn write_framed(&self, bytes: Vec<u8>) -> Result<(), BusError> {
        let pipe = Arc::clone(&self.pipe);
        let outcome: Result<(), PipeError> = tokio::task::spawn_blocking(move || {
            pipe.lock().unwrap_or_else(recover).write_bytes(&bytes)
        })
        .await
        .map_err(|e| PipeError::WriteFailed(format!("writer task panicked: {e}")))?;
        outcome?;
        Ok(())
    }

    async fn reader_loop(
        pipe: Arc<StdMutex<P>>,
        inner: Arc<StdMutex<Inner>>,
        notify: Arc<Notify>,
        dispatchers: Arc<StdMutex<HashMap<u8, MessageHandler>>>,
        error_translator: Arc<dyn ErrorTranslator>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut destuffer = Destuffer::new();

        while !shutdown.load(Ordering::SeqCst) {
            let pipe = Arc::clone(&pipe);
            let chunk = tokio::task::spawn_blocking(move || {
                pipe.lock().unwrap_or_else(recover).read_nonblocking(4096)
            })
            .await;

            let bytes = match chunk {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(error)) => {
                    tracing::warn!(%error, "pipe read failed, reader will retry");
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    continue;
                }
                Err(_) => break,
            };

            if bytes.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
                continue;
            }

            for frame_payload in destuffer.push_bytes(&bytes) {
                match Packet::from_frame(&frame_payload) {
                    Ok(packet) => {
                        route_packet(packet, &inner, &notify, &dispatchers, error_translator.as_ref());
                    }
                    Err(error) => {
                        tracing::debug!(%error, "dropping malformed packet");
                    }
                }
            }
        }
    }
}

fn build_packet(code: u8, address: Option<u8>, body: &[u8]) -> Packet {
    let mut packet = Packet::new(code, body.len(), ChecksumAlgorithm::None);
    for (i, &byte) in body.iter().enumerate() {
        packet.insert_byte(i, byte);
    }
    if let Some(address) = address {
        packet.address = address;
    }
    packet
}

fn route_packet(
    packet: Packet,
    inner: &Arc<StdMutex<Inner>>,
    notify: &Arc<Notify>,
    dispatchers: &Arc<StdMutex<HashMap<u8, MessageHandler>>>,
    error_translator: &dyn ErrorTranslator,
) {
    if packet.is_nak() {
        let error_code = packet.body().first().copied().unwrap_or(0);
        let message = error_translator.translate(error_code);
        let mut guard = inner.lock().unwrap_or_else(recover);
        if guard.state == CommState::Waiting {
            guard.pending_error = Some(BusError::FunctionNotAcknowledged { error_code, message });
            guard.state = CommState::Error;
            drop(guard);
            notify.notify_one();
        }
        return;
    }

    if packet.is_function() {
        let code = packet.code();
        let mut guard = inner.lock().unwrap_or_else(recover);
        if guard.state == CommState::Waiting {
            guard.pending_response = Some(packet);
            guard.state = CommState::Completed;
            drop(guard);
            notify.notify_one();
            tracing::debug!(code, "function response routed to waiting execute call");
        } else {
            tracing::debug!(code, "function response dropped: no execute call pending");
        }
        return;
    }

    let code = packet.code();
    let mut handlers = dispatchers.lock().unwrap_or_else(recover);
    if let Some(handler) = handlers.get_mut(&code) {
        handler(packet);
    } else {
        tracing::debug!(code, "unsolicited message dropped: no handler registered");
    }
}
