//! In-memory loopback `BytePipe` test double.
//!
//! Two clones of [`LoopbackPipe`] share the same pair of byte queues: one is
//! handed to a [`labbus_core::Bus`], the other stays with the test as a
//! stand-in for the simulated peripheral — push bytes with
//! [`LoopbackPipe::push_inbound`] to simulate a device response, or drain
//! [`LoopbackPipe::take_outbound`] to inspect what the bus transmitted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use labbus_core::{BytePipe, PipeError};

#[derive(Clone)]
pub struct LoopbackPipe {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<VecDeque<u8>>>,
    open: Arc<AtomicBool>,
}

impl LoopbackPipe {
    pub fn new_pair() -> (Self, Self) {
        let pipe = Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            outbound: Arc::new(Mutex::new(VecDeque::new())),
            open: Arc::new(AtomicBool::new(false)),
        };
        let handle = pipe.clone();
        (pipe, handle)
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.lock().expect("inbound mutex poisoned").extend(bytes.iter().copied());
    }

    pub fn take_outbound(&self) -> Vec<u8> {
        self.outbound.lock().expect("outbound mutex poisoned").drain(..).collect()
    }
}

impl BytePipe for LoopbackPipe {
    fn open(&mut self) -> Result<(), PipeError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), PipeError> {
        if !self.is_open() {
            return Err(PipeError::NotOpen);
        }
        self.outbound.lock().expect("outbound mutex poisoned").extend(bytes.iter().copied());
        Ok(())
    }

    fn read_nonblocking(&mut self, max_bytes: usize) -> Result<Vec<u8>, PipeError> {
        if !self.is_open() {
            return Err(PipeError::NotOpen);
        }
        let mut guard = self.inbound.lock().expect("inbound mutex poisoned");
        let take = max_bytes.min(guard.len());
        Ok(guard.drain(..take).collect())
    }
}
