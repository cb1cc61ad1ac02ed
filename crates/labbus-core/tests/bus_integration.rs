//! End-to-end scenarios for the bus coordinator against an in-memory
//! loopback pipe.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use labbus_core::message::typed_handler;
use labbus_core::{Bus, BusConfig, BusError, DeviceFunction, ErrorTranslator};
use labbus_proto::packet::ChecksumAlgorithm;
use labbus_proto::{frame, Packet};
use support::LoopbackPipe;

struct StubTranslator;

impl ErrorTranslator for StubTranslator {
    fn translate(&self, error_code: u8) -> String {
        format!("stub error {error_code:#04x}")
    }
}

#[derive(Default)]
struct EchoFunction {
    code: u8,
    response: Vec<u8>,
}

impl EchoFunction {
    fn new(code: u8) -> Self {
        Self { code, response: Vec::new() }
    }
}

impl DeviceFunction for EchoFunction {
    fn code(&self) -> u8 {
        self.code
    }

    fn encode_request(&self, _address: u8) -> Vec<u8> {
        vec![0xAA]
    }

    fn set_response(&mut self, packet: Packet) {
        self.response = packet.body().to_vec();
    }
}

fn encode_function_response(code: u8, body: &[u8]) -> Vec<u8> {
    let mut packet = Packet::new(code, body.len(), ChecksumAlgorithm::None);
    for (i, &byte) in body.iter().enumerate() {
        packet.insert_byte(i, byte);
    }
    frame::encode(&packet.to_bytes())
}

fn encode_nak(error_code: u8) -> Vec<u8> {
    let mut packet = Packet::new(0x00, 1, ChecksumAlgorithm::None);
    packet.insert_byte(0, error_code);
    frame::encode(&packet.to_bytes())
}

async fn open_bus() -> (Bus<LoopbackPipe>, LoopbackPipe) {
    let (pipe, peripheral) = LoopbackPipe::new_pair();
    let bus = Bus::new(pipe, Arc::new(StubTranslator), BusConfig::default());
    bus.open().await.unwrap();
    (bus, peripheral)
}

#[tokio::test]
async fn execute_completes_when_response_arrives() {
    let (bus, peripheral) = open_bus().await;
    let mut function = EchoFunction::new(0x10);

    let responder = tokio::spawn({
        let peripheral = peripheral.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            peripheral.push_inbound(&encode_function_response(0x10, &[0x01, 0x02]));
        }
    });

    bus.execute(&mut function, None).await.unwrap();
    responder.await.unwrap();

    assert_eq!(function.response, vec![0x01, 0x02]);
    bus.close().await;
}

#[tokio::test]
async fn execute_surfaces_nak_as_function_not_acknowledged() {
    let (bus, peripheral) = open_bus().await;
    let mut function = EchoFunction::new(0x11);

    let responder = tokio::spawn({
        let peripheral = peripheral.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            peripheral.push_inbound(&encode_nak(0x05));
        }
    });

    let result = bus.execute(&mut function, None).await;
    responder.await.unwrap();

    match result {
        Err(BusError::FunctionNotAcknowledged { error_code, message }) => {
            assert_eq!(error_code, 0x05);
            assert_eq!(message, "stub error 0x05");
        }
        other => panic!("expected FunctionNotAcknowledged, got {other:?}"),
    }
    bus.close().await;
}

#[tokio::test(start_paused = true)]
async fn execute_times_out_then_recovers_on_next_call() {
    let (bus, peripheral) = open_bus().await;
    let mut function = EchoFunction::new(0x12);

    let result = bus.execute(&mut function, None).await;
    assert!(matches!(result, Err(BusError::PeripheralNotResponding)));

    // A subsequent call on the same bus must succeed once a response
    // arrives in time — the bus returns to IDLE after any outcome.
    let mut function = EchoFunction::new(0x12);
    let responder = tokio::spawn({
        let peripheral = peripheral.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            peripheral.push_inbound(&encode_function_response(0x12, &[0x09]));
        }
    });

    bus.execute(&mut function, None).await.unwrap();
    responder.await.unwrap();
    assert_eq!(function.response, vec![0x09]);

    bus.close().await;
}

#[tokio::test]
async fn registering_duplicate_message_code_fails() {
    let (bus, _peripheral) = open_bus().await;

    bus.add_message(0x80, typed_handler(|packet: &Packet| packet.body().to_vec(), |_body| {})).unwrap();

    let result = bus.add_message(0x80, typed_handler(|packet: &Packet| packet.body().to_vec(), |_body| {}));
    assert!(matches!(result, Err(BusError::Usage(_))));

    bus.close().await;
}

#[tokio::test]
async fn unsolicited_message_is_dispatched_exactly_once() {
    let (bus, peripheral) = open_bus().await;

    let received = Arc::new(AtomicBool::new(false));
    let received_clone = Arc::clone(&received);
    let call_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let call_count_clone = Arc::clone(&call_count);

    bus.add_message(
        0x80,
        typed_handler(
            |packet: &Packet| packet.body().to_vec(),
            move |body: Vec<u8>| {
                received_clone.store(true, Ordering::SeqCst);
                call_count_clone.fetch_add(1, Ordering::SeqCst);
                assert_eq!(body, vec![0x77]);
            },
        ),
    )
    .unwrap();

    peripheral.push_inbound(&encode_function_response(0x80, &[0x77]));

    // Give the reader task a chance to process the injected frame.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(received.load(Ordering::SeqCst));
    assert_eq!(call_count.load(Ordering::SeqCst), 1);

    bus.close().await;
}
