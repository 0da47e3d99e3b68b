//! Scripted modem shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fona_core::hardware::HardwareControl;
use fona_core::transport::{ByteSink, Transport};
use fona_core::{DeviceConfig, FonaDevice, ProtocolError};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Maps a written command to the chunks the modem sends back
pub type Responder = Box<dyn FnMut(&str) -> Vec<Vec<u8>> + Send>;

/// Test-side view of a [`ScriptedModem`]
#[derive(Clone, Default)]
pub struct ModemHandle {
    written: Arc<Mutex<Vec<String>>>,
    sink: Arc<Mutex<Option<Arc<dyn ByteSink>>>>,
    discards: Arc<AtomicUsize>,
}

impl ModemHandle {
    /// Commands written so far, without terminators
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// Deliver bytes as if the modem sent them unprompted
    pub fn inject(&self, bytes: &[u8]) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_bytes(bytes);
        }
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

/// Answers each command synchronously from inside `write`
pub struct ScriptedModem {
    handle: ModemHandle,
    responder: Responder,
}

impl ScriptedModem {
    pub fn new(responder: Responder) -> (Self, ModemHandle) {
        let handle = ModemHandle::default();
        (
            Self {
                handle: handle.clone(),
                responder,
            },
            handle,
        )
    }
}

impl Transport for ScriptedModem {
    fn start(&mut self, sink: Arc<dyn ByteSink>) -> Result<(), ProtocolError> {
        *self.handle.sink.lock() = Some(sink);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let command = String::from_utf8_lossy(bytes).trim_end().to_string();
        self.handle.written.lock().push(command.clone());
        let chunks = (self.responder)(&command);
        let sink = self.handle.sink.lock().clone();
        if let Some(sink) = sink {
            for chunk in chunks {
                sink.on_bytes(&chunk);
            }
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), ProtocolError> {
        self.handle.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fixed replies per command; anything else gets `ERROR`
pub fn table(replies: &[(&str, &str)]) -> Responder {
    let replies: HashMap<String, Vec<u8>> = replies
        .iter()
        .map(|(command, reply)| (command.to_string(), reply.as_bytes().to_vec()))
        .collect();
    Box::new(move |command: &str| match replies.get(command) {
        Some(reply) => vec![reply.clone()],
        None => vec![b"ERROR\r\n".to_vec()],
    })
}

/// `OK` to everything
pub fn agreeable() -> Responder {
    Box::new(|_: &str| vec![b"OK\r\n".to_vec()])
}

/// Short timeouts so failure paths finish quickly
pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        command_timeout_ms: Some(300),
        sync_timeout_ms: 50,
        settle_delay_ms: 0,
        long_command_timeout_ms: 300,
        http_timeout_ms: 1_000,
        ..DeviceConfig::default()
    }
}

pub fn device(responder: Responder) -> (FonaDevice, ModemHandle) {
    device_with_config(responder, test_config())
}

/// Route library logs to the test harness; `RUST_LOG=fona_core=trace` shows the wire
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn device_with_config(responder: Responder, config: DeviceConfig) -> (FonaDevice, ModemHandle) {
    init_tracing();
    let (modem, handle) = ScriptedModem::new(responder);
    let fona = FonaDevice::new(Box::new(modem), config).unwrap();
    (fona, handle)
}

/// GPIO stand-in with a wired reset line and ring indicator
#[derive(Clone, Default)]
pub struct RecordingHardware {
    pub resets: Arc<AtomicUsize>,
}

impl HardwareControl for RecordingHardware {
    fn reset(&self) -> Result<(), ProtocolError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn ring_indicator_enabled(&self) -> bool {
        true
    }
}

pub fn device_with_hardware(
    responder: Responder,
    hardware: RecordingHardware,
) -> (FonaDevice, ModemHandle) {
    init_tracing();
    let (modem, handle) = ScriptedModem::new(responder);
    let fona =
        FonaDevice::with_hardware(Box::new(modem), Box::new(hardware), test_config()).unwrap();
    (fona, handle)
}
