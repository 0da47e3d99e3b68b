//! Byte transport abstraction
//!
//! The protocol engine only needs three things from the link: write bytes, be
//! told when bytes arrive, and throw away whatever is buffered. Anything that
//! can do that (a serial port, a TCP bridge, a scripted test modem) can drive
//! a [`crate::FonaDevice`].

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serialport::SerialPort;

use crate::protocol::serial::{clear_input, open_port};
use crate::protocol::ProtocolError;

/// Receives bytes as they arrive from the transport
pub trait ByteSink: Send + Sync {
    /// Called once per delivery, from whatever thread the transport reads on.
    /// Chunk boundaries carry no meaning.
    fn on_bytes(&self, bytes: &[u8]);
}

/// A bidirectional byte link to the modem
pub trait Transport: Send {
    /// Begin delivering received bytes to `sink`
    fn start(&mut self, sink: Arc<dyn ByteSink>) -> Result<(), ProtocolError>;

    /// Write all of `bytes`
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Drop anything received but not yet delivered
    fn discard_input(&mut self) -> Result<(), ProtocolError>;

    /// Stop delivering bytes. Called when the device is dropped.
    fn stop(&mut self) {}
}

struct ReaderThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Serial port transport with a dedicated reader thread
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    reader: Option<ReaderThread>,
}

impl SerialTransport {
    /// Wrap an already opened port. The port's read timeout bounds how quickly
    /// the reader notices `stop`.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port, reader: None }
    }

    /// Open `name` at `baud_rate` (8N1)
    pub fn open(name: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        Ok(Self::new(open_port(name, Some(baud_rate))?))
    }
}

impl Transport for SerialTransport {
    fn start(&mut self, sink: Arc<dyn ByteSink>) -> Result<(), ProtocolError> {
        if self.reader.is_some() {
            return Ok(());
        }

        let mut port = self
            .port
            .try_clone()
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("fona-serial-rx".to_string())
            .spawn(move || {
                let mut buf = [0u8; 512];
                while !reader_stop.load(Ordering::Relaxed) {
                    match port.read(&mut buf) {
                        Ok(0) => continue,
                        Ok(n) => sink.on_bytes(&buf[..n]),
                        Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::error!("Serial read failed: {}", e);
                            break;
                        }
                    }
                }
                tracing::debug!("Serial reader thread exiting");
            })?;

        self.reader = Some(ReaderThread { stop, handle });
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), ProtocolError> {
        clear_input(self.port.as_mut())
    }

    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop.store(true, Ordering::Relaxed);
            let _ = reader.handle.join();
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
