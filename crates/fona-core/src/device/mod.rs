//! FONA device session
//!
//! Ties the protocol engine, the unsolicited classifier and the event
//! dispatcher together, and layers the AT command vocabulary on top.

mod commands;
mod gprs;
mod http;
mod sms;

use std::sync::{Arc, Weak};
use std::thread;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use crate::events::{
    CallerIdEvent, EventDispatcher, EventSender, HttpCompletedEvent, RingingEvent,
    SmsArrivedEvent, UnsolicitedEvent,
};
use crate::hardware::{HardwareControl, NoHardware};
use crate::protocol::classifier::HTTP_READ_PREFIX;
use crate::protocol::fields::{field, parse_number};
use crate::protocol::{Classification, Classifier, CommandEngine, ProtocolError, Routing, OK};
use crate::transport::{ByteSink, SerialTransport, Transport};

const AT: &str = "AT";
const ECHO_OFF_COMMAND: &str = "ATE0";
const HTTP_READ_COMMAND: &str = "AT+HTTPREAD";

/// Bring-up progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Not reset yet, or the last reset failed
    Uninitialized,
    /// Probing with `AT` so the modem can lock onto the baud rate
    Synchronizing,
    /// Turning command echo off
    EchoDisabling,
    /// Echo is off; replies can be parsed reliably
    Ready,
}

struct DeviceInner {
    engine: CommandEngine,
    classifier: Classifier,
    events: EventDispatcher,
    hardware: Box<dyn HardwareControl>,
    config: DeviceConfig,
    state: Mutex<SessionState>,
}

impl DeviceInner {
    /// Runs on the transport's I/O thread for every delivery
    fn receive(self: &Arc<Self>, bytes: &[u8]) {
        let mut fetches = Vec::new();

        self.engine
            .link()
            .ingest(bytes, |line| match self.classifier.classify(line) {
                Classification::Unhandled => Routing::Queue,
                Classification::Capture(len) => {
                    tracing::debug!("Capturing {} byte body after '{}'", len, line);
                    Routing::QueueAndCapture(len)
                }
                Classification::Consumed => {
                    tracing::debug!("Ignoring unsolicited line: {}", line);
                    Routing::Drop
                }
                Classification::Event(event) => {
                    self.events.enqueue(event);
                    Routing::Drop
                }
                Classification::FetchHttpBody { status, length } => {
                    fetches.push((status, length));
                    Routing::Drop
                }
            });

        for (status, length) in fetches {
            self.spawn_http_fetch(status, length);
        }
    }

    /// Read an HTTP response body off the I/O thread. The fetch needs the
    /// command lock, which the caller that triggered the request may still hold.
    fn spawn_http_fetch(self: &Arc<Self>, status: u16, length: usize) {
        if length == 0 {
            self.events
                .enqueue(UnsolicitedEvent::HttpCompleted(HttpCompletedEvent {
                    status,
                    body: Some(Vec::new()),
                }));
            return;
        }

        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("fona-http-read".to_string())
            .spawn(move || {
                let body = match inner.fetch_http_body() {
                    Ok(body) => Some(body),
                    Err(e) => {
                        tracing::error!("Failed to read HTTP response body: {}", e);
                        None
                    }
                };
                inner
                    .events
                    .enqueue(UnsolicitedEvent::HttpCompleted(HttpCompletedEvent { status, body }));
            });

        if let Err(e) = spawned {
            tracing::error!("Could not start HTTP body fetch: {}", e);
            self.events
                .enqueue(UnsolicitedEvent::HttpCompleted(HttpCompletedEvent { status, body: None }));
        }
    }

    fn fetch_http_body(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut exchange = self.engine.send(HTTP_READ_COMMAND)?;
        exchange.set_timeout(self.config.http_timeout());
        exchange.read_prefixed(HTTP_READ_PREFIX, false)?;
        let body = exchange.next_body()?;
        exchange.expect(OK)?;
        Ok(body)
    }

    fn set_state(&self, state: SessionState) {
        tracing::debug!("Session state -> {:?}", state);
        *self.state.lock() = state;
    }
}

/// Hands transport deliveries to the device without keeping it alive
struct InputSink(Weak<DeviceInner>);

impl ByteSink for InputSink {
    fn on_bytes(&self, bytes: &[u8]) {
        if let Some(inner) = self.0.upgrade() {
            inner.receive(bytes);
        }
    }
}

/// Raises ring events from a hardware ring indicator interrupt
#[derive(Clone)]
pub struct RingNotifier {
    events: EventSender,
}

impl RingNotifier {
    /// Report that the ring indicator line fired
    pub fn notify(&self) {
        self.events.enqueue(UnsolicitedEvent::Ringing(RingingEvent { at: Utc::now() }));
    }
}

/// A session with a FONA (SIM800 family) cellular module
pub struct FonaDevice {
    inner: Arc<DeviceInner>,
}

impl FonaDevice {
    /// Create a session over `transport` with no GPIO control
    pub fn new(transport: Box<dyn Transport>, config: DeviceConfig) -> Result<Self, ProtocolError> {
        Self::with_hardware(transport, Box::new(NoHardware), config)
    }

    /// Create a session with GPIO capabilities. Ring detection switches to the
    /// hardware path when `hardware` reports a wired ring indicator.
    pub fn with_hardware(
        transport: Box<dyn Transport>,
        hardware: Box<dyn HardwareControl>,
        config: DeviceConfig,
    ) -> Result<Self, ProtocolError> {
        let events = EventDispatcher::start()?;
        let classifier = Classifier::new(hardware.ring_indicator_enabled());
        let inner = Arc::new(DeviceInner {
            engine: CommandEngine::new(transport, config.command_timeout()),
            classifier,
            events,
            hardware,
            config,
            state: Mutex::new(SessionState::Uninitialized),
        });

        inner
            .engine
            .start(Arc::new(InputSink(Arc::downgrade(&inner))))?;
        Ok(Self { inner })
    }

    /// Open the serial port named in `config` and create a session on it
    pub fn open_serial(config: DeviceConfig) -> Result<Self, ProtocolError> {
        let transport = SerialTransport::open(&config.port_name, config.baud_rate)?;
        Self::new(Box::new(transport), config)
    }

    /// Current bring-up state
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Session configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// The underlying command engine, for commands this type has no wrapper for
    pub fn engine(&self) -> &CommandEngine {
        &self.inner.engine
    }

    /// Handle for a ring indicator interrupt handler
    pub fn ring_notifier(&self) -> RingNotifier {
        RingNotifier {
            events: self.inner.events.sender(),
        }
    }

    /// Reset the module and synchronise with it.
    ///
    /// Must be called at least once so the modem can autobaud to the host's
    /// rate. Probe failures are expected while the modem locks on and are
    /// ignored; only the final echo-off command must succeed.
    pub fn reset(&self) -> Result<(), ProtocolError> {
        let inner = &self.inner;
        let config = &inner.config;
        inner.set_state(SessionState::Synchronizing);

        match inner.hardware.reset() {
            Ok(()) => tracing::debug!("Hardware reset pulsed"),
            Err(ProtocolError::NotSupported(_)) => tracing::debug!("No reset line, soft reset only"),
            Err(e) => tracing::warn!("Hardware reset failed: {}", e),
        }

        if let Err(e) = inner.engine.discard_buffered_input() {
            inner.set_state(SessionState::Uninitialized);
            return Err(e);
        }

        for attempt in 1..=config.sync_attempts {
            match inner.engine.send_and_expect(AT, OK, config.sync_timeout(), &[]) {
                Ok(()) => {
                    tracing::debug!("Autobaud probe {} answered", attempt);
                    thread::sleep(config.settle_delay());
                }
                Err(e @ (ProtocolError::Timeout | ProtocolError::ProtocolMismatch { .. })) => {
                    tracing::debug!("Autobaud probe {} failed: {}", attempt, e);
                }
                Err(e) => {
                    inner.set_state(SessionState::Uninitialized);
                    return Err(e);
                }
            }
        }

        inner.set_state(SessionState::EchoDisabling);
        let timeout = config.command_timeout();
        match inner.engine.send_and_expect(ECHO_OFF_COMMAND, OK, timeout, &[]) {
            Ok(()) => thread::sleep(config.settle_delay()),
            Err(e @ (ProtocolError::Timeout | ProtocolError::ProtocolMismatch { .. })) => {
                tracing::warn!("First echo-off attempt failed: {}", e);
            }
            Err(e) => {
                inner.set_state(SessionState::Uninitialized);
                return Err(e);
            }
        }

        if let Err(e) = inner.engine.send_and_expect(ECHO_OFF_COMMAND, OK, timeout, &[]) {
            inner.set_state(SessionState::Uninitialized);
            return Err(ProtocolError::Fatal(Box::new(e)));
        }

        inner.set_state(SessionState::Ready);
        tracing::info!("Modem synchronised, echo disabled");
        Ok(())
    }

    /// Register the incoming call callback
    pub fn on_ringing<F>(&self, callback: F)
    where
        F: Fn(&RingingEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on_ringing(callback);
    }

    /// Register the caller id callback
    pub fn on_caller_id<F>(&self, callback: F)
    where
        F: Fn(&CallerIdEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on_caller_id(callback);
    }

    /// Register the new SMS callback. Requires [`FonaDevice::set_sms_notification`].
    pub fn on_sms_received<F>(&self, callback: F)
    where
        F: Fn(&SmsArrivedEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on_sms_received(callback);
    }

    /// Register the HTTP completion callback
    pub fn on_http_response<F>(&self, callback: F)
    where
        F: Fn(&HttpCompletedEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.on_http_response(callback);
    }

    // Shorthands for the vocabulary modules

    fn command(&self, command: &str) -> Result<(), ProtocolError> {
        self.inner
            .engine
            .send_and_expect(command, OK, self.inner.config.command_timeout(), &[])
    }

    /// Send `command`, read one `prefix`ed reply, then require `OK`
    fn query(&self, command: &str, prefix: &str, quoted: bool) -> Result<String, ProtocolError> {
        let mut exchange = self.inner.engine.send(command)?;
        let reply = exchange.read_prefixed(prefix, quoted)?;
        exchange.expect(OK)?;
        Ok(reply)
    }

    fn query_fields(&self, command: &str, prefix: &str) -> Result<Vec<String>, ProtocolError> {
        let mut exchange = self.inner.engine.send(command)?;
        let fields = exchange.read_fields(prefix)?;
        exchange.expect(OK)?;
        Ok(fields)
    }

    /// Numeric field `index` of a `prefix`ed reply
    fn query_number<T: std::str::FromStr>(
        &self,
        command: &str,
        prefix: &str,
        index: usize,
    ) -> Result<T, ProtocolError> {
        let fields = self.query_fields(command, prefix)?;
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        parse_number(command, field(command, &refs, index)?)
    }

    /// Settings reported as `0`/`1` in the first field
    fn query_flag(&self, command: &str, prefix: &str) -> Result<bool, ProtocolError> {
        Ok(self.query_number::<u32>(command, prefix, 0)? != 0)
    }
}

impl Drop for FonaDevice {
    fn drop(&mut self) {
        self.inner.engine.stop();
    }
}
