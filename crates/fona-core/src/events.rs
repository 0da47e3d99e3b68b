//! Unsolicited event delivery
//!
//! Events classified on the I/O thread are pushed onto a channel and delivered
//! to application callbacks by a single worker thread, so a slow or failing
//! callback never stalls the serial reader or an in-flight command.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{AddressType, SmsStorage};

/// An incoming call was detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingingEvent {
    /// When the ring was observed
    pub at: DateTime<Utc>,
}

/// Caller id presented for an incoming call. May be raised several times per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdEvent {
    /// Calling number as presented by the network
    pub number: String,
    /// Numbering plan of `number`
    pub address_type: AddressType,
}

/// A new SMS message was stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsArrivedEvent {
    /// Memory the message was stored in
    pub storage: SmsStorage,
    /// Storage index, pass to `FonaDevice::sms_message`
    pub index: u32,
}

/// Result of an HTTP request started with `FonaDevice::send_http_request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCompletedEvent {
    /// HTTP status code
    pub status: u16,
    /// Response body. Absent for error statuses and when the body fetch failed.
    pub body: Option<Vec<u8>>,
}

impl HttpCompletedEvent {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Everything the modem can tell us without being asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnsolicitedEvent {
    /// `RING`, or the ring indicator line
    Ringing(RingingEvent),
    /// `+CLIP`
    CallerId(CallerIdEvent),
    /// `+CMTI`
    SmsArrived(SmsArrivedEvent),
    /// `+HTTPACTION`, after the body has been fetched
    HttpCompleted(HttpCompletedEvent),
}

impl UnsolicitedEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            UnsolicitedEvent::Ringing(_) => "ringing",
            UnsolicitedEvent::CallerId(_) => "caller-id",
            UnsolicitedEvent::SmsArrived(_) => "sms-arrived",
            UnsolicitedEvent::HttpCompleted(_) => "http-completed",
        }
    }
}

type Callback<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// A callback bound to its event, ready to run without the table lock
type Delivery = Box<dyn FnOnce() -> anyhow::Result<()>>;

fn bind<E: 'static>(callback: &Callback<E>, event: E) -> Delivery {
    let callback = Arc::clone(callback);
    Box::new(move || callback(&event))
}

/// Registered application callbacks, at most one per event kind
#[derive(Default)]
pub struct EventHandlers {
    ringing: Option<Callback<RingingEvent>>,
    caller_id: Option<Callback<CallerIdEvent>>,
    sms_arrived: Option<Callback<SmsArrivedEvent>>,
    http_completed: Option<Callback<HttpCompletedEvent>>,
}

impl EventHandlers {
    /// Look up the callback for `event`. The returned closure owns its own
    /// reference, so it can run after the table lock is released.
    fn handler_for(&self, event: &UnsolicitedEvent) -> Option<Delivery> {
        match event.clone() {
            UnsolicitedEvent::Ringing(e) => Some(bind(self.ringing.as_ref()?, e)),
            UnsolicitedEvent::CallerId(e) => Some(bind(self.caller_id.as_ref()?, e)),
            UnsolicitedEvent::SmsArrived(e) => Some(bind(self.sms_arrived.as_ref()?, e)),
            UnsolicitedEvent::HttpCompleted(e) => Some(bind(self.http_completed.as_ref()?, e)),
        }
    }
}

enum DispatchMessage {
    Event(UnsolicitedEvent),
    Shutdown,
}

/// Cheap, clonable handle for enqueueing events from any thread
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<DispatchMessage>,
}

impl EventSender {
    /// Queue an event for delivery. Never blocks; events queued after the
    /// dispatcher has shut down are dropped.
    pub fn enqueue(&self, event: UnsolicitedEvent) {
        tracing::debug!("Enqueue {} event", event.kind());
        if self.tx.send(DispatchMessage::Event(event)).is_err() {
            tracing::debug!("Event dispatcher gone, dropping event");
        }
    }
}

/// Owns the dispatch worker thread and the callback table
pub struct EventDispatcher {
    sender: EventSender,
    handlers: Arc<RwLock<EventHandlers>>,
    worker: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Start the dispatch worker
    pub fn start() -> Result<Self, std::io::Error> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handlers = Arc::new(RwLock::new(EventHandlers::default()));
        let worker_handlers = Arc::clone(&handlers);

        let worker = thread::Builder::new()
            .name("fona-events".to_string())
            .spawn(move || dispatch_loop(rx, worker_handlers))?;

        Ok(Self {
            sender: EventSender { tx },
            handlers,
            worker: Some(worker),
        })
    }

    /// Handle for producers
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Queue an event for delivery
    pub fn enqueue(&self, event: UnsolicitedEvent) {
        self.sender.enqueue(event);
    }

    /// Register the callback for incoming calls, replacing any previous one
    pub fn on_ringing<F>(&self, callback: F)
    where
        F: Fn(&RingingEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().ringing = Some(Arc::new(callback));
    }

    /// Register the callback for caller id notifications
    pub fn on_caller_id<F>(&self, callback: F)
    where
        F: Fn(&CallerIdEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().caller_id = Some(Arc::new(callback));
    }

    /// Register the callback for newly stored SMS messages
    pub fn on_sms_received<F>(&self, callback: F)
    where
        F: Fn(&SmsArrivedEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().sms_arrived = Some(Arc::new(callback));
    }

    /// Register the callback for completed HTTP requests
    pub fn on_http_response<F>(&self, callback: F)
    where
        F: Fn(&HttpCompletedEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().http_completed = Some(Arc::new(callback));
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        let _ = self.sender.tx.send(DispatchMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            // A callback that drops the device would otherwise join itself
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn dispatch_loop(rx: Receiver<DispatchMessage>, handlers: Arc<RwLock<EventHandlers>>) {
    while let Ok(message) = rx.recv() {
        let event = match message {
            DispatchMessage::Event(event) => event,
            DispatchMessage::Shutdown => break,
        };

        // The table lock is released before the callback runs, so a callback
        // may register handlers itself
        let handler = handlers.read().handler_for(&event);
        let Some(handler) = handler else {
            tracing::trace!("No handler for {} event", event.kind());
            continue;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(handler));
        match outcome {
            Ok(Ok(())) => tracing::trace!("Delivered {} event", event.kind()),
            Ok(Err(e)) => tracing::error!("Handler for {} event failed: {:#}", event.kind(), e),
            Err(_) => tracing::error!("Handler for {} event panicked", event.kind()),
        }
    }
    tracing::debug!("Event dispatcher exiting");
}
