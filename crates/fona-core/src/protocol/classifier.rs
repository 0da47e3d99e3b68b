//! Unsolicited result code classification
//!
//! Every framed line passes through [`Classifier::classify`] before it can reach
//! the response queue. Spontaneous notifications are turned into events and
//! swallowed; headers that announce a raw body arm the framer's capture mode but
//! still reach the command that asked for them.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use super::fields::{split_fields, unquote};
use crate::events::{
    CallerIdEvent, HttpCompletedEvent, RingingEvent, SmsArrivedEvent, UnsolicitedEvent,
};
use crate::types::{AddressType, SmsStorage};

const RING: &str = "RING";
const CALLER_ID_PREFIX: &str = "+CLIP: ";
const SMS_ARRIVED_PREFIX: &str = "+CMTI: ";
/// `AT+CMGL` list entry header
pub const LIST_SMS_PREFIX: &str = "+CMGL: ";
/// `AT+CMGR` read header
pub const READ_SMS_PREFIX: &str = "+CMGR: ";
/// `AT+HTTPACTION` completion
pub const HTTP_ACTION_PREFIX: &str = "+HTTPACTION: ";
/// `AT+HTTPREAD` body header
pub const HTTP_READ_PREFIX: &str = "+HTTPREAD: ";

/// Text-mode field holding `<length>` in a `+CMGL` header with `AT+CSDH=1`:
/// index, stat, oa, alpha, scts, tooa, length
const LIST_SMS_LENGTH_FIELD: usize = 6;
/// Text-mode field holding `<length>` in a `+CMGR` header with `AT+CSDH=1`:
/// stat, oa, alpha, scts, tooa, fo, pid, dcs, sca, tosca, length
const READ_SMS_LENGTH_FIELD: usize = 10;

/// Upper bound on a declared body length. The SIM800 buffers at most
/// 319 488 bytes of HTTP data and an SMS is far smaller, so anything above
/// this is line noise.
pub const MAX_BODY_LENGTH: usize = 512 * 1024;

/// Status lines the modem emits on its own that carry nothing we act on
const BENIGN_PREFIXES: &[&str] = &[
    "+SAPBR:",
    "+CPIN:",
    "+PDP:",
    "+CTZV:",
    "*PSUTTZ:",
    "Call Ready",
    "SMS Ready",
    "DST:",
];

/// What to do with a framed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not a notification; append to the response queue
    Unhandled,
    /// Append to the response queue and capture the next `n` raw bytes as a body
    Capture(usize),
    /// Swallow without raising anything
    Consumed,
    /// Swallow and raise this event
    Event(UnsolicitedEvent),
    /// An HTTP request finished successfully; its body must be fetched with
    /// `AT+HTTPREAD` outside the I/O path
    FetchHttpBody {
        /// HTTP status code
        status: u16,
        /// Declared body length
        length: usize,
    },
}

impl Classification {
    /// True when the line must not reach the response queue
    pub fn is_handled(&self) -> bool {
        !matches!(self, Classification::Unhandled | Classification::Capture(_))
    }
}

/// Recognises unsolicited notifications in the line stream
#[derive(Debug, Default)]
pub struct Classifier {
    /// Ring indicator pin is wired, so `RING` text must not raise a second event
    hardware_ring: bool,
    /// Set while an `AT+CLIP=` command is in flight; its reply looks like the
    /// unsolicited caller id line
    suppress_caller_id: AtomicBool,
}

impl Classifier {
    /// Create a classifier; `hardware_ring` disables text based ring events
    pub fn new(hardware_ring: bool) -> Self {
        Self {
            hardware_ring,
            suppress_caller_id: AtomicBool::new(false),
        }
    }

    /// Suppress caller id events until the returned guard is dropped
    pub fn suppress_caller_id(&self) -> CallerIdSuppression<'_> {
        self.suppress_caller_id.store(true, Ordering::SeqCst);
        CallerIdSuppression { classifier: self }
    }

    /// True while caller id suppression is active
    pub fn caller_id_suppressed(&self) -> bool {
        self.suppress_caller_id.load(Ordering::SeqCst)
    }

    /// Classify one framed line. First match wins.
    pub fn classify(&self, line: &str) -> Classification {
        if line.eq_ignore_ascii_case(RING) {
            if self.hardware_ring {
                return Classification::Consumed;
            }
            return Classification::Event(UnsolicitedEvent::Ringing(RingingEvent {
                at: Utc::now(),
            }));
        }

        if let Some(payload) = line.strip_prefix(CALLER_ID_PREFIX) {
            if self.caller_id_suppressed() {
                return Classification::Consumed;
            }
            return caller_id(payload);
        }

        if let Some(payload) = line.strip_prefix(SMS_ARRIVED_PREFIX) {
            return sms_arrived(payload);
        }

        if let Some(payload) = line.strip_prefix(LIST_SMS_PREFIX) {
            return body_length(payload, LIST_SMS_LENGTH_FIELD);
        }

        if let Some(payload) = line.strip_prefix(READ_SMS_PREFIX) {
            return body_length(payload, READ_SMS_LENGTH_FIELD);
        }

        if let Some(payload) = line.strip_prefix(HTTP_ACTION_PREFIX) {
            return http_action(payload);
        }

        if let Some(payload) = line.strip_prefix(HTTP_READ_PREFIX) {
            return body_length(payload, 0);
        }

        if BENIGN_PREFIXES.iter().any(|p| line.starts_with(p)) {
            return Classification::Consumed;
        }

        Classification::Unhandled
    }
}

/// Clears caller id suppression on drop, including on early error returns
pub struct CallerIdSuppression<'a> {
    classifier: &'a Classifier,
}

impl Drop for CallerIdSuppression<'_> {
    fn drop(&mut self) {
        self.classifier
            .suppress_caller_id
            .store(false, Ordering::SeqCst);
    }
}

fn caller_id(payload: &str) -> Classification {
    let fields = split_fields(payload);
    // `AT+CLIP?` answers `+CLIP: <n>,<m>`; the notification quotes the number
    if !fields[0].starts_with('"') {
        return Classification::Unhandled;
    }
    if fields.len() < 2 {
        tracing::warn!("Ignoring short caller id line: {}", payload);
        return Classification::Consumed;
    }
    match unquote(fields[1]).parse::<u16>() {
        Ok(code) => Classification::Event(UnsolicitedEvent::CallerId(CallerIdEvent {
            number: unquote(fields[0]).to_string(),
            address_type: AddressType::from_code(code),
        })),
        Err(_) => {
            tracing::warn!("Ignoring caller id with bad address type: {}", payload);
            Classification::Consumed
        }
    }
}

fn sms_arrived(payload: &str) -> Classification {
    let fields = split_fields(payload);
    if fields.len() < 2 {
        tracing::warn!("Ignoring short SMS notification: {}", payload);
        return Classification::Consumed;
    }
    match fields[1].parse::<u32>() {
        Ok(index) => Classification::Event(UnsolicitedEvent::SmsArrived(SmsArrivedEvent {
            storage: SmsStorage::from_code(unquote(fields[0])),
            index,
        })),
        Err(_) => {
            tracing::warn!("Ignoring SMS notification with bad index: {}", payload);
            Classification::Consumed
        }
    }
}

fn body_length(payload: &str, index: usize) -> Classification {
    let fields = split_fields(payload);
    match fields.get(index).map(|f| f.parse::<usize>()) {
        Some(Ok(length)) if length > MAX_BODY_LENGTH => {
            tracing::warn!("Ignoring implausible body length {}: {}", length, payload);
            Classification::Unhandled
        }
        Some(Ok(length)) => Classification::Capture(length),
        Some(Err(_)) => {
            tracing::warn!("Body length field is not a number: {}", payload);
            Classification::Unhandled
        }
        None => Classification::Unhandled,
    }
}

fn http_action(payload: &str) -> Classification {
    let fields = split_fields(payload);
    if fields.len() < 3 {
        tracing::warn!("Ignoring short HTTP action line: {}", payload);
        return Classification::Consumed;
    }
    let (Ok(status), Ok(length)) = (fields[1].parse::<u16>(), fields[2].parse::<usize>()) else {
        tracing::warn!("Ignoring unparsable HTTP action line: {}", payload);
        return Classification::Consumed;
    };
    if length > MAX_BODY_LENGTH {
        tracing::warn!("HTTP body of {} bytes is too large to fetch", length);
        return Classification::Event(UnsolicitedEvent::HttpCompleted(HttpCompletedEvent {
            status,
            body: None,
        }));
    }
    if status >= 400 {
        return Classification::Event(UnsolicitedEvent::HttpCompleted(HttpCompletedEvent {
            status,
            body: None,
        }));
    }
    Classification::FetchHttpBody { status, length }
}
