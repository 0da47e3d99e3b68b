//! AT command protocol engine
//!
//! Turns the raw serial byte stream into lines, separates unsolicited
//! notifications from command replies, and correlates each command with its
//! reply under a timeout.

pub mod classifier;
pub mod engine;
mod error;
pub mod fields;
pub mod framer;
pub mod serial;

pub use classifier::{CallerIdSuppression, Classification, Classifier};
pub use engine::{CommandEngine, Exchange, Link, Reply, Routing};
pub use error::ProtocolError;
pub use framer::{Frame, Framer};
pub use serial::open_port;

/// Default baud rate for the modem link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-reply timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Line terminator written after every command
pub const LINE_TERMINATOR: &str = "\r\n";

/// Final result code of a successful command
pub const OK: &str = "OK";
