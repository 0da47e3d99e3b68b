//! # fona-core
//!
//! Driver core for Adafruit FONA (SIMCom SIM800 family) cellular modules.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - AT command/response correlation with per-reply timeouts
//! - Line framing with byte-counted capture of SMS and HTTP bodies
//! - Unsolicited notification handling (ring, caller id, new SMS, HTTP completion)
//!   with events delivered in order on a dedicated thread
//! - Modem bring-up (autobaud synchronisation, echo off)
//! - Typed wrappers for SIM, network, battery, audio, call, SMS, GPRS and HTTP commands
//!
//! ## Example
//!
//! ```rust,ignore
//! use fona_core::{DeviceConfig, FonaDevice};
//!
//! let config = DeviceConfig {
//!     port_name: "/dev/ttyUSB0".to_string(),
//!     ..Default::default()
//! };
//! let fona = FonaDevice::open_serial(config)?;
//! fona.on_sms_received(|sms| {
//!     println!("New message at index {}", sms.index);
//!     Ok(())
//! });
//! fona.reset()?;
//! fona.set_sms_notification(true)?;
//! println!("IMEI {}", fona.imei()?);
//! ```

pub mod config;
pub mod device;
pub mod events;
pub mod hardware;
pub mod protocol;
pub mod transport;
pub mod types;

pub use config::DeviceConfig;
pub use device::{FonaDevice, RingNotifier, SessionState};
pub use protocol::ProtocolError;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DeviceConfig;
    pub use crate::device::{FonaDevice, RingNotifier, SessionState};
    pub use crate::events::{
        CallerIdEvent, HttpCompletedEvent, RingingEvent, SmsArrivedEvent, UnsolicitedEvent,
    };
    pub use crate::hardware::{HardwareControl, NoHardware};
    pub use crate::protocol::ProtocolError;
    pub use crate::transport::{ByteSink, SerialTransport, Transport};
    pub use crate::types::{
        AddressType, BatteryChargeState, DeleteSelection, HttpMethod, NetworkStatus,
        RegistrationStatus, SmsMessage, SmsStatus, SmsStorage,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
