//! Optional GPIO control of the module
//!
//! Boards that wire the FONA's RST, RI, KEY and PS pins provide a
//! [`HardwareControl`] implementation; everything else uses [`NoHardware`].

use crate::protocol::ProtocolError;

/// Capabilities backed by GPIO lines. Every method defaults to "not wired".
pub trait HardwareControl: Send + Sync {
    /// Pulse the reset line (the module needs it held low for ~100 ms)
    fn reset(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::NotSupported("reset line"))
    }

    /// True when the ring indicator line is wired and raises ring events itself
    /// through [`crate::RingNotifier`]
    fn ring_indicator_enabled(&self) -> bool {
        false
    }

    /// Toggle the power key to switch the module on or off
    fn toggle_power(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::NotSupported("power key"))
    }

    /// Read the power status line
    fn is_powered(&self) -> Result<bool, ProtocolError> {
        Err(ProtocolError::NotSupported("power status line"))
    }
}

/// Stand-in for hosts with nothing but a serial link
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHardware;

impl HardwareControl for NoHardware {}
