//! Serial port handling
//!
//! Opens and configures the port the modem is attached to.

use serialport::SerialPort;
use std::time::Duration;

use super::{ProtocolError, DEFAULT_BAUD_RATE};

/// Read timeout used by the reader thread; bounds how long `stop` waits
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Open a serial port configured 8N1 without flow control.
/// The modem autobauds, so any rate the host picks works once `reset` has run.
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    tracing::debug!("Opening {} at {} baud", name, baud);

    let mut port = serialport::new(name, baud)
        .timeout(READ_POLL_INTERVAL)
        .open()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    configure_port(port.as_mut())?;
    Ok(port)
}

/// Configure a serial port for the modem link
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}

/// Discard anything the driver has received but we have not read
pub fn clear_input(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::Input)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}
