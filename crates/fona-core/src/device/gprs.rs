//! GPRS attach and bearer profile

use super::FonaDevice;
use crate::protocol::ProtocolError;

const ATTACH_QUERY: &str = "AT+CGATT?";
const BEARER: &str = "AT+SAPBR=";

impl FonaDevice {
    /// Whether the module is attached to the GPRS service
    pub fn gprs_attached(&self) -> Result<bool, ProtocolError> {
        self.query_flag(ATTACH_QUERY, "+CGATT: ")
    }

    /// Attach to GPRS and open bearer profile 1 using the configured APN,
    /// or close the bearer and detach.
    pub fn set_gprs_attached(&self, attach: bool) -> Result<(), ProtocolError> {
        if !attach {
            self.command(&format!("{}0,1", BEARER))?;
            return self.command("AT+CGATT=0");
        }

        let config = &self.inner.config;
        let apn = config
            .apn
            .as_deref()
            .filter(|apn| !apn.is_empty())
            .ok_or_else(|| ProtocolError::InvalidArgument("APN not set, cannot enable GPRS".to_string()))?;

        self.command("AT+CGATT=1")?;
        self.command(&format!("{}3,1,\"CONTYPE\",\"GPRS\"", BEARER))?;
        self.command(&format!("{}3,1,\"APN\",\"{}\"", BEARER, apn))?;
        if let Some(user) = config.apn_username.as_deref().filter(|u| !u.is_empty()) {
            self.command(&format!("{}3,1,\"USER\",\"{}\"", BEARER, user))?;
        }
        if let Some(password) = config.apn_password.as_deref().filter(|p| !p.is_empty()) {
            self.command(&format!("{}3,1,\"PWD\",\"{}\"", BEARER, password))?;
        }
        self.command(&format!("{}1,1", BEARER))?;

        tracing::info!("GPRS bearer open on APN {}", apn);
        Ok(())
    }
}
