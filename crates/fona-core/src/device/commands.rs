//! General purpose commands: identity, clock, network, battery, audio, calls

use chrono::NaiveDateTime;

use super::FonaDevice;
use crate::protocol::fields::{field, parse_number, unquote};
use crate::protocol::{ProtocolError, OK};
use crate::types::{parse_timestamp, BatteryChargeState, NetworkStatus, RegistrationStatus};

const CLOCK_QUERY: &str = "AT+CCLK?";
const NETWORK_QUERY: &str = "AT+CREG?";
const BATTERY_QUERY: &str = "AT+CBC";
const CALLER_ID_QUERY: &str = "AT+CLIP?";
const MAX_VOLUME: u8 = 100;

fn fields_ref(fields: &[String]) -> Vec<&str> {
    fields.iter().map(String::as_str).collect()
}

impl FonaDevice {
    /// Restore the factory configuration (`ATZ`)
    pub fn factory_reset(&self) -> Result<(), ProtocolError> {
        self.command("ATZ")
    }

    /// Enter the SIM PIN
    pub fn unlock_sim(&self, pin: &str) -> Result<(), ProtocolError> {
        if pin.is_empty() || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProtocolError::InvalidArgument(format!("bad SIM PIN '{}'", pin)));
        }
        self.command(&format!("AT+CPIN={}", pin))
    }

    /// ICCID of the inserted SIM card
    pub fn sim_ccid(&self) -> Result<String, ProtocolError> {
        self.identity("AT+CCID")
    }

    /// IMEI of the module
    pub fn imei(&self) -> Result<String, ProtocolError> {
        self.identity("AT+GSN")
    }

    fn identity(&self, command: &str) -> Result<String, ProtocolError> {
        let mut exchange = self.engine().send(command)?;
        let value = exchange.read_reply()?;
        exchange.expect(OK)?;
        Ok(value)
    }

    /// The module's real time clock, in local time
    pub fn current_time(&self) -> Result<NaiveDateTime, ProtocolError> {
        let reply = self.query(CLOCK_QUERY, "+CCLK: ", true)?;
        let (date, time) = reply.split_once(',').ok_or_else(|| {
            ProtocolError::malformed(CLOCK_QUERY, format!("no date/time separator in '{}'", reply))
        })?;
        parse_timestamp(CLOCK_QUERY, date, time)
    }

    /// Whether the clock is set from the network time
    pub fn rtc_enabled(&self) -> Result<bool, ProtocolError> {
        self.query_flag("AT+CLTS?", "+CLTS: ")
    }

    /// Enable or disable network time sync. The setting is saved to the
    /// profile and only takes effect after a module restart.
    pub fn set_rtc_enabled(&self, enable: bool) -> Result<(), ProtocolError> {
        if self.rtc_enabled()? == enable {
            return Ok(());
        }
        self.command(&format!("AT+CLTS={}", u8::from(enable)))?;
        self.command("AT&W")
    }

    /// Registration state plus, where reported, location area code and cell id
    pub fn network_status(&self) -> Result<NetworkStatus, ProtocolError> {
        let fields = self.query_fields(NETWORK_QUERY, "+CREG: ")?;
        let refs = fields_ref(&fields);
        let code: u8 = parse_number(NETWORK_QUERY, field(NETWORK_QUERY, &refs, 1)?)?;
        let optional = |i: usize| {
            refs.get(i)
                .map(|f| unquote(f).to_string())
                .filter(|f| !f.is_empty())
        };

        Ok(NetworkStatus {
            registration: RegistrationStatus::from_code(code),
            location_area_code: optional(2),
            cell_id: optional(3),
        })
    }

    /// Received signal strength, `0..=31` or `99` when unknown
    pub fn rssi(&self) -> Result<u8, ProtocolError> {
        self.query_number("AT+CSQ", "+CSQ: ", 0)
    }

    /// Whether the battery is charging
    pub fn battery_charge_state(&self) -> Result<BatteryChargeState, ProtocolError> {
        let code: u8 = self.query_number(BATTERY_QUERY, "+CBC: ", 0)?;
        BatteryChargeState::from_code(code).ok_or_else(|| {
            ProtocolError::malformed(BATTERY_QUERY, format!("unknown charge state {}", code))
        })
    }

    /// Battery charge level in percent
    pub fn battery_charge_percent(&self) -> Result<u8, ProtocolError> {
        self.query_number(BATTERY_QUERY, "+CBC: ", 1)
    }

    /// Battery voltage in millivolts
    pub fn battery_voltage(&self) -> Result<u32, ProtocolError> {
        self.query_number(BATTERY_QUERY, "+CBC: ", 2)
    }

    /// Reading of the ADC pin in millivolts
    pub fn adc_voltage(&self) -> Result<u32, ProtocolError> {
        self.query_number("AT+CADC?", "+CADC: ", 1)
    }

    /// True when audio is routed to the external (auxiliary) channel
    pub fn external_audio(&self) -> Result<bool, ProtocolError> {
        self.query_flag("AT+CHFA?", "+CHFA: ")
    }

    /// Route audio to the external channel, or back to the main one
    pub fn set_external_audio(&self, external: bool) -> Result<(), ProtocolError> {
        self.command(&format!("AT+CHFA={}", u8::from(external)))
    }

    /// Loudspeaker volume, `0..=100`
    pub fn volume(&self) -> Result<u8, ProtocolError> {
        self.query_number("AT+CLVL?", "+CLVL: ", 0)
    }

    /// Set the loudspeaker volume. Values above 100 are rejected.
    pub fn set_volume(&self, volume: u8) -> Result<(), ProtocolError> {
        if volume > MAX_VOLUME {
            return Err(ProtocolError::InvalidArgument(format!(
                "volume {} outside 0..={}",
                volume, MAX_VOLUME
            )));
        }
        self.command(&format!("AT+CLVL={}", volume))
    }

    /// Start a voice call
    pub fn call_phone(&self, number: &str) -> Result<(), ProtocolError> {
        if number.is_empty() {
            return Err(ProtocolError::InvalidArgument("empty phone number".to_string()));
        }
        self.command(&format!("ATD{};", number))
    }

    /// End the current call
    pub fn hang_up(&self) -> Result<(), ProtocolError> {
        self.command("ATH")
    }

    /// Pick up a ringing call
    pub fn answer_incoming_call(&self) -> Result<(), ProtocolError> {
        self.command("ATA")
    }

    /// Call the last dialled number
    pub fn redial(&self) -> Result<(), ProtocolError> {
        self.command("ATDL")
    }

    /// Whether caller id presentation is on
    pub fn caller_id_enabled(&self) -> Result<bool, ProtocolError> {
        self.query_flag(CALLER_ID_QUERY, "+CLIP: ")
    }

    /// Turn caller id presentation on or off. Once on, every `RING` is
    /// followed by a caller id event.
    pub fn set_caller_id_enabled(&self, enable: bool) -> Result<(), ProtocolError> {
        // Suppress only while our command owns the link; a call arriving while
        // we wait for the lock still gets its caller id
        let (mut exchange, _suppressed) = self
            .engine()
            .send_with(&format!("AT+CLIP={}", u8::from(enable)), || {
                self.inner.classifier.suppress_caller_id()
            })?;
        exchange.set_timeout(self.inner.config.command_timeout());
        exchange.expect(OK)
    }

    /// Toggle the power key
    pub fn toggle_power(&self) -> Result<(), ProtocolError> {
        self.inner.hardware.toggle_power()
    }

    /// Read the power status line
    pub fn is_powered(&self) -> Result<bool, ProtocolError> {
        self.inner.hardware.is_powered()
    }
}
