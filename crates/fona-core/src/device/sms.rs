//! SMS storage and notification commands (text mode)

use super::FonaDevice;
use crate::protocol::classifier::{LIST_SMS_PREFIX, READ_SMS_PREFIX};
use crate::protocol::fields::{field, parse_number, split_fields, unquote};
use crate::protocol::{ProtocolError, OK};
use crate::types::{parse_timestamp, AddressType, DeleteSelection, SmsMessage, SmsStatus};

const TEXT_MODE: &str = "AT+CMGF=1";
/// Makes `+CMGR`/`+CMGL` headers carry the body length
const SHOW_TEXT_PARAMETERS: &str = "AT+CSDH=1";
const STORAGE_QUERY: &str = "AT+CPMS?";
/// `+CPMS` reports used/total for each of the three storages
const STORAGE_FIELDS: usize = 9;

/// Positions of the header fields shared by `+CMGR` and `+CMGL`
struct HeaderLayout {
    status: usize,
    number: usize,
    timestamp: usize,
    address_type: usize,
}

const READ_LAYOUT: HeaderLayout = HeaderLayout {
    status: 0,
    number: 1,
    timestamp: 3,
    address_type: 4,
};

const LIST_LAYOUT: HeaderLayout = HeaderLayout {
    status: 1,
    number: 2,
    timestamp: 4,
    address_type: 5,
};

fn parse_message(
    command: &str,
    index: u32,
    fields: &[&str],
    layout: &HeaderLayout,
    body: Vec<u8>,
) -> Result<SmsMessage, ProtocolError> {
    let stamp = unquote(field(command, fields, layout.timestamp)?);
    let (date, time) = stamp.split_once(',').ok_or_else(|| {
        ProtocolError::malformed(command, format!("bad SMS timestamp '{}'", stamp))
    })?;

    Ok(SmsMessage {
        index,
        status: SmsStatus::parse(unquote(field(command, fields, layout.status)?)),
        number: unquote(field(command, fields, layout.number)?).to_string(),
        address_type: AddressType::from_code(parse_number(
            command,
            field(command, fields, layout.address_type)?,
        )?),
        timestamp: parse_timestamp(command, date, time)?,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

impl FonaDevice {
    /// Whether the ring indicator pin pulses on SMS arrival
    pub fn sms_ring_indication(&self) -> Result<bool, ProtocolError> {
        self.query_flag("AT+CFGRI?", "+CFGRI: ")
    }

    /// Pulse the ring indicator line when a message arrives
    pub fn set_sms_ring_indication(&self, enable: bool) -> Result<(), ProtocolError> {
        self.command(&format!("AT+CFGRI={}", u8::from(enable)))
    }

    /// Whether new messages are announced with `+CMTI`
    pub fn sms_notification(&self) -> Result<bool, ProtocolError> {
        self.query_flag("AT+CNMI?", "+CNMI: ")
    }

    /// Turn `+CMTI` new message notifications on or off
    pub fn set_sms_notification(&self, enable: bool) -> Result<(), ProtocolError> {
        self.command(if enable { "AT+CNMI=2,1" } else { "AT+CNMI=0" })
    }

    /// Number of messages in the read/delete storage
    pub fn sms_message_count(&self) -> Result<u32, ProtocolError> {
        self.command(TEXT_MODE)?;
        let fields = self.query_fields(STORAGE_QUERY, "+CPMS: ")?;
        if fields.len() != STORAGE_FIELDS {
            return Err(ProtocolError::malformed(
                STORAGE_QUERY,
                format!("expected {} fields, got {}", STORAGE_FIELDS, fields.len()),
            ));
        }
        parse_number(STORAGE_QUERY, &fields[1])
    }

    /// Delete the message at `index`
    pub fn delete_sms_message(&self, index: u32) -> Result<(), ProtocolError> {
        self.command(TEXT_MODE)?;
        self.command(&format!("AT+CMGD={},0", index))
    }

    /// Delete every message matching `selection`. Can take many seconds on a
    /// full SIM.
    pub fn delete_sms_messages(&self, selection: DeleteSelection) -> Result<(), ProtocolError> {
        self.command(TEXT_MODE)?;
        self.engine().send_and_expect(
            &format!("AT+CMGD=0,{}", selection.flag()),
            OK,
            self.inner.config.long_command_timeout(),
            &[],
        )
    }

    /// Read the message stored at `index`. Reading marks an unread message read.
    pub fn sms_message(&self, index: u32) -> Result<SmsMessage, ProtocolError> {
        self.command(TEXT_MODE)?;
        self.command(SHOW_TEXT_PARAMETERS)?;

        let command = format!("AT+CMGR={}", index);
        let mut exchange = self.engine().send(&command)?;
        let fields = exchange.read_fields(READ_SMS_PREFIX)?;
        let body = exchange.next_body()?;
        exchange.expect(OK)?;

        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        parse_message(&command, index, &refs, &READ_LAYOUT, body)
    }

    /// List stored messages with the given status ([`SmsStatus::All`] for
    /// everything). With `mark_read` false, unread messages stay unread.
    pub fn sms_messages(
        &self,
        status: SmsStatus,
        mark_read: bool,
    ) -> Result<Vec<SmsMessage>, ProtocolError> {
        if status == SmsStatus::Unknown {
            return Err(ProtocolError::InvalidArgument(
                "cannot list messages with unknown status".to_string(),
            ));
        }
        self.command(TEXT_MODE)?;
        self.command(SHOW_TEXT_PARAMETERS)?;

        let command = format!(
            "AT+CMGL=\"{}\",{}",
            status.as_stat(),
            u8::from(!mark_read)
        );
        let mut exchange = self.engine().send(&command)?;
        let mut messages = Vec::new();

        loop {
            let line = exchange.read_reply()?;
            if line.eq_ignore_ascii_case(OK) {
                break;
            }
            let Some(payload) = line.strip_prefix(LIST_SMS_PREFIX) else {
                return Err(exchange.mismatch(LIST_SMS_PREFIX, line));
            };
            let fields = split_fields(payload);
            let index = parse_number(&command, field(&command, &fields, 0)?)?;
            let body = exchange.next_body()?;
            messages.push(parse_message(&command, index, &fields, &LIST_LAYOUT, body)?);
        }

        tracing::debug!("Listed {} SMS messages", messages.len());
        Ok(messages)
    }
}
