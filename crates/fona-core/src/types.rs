//! Value types shared by events and the command vocabulary

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Type of number presented in caller id and SMS headers (3GPP TS 24.008 type-of-address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    /// 129
    Unknown,
    /// 161
    National,
    /// 145, number starts with `+`
    International,
    /// 177
    NetworkSpecific,
    /// Any other code reported by the network
    Other(u16),
}

impl AddressType {
    /// Map a numeric type-of-address code
    pub fn from_code(code: u16) -> Self {
        match code {
            129 => AddressType::Unknown,
            161 => AddressType::National,
            145 => AddressType::International,
            177 => AddressType::NetworkSpecific,
            other => AddressType::Other(other),
        }
    }

    /// The numeric code
    pub fn code(&self) -> u16 {
        match self {
            AddressType::Unknown => 129,
            AddressType::National => 161,
            AddressType::International => 145,
            AddressType::NetworkSpecific => 177,
            AddressType::Other(code) => *code,
        }
    }
}

/// Where an SMS message is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsStorage {
    /// Any storage name we don't recognise
    Unknown,
    /// `SM`
    Sim,
    /// `ME`
    Phone,
    /// `SM_P`
    SimPreferred,
    /// `ME_P`
    PhonePreferred,
    /// `MT`
    SimOrPhone,
}

impl SmsStorage {
    /// Map a `<mem>` code as reported by `+CMTI`
    pub fn from_code(code: &str) -> Self {
        match code {
            "SM" => SmsStorage::Sim,
            "ME" => SmsStorage::Phone,
            "SM_P" => SmsStorage::SimPreferred,
            "ME_P" => SmsStorage::PhonePreferred,
            "MT" => SmsStorage::SimOrPhone,
            _ => SmsStorage::Unknown,
        }
    }
}

/// Status and origin of a stored SMS message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsStatus {
    /// Unrecognised `<stat>`
    Unknown,
    /// `REC UNREAD`
    ReceivedUnread,
    /// `REC READ`
    ReceivedRead,
    /// `STO UNSENT`
    StoredUnsent,
    /// `STO SENT`
    StoredSent,
    /// Only meaningful as a filter when listing messages
    All,
}

impl SmsStatus {
    /// Parse a text-mode `<stat>` value
    pub fn parse(stat: &str) -> Self {
        match stat {
            "REC UNREAD" => SmsStatus::ReceivedUnread,
            "REC READ" => SmsStatus::ReceivedRead,
            "STO UNSENT" => SmsStatus::StoredUnsent,
            "STO SENT" => SmsStatus::StoredSent,
            "ALL" => SmsStatus::All,
            _ => SmsStatus::Unknown,
        }
    }

    /// Text-mode `<stat>` value, empty for [`SmsStatus::Unknown`]
    pub fn as_stat(&self) -> &'static str {
        match self {
            SmsStatus::ReceivedUnread => "REC UNREAD",
            SmsStatus::ReceivedRead => "REC READ",
            SmsStatus::StoredUnsent => "STO UNSENT",
            SmsStatus::StoredSent => "STO SENT",
            SmsStatus::All => "ALL",
            SmsStatus::Unknown => "",
        }
    }
}

/// A stored SMS message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    /// Storage index, usable for reading or deleting the message
    pub index: u32,
    /// Read/sent state
    pub status: SmsStatus,
    /// Sender (or recipient for stored outgoing messages)
    pub number: String,
    /// Numbering plan of `number`
    pub address_type: AddressType,
    /// Service centre timestamp, in the modem's local time
    pub timestamp: NaiveDateTime,
    /// Message text, possibly spanning several lines
    pub body: String,
}

/// Bulk selection for `AT+CMGD=0,<delflag>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteSelection {
    /// All messages that have been read
    AllRead,
    /// All read or sent messages
    ReadOrSent,
    /// Everything except unread received messages
    AllExceptUnread,
    /// Every message regardless of status
    All,
}

impl DeleteSelection {
    pub(crate) fn flag(&self) -> u8 {
        match self {
            DeleteSelection::AllRead => 1,
            DeleteSelection::ReadOrSent => 2,
            DeleteSelection::AllExceptUnread => 3,
            DeleteSelection::All => 4,
        }
    }
}

/// Network registration status (`+CREG` `<stat>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// Not registered and not searching
    NotRegistered,
    /// Registered with the home network
    Home,
    /// Searching for an operator
    Searching,
    /// Registration denied
    Denied,
    /// Any other code
    Unknown,
    /// Registered, roaming
    Roaming,
}

impl RegistrationStatus {
    /// Map a `<stat>` code
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RegistrationStatus::NotRegistered,
            1 => RegistrationStatus::Home,
            2 => RegistrationStatus::Searching,
            3 => RegistrationStatus::Denied,
            5 => RegistrationStatus::Roaming,
            _ => RegistrationStatus::Unknown,
        }
    }

    /// True when registered with either the home network or a roaming partner
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationStatus::Home | RegistrationStatus::Roaming)
    }
}

/// Current relationship with the cell provider. Location area code and cell id
/// are only reported in some registration states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Registration state
    pub registration: RegistrationStatus,
    /// Location area code, hex
    pub location_area_code: Option<String>,
    /// Cell id, hex
    pub cell_id: Option<String>,
}

/// Battery charging state (`+CBC` `<bcs>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryChargeState {
    /// Running on battery
    Discharging,
    /// Charging from USB
    Charging,
    /// Not charging, running from USB power
    FullyCharged,
}

impl BatteryChargeState {
    /// Map a `<bcs>` code; `None` for anything else
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BatteryChargeState::Discharging),
            1 => Some(BatteryChargeState::Charging),
            2 => Some(BatteryChargeState::FullyCharged),
            _ => None,
        }
    }
}

/// HTTP methods supported by `AT+HTTPACTION`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `HEAD`
    Head,
}

impl HttpMethod {
    pub(crate) fn action_code(&self) -> u8 {
        match self {
            HttpMethod::Get => 0,
            HttpMethod::Post => 1,
            HttpMethod::Head => 2,
        }
    }
}

/// Parse the modem's `yy/MM/dd` and `hh:mm:ss±zz` timestamp halves. The
/// quarter-hour zone suffix is accepted but not applied.
pub(crate) fn parse_timestamp(
    command: &str,
    date: &str,
    time: &str,
) -> Result<NaiveDateTime, ProtocolError> {
    let bad = |what: &str| ProtocolError::malformed(command, format!("bad {} '{}'", what, date));

    let date_parts: Vec<&str> = date.trim().split('/').collect();
    if date_parts.len() != 3 {
        return Err(bad("date"));
    }
    let numbers = |parts: &[&str]| -> Option<Vec<u32>> {
        parts.iter().map(|p| p.trim().parse::<u32>().ok()).collect()
    };
    let ymd = numbers(&date_parts).ok_or_else(|| bad("date"))?;

    let clock = time
        .trim()
        .split(['+', '-'])
        .next()
        .unwrap_or_default();
    let time_parts: Vec<&str> = clock.split(':').collect();
    if time_parts.len() != 3 {
        return Err(ProtocolError::malformed(command, format!("bad time '{}'", time)));
    }
    let hms = numbers(&time_parts)
        .ok_or_else(|| ProtocolError::malformed(command, format!("bad time '{}'", time)))?;

    NaiveDate::from_ymd_opt(2000 + ymd[0] as i32, ymd[1], ymd[2])
        .and_then(|d| d.and_hms_opt(hms[0], hms[1], hms[2]))
        .ok_or_else(|| bad("date"))
}
