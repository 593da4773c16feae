//! Fixed-length discovery records.
//!
//! # Wire format
//!
//! All integers are little-endian `i32`.
//!
//! ```text
//! PROBE (client -> multicast group), 14 bytes:
//!   [0..10)    "soundtrack"
//!   [10..14)   response port
//!
//! DEVICE ADVERTISEMENT (server -> client, unicast), 288 bytes:
//!   [0..10)    "soundtrack"
//!   [10]       device type (0 unknown, 1 dedicated output, 2 smart output, 3 server)
//!   [11..21)   device id, ASCII; all NUL when unset
//!   [21..25)   stream port
//!   [25..29)   comm port
//!   [29..33)   rest port
//!   [33..288)  device name, UTF-8, space padded
//! ```
//!
//! Decoding never fails. Input that is too short for the record yields the
//! default value, whose key is empty, so [`Probe::is_well_formed`] and
//! [`DeviceAdvertisement::is_well_formed`] report false. Callers branch on
//! that flag.

use crate::constants::{ID_LEN, KEY_LEN, NAME_LEN, PROTOCOL_KEY};
use crate::types::DeviceType;

/// Encoded size of a [`Probe`].
pub const PROBE_LEN: usize = KEY_LEN + 4;

/// Encoded size of a [`DeviceAdvertisement`].
pub const ADVERTISEMENT_LEN: usize = KEY_LEN + 1 + ID_LEN + 4 + 4 + 4 + NAME_LEN;

/// Smallest datagram a receiver will try to decode as an advertisement.
///
/// This is ten bytes short of [`ADVERTISEMENT_LEN`]. Deployed servers are
/// only known to send full records, and it is unclear whether the gap is
/// deliberate slack or an old miscount, so both values are kept. Datagrams
/// in the gap are decoded with the missing tail of the name read as zeros.
pub const MIN_ADVERTISEMENT_DATAGRAM: usize = 278;

const TYPE_OFFSET: usize = KEY_LEN;
const ID_OFFSET: usize = TYPE_OFFSET + 1;
const STREAM_PORT_OFFSET: usize = ID_OFFSET + ID_LEN;
const COMM_PORT_OFFSET: usize = STREAM_PORT_OFFSET + 4;
const REST_PORT_OFFSET: usize = COMM_PORT_OFFSET + 4;
const NAME_OFFSET: usize = REST_PORT_OFFSET + 4;

/// "I am listening" message multicast by a receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    pub key: String,
    /// Port the sender expects replies on.
    pub response_port: i32,
}

impl Probe {
    pub const WIRE_SIZE: usize = PROBE_LEN;

    /// Creates a probe asking for replies on `response_port`.
    pub fn new(response_port: i32) -> Self {
        Self {
            key: protocol_key(),
            response_port,
        }
    }

    /// True when the key matches the protocol tag exactly.
    pub fn is_well_formed(&self) -> bool {
        self.key.as_bytes() == PROTOCOL_KEY
    }

    pub fn encode(&self) -> [u8; PROBE_LEN] {
        let mut buf = [0u8; PROBE_LEN];
        write_key(&mut buf[..KEY_LEN], &self.key);
        buf[KEY_LEN..].copy_from_slice(&self.response_port.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self::decode_at(bytes, 0)
    }

    /// Decodes a probe that starts `offset` bytes into `bytes`.
    pub fn decode_at(bytes: &[u8], offset: usize) -> Self {
        let Some(record) = record_slice(bytes, offset, PROBE_LEN) else {
            return Self::default();
        };
        Self {
            key: read_key(record),
            response_port: read_i32(record, KEY_LEN),
        }
    }
}

/// Self-description a device sends in reply to a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAdvertisement {
    pub key: String,
    pub device_type: DeviceType,
    /// Empty when unset, otherwise ten alphanumeric characters.
    pub id: String,
    pub stream_port: i32,
    pub comm_port: i32,
    pub rest_port: i32,
    pub device_name: String,
}

impl DeviceAdvertisement {
    pub const WIRE_SIZE: usize = ADVERTISEMENT_LEN;

    pub fn new(
        device_type: DeviceType,
        id: impl Into<String>,
        stream_port: i32,
        comm_port: i32,
        rest_port: i32,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            key: protocol_key(),
            device_type,
            id: id.into(),
            stream_port,
            comm_port,
            rest_port,
            device_name: device_name.into(),
        }
    }

    /// True when the key matches the protocol tag exactly.
    pub fn is_well_formed(&self) -> bool {
        self.key.as_bytes() == PROTOCOL_KEY
    }

    /// Encodes the record.
    ///
    /// An id that is not exactly ten bytes is written as unset. Names longer
    /// than 255 bytes are cut at the last character boundary that fits; the
    /// rest of the name is lost.
    pub fn encode(&self) -> [u8; ADVERTISEMENT_LEN] {
        let mut buf = [0u8; ADVERTISEMENT_LEN];
        write_key(&mut buf[..KEY_LEN], &self.key);
        buf[TYPE_OFFSET] = self.device_type.code();

        if self.id.len() == ID_LEN {
            buf[ID_OFFSET..STREAM_PORT_OFFSET].copy_from_slice(self.id.as_bytes());
        }

        buf[STREAM_PORT_OFFSET..COMM_PORT_OFFSET].copy_from_slice(&self.stream_port.to_le_bytes());
        buf[COMM_PORT_OFFSET..REST_PORT_OFFSET].copy_from_slice(&self.comm_port.to_le_bytes());
        buf[REST_PORT_OFFSET..NAME_OFFSET].copy_from_slice(&self.rest_port.to_le_bytes());

        let name = truncate_utf8(&self.device_name, NAME_LEN);
        let field = &mut buf[NAME_OFFSET..];
        field[..name.len()].copy_from_slice(name.as_bytes());
        field[name.len()..].fill(b' ');
        buf
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self::decode_at(bytes, 0)
    }

    /// Decodes an advertisement that starts `offset` bytes into `bytes`,
    /// e.g. when it is embedded in a larger message.
    pub fn decode_at(bytes: &[u8], offset: usize) -> Self {
        let Some(record) = record_slice(bytes, offset, ADVERTISEMENT_LEN) else {
            return Self::default();
        };
        Self {
            key: read_key(record),
            device_type: DeviceType::from_code(record[TYPE_OFFSET]),
            id: read_padded(&record[ID_OFFSET..STREAM_PORT_OFFSET]),
            stream_port: read_i32(record, STREAM_PORT_OFFSET),
            comm_port: read_i32(record, COMM_PORT_OFFSET),
            rest_port: read_i32(record, REST_PORT_OFFSET),
            device_name: read_padded(&record[NAME_OFFSET..]),
        }
    }
}

fn protocol_key() -> String {
    String::from_utf8_lossy(PROTOCOL_KEY).into_owned()
}

fn record_slice(bytes: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    bytes.get(offset..end)
}

fn write_key(field: &mut [u8], key: &str) {
    let n = key.len().min(field.len());
    field[..n].copy_from_slice(&key.as_bytes()[..n]);
}

fn read_key(record: &[u8]) -> String {
    String::from_utf8_lossy(&record[..KEY_LEN]).into_owned()
}

fn read_i32(record: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
}

/// Reads a text field, dropping trailing space and NUL padding.
fn read_padded(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
