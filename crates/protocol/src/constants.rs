use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Literal tag that opens every discovery record.
pub const PROTOCOL_KEY: &[u8; KEY_LEN] = b"soundtrack";

/// Length of the tag field in bytes.
pub const KEY_LEN: usize = 10;

/// Length of the device id field in bytes.
pub const ID_LEN: usize = 10;

/// Length of the device name field in bytes.
pub const NAME_LEN: usize = 255;

/// Multicast group shared by every Sound Track device.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 205, 205, 205);

/// Port probes are multicast to.
pub const DEFAULT_MULTICAST_PORT: u16 = 2250;

/// Audio stream port. Advertised only; discovery never uses it.
pub const DEFAULT_STREAM_PORT: u16 = 2251;

/// Port a receiver listens on for unicast replies.
pub const DEFAULT_CLIENT_COMM_PORT: u16 = 2252;

/// Port a server sends replies from.
pub const DEFAULT_SERVER_COMM_TX_PORT: u16 = 2252;

/// Port a server accepts direct messages on.
pub const DEFAULT_SERVER_COMM_RX_PORT: u16 = 2253;

/// Port of the server's REST interface.
pub const DEFAULT_REST_PORT: u16 = 2249;

/// Control message type carried in a [`Message`](crate::Message) envelope.
///
/// Variants up to and including [`RequestId`](MessageType::RequestId) are
/// bare signals; the rest carry a message string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// "You there?"
    Ping,
    /// Generic receipt or yes.
    Acknowledge,
    /// Request to resend.
    RxFailed,
    /// Generic no.
    Deny,
    /// Device asks to become a tracking target.
    RequestTracking,
    /// Speaker asks the server for its settings.
    StatusRequest,
    StartPlayback,
    SuspendPlayback,
    /// Asks the server to create and send an id.
    #[serde(rename = "requestID")]
    RequestId,
    /// Server hands an id to a client.
    #[serde(rename = "giveID")]
    GiveId,
    /// Temporary playback adjustment sent to a speaker.
    PlaybackCommand,
    /// Base playback parameters, or overall settings from a controller.
    PlaybackSettings,
    /// Beacons in proximity reported by a tracking device.
    ReportProximity,
    /// Information on the current playback.
    MediaInfo,
    ErrorMessage,
    DisplayMessage,
}

impl MessageType {
    /// All variants in wire-code order.
    pub const ALL: [MessageType; 16] = [
        MessageType::Ping,
        MessageType::Acknowledge,
        MessageType::RxFailed,
        MessageType::Deny,
        MessageType::RequestTracking,
        MessageType::StatusRequest,
        MessageType::StartPlayback,
        MessageType::SuspendPlayback,
        MessageType::RequestId,
        MessageType::GiveId,
        MessageType::PlaybackCommand,
        MessageType::PlaybackSettings,
        MessageType::ReportProximity,
        MessageType::MediaInfo,
        MessageType::ErrorMessage,
        MessageType::DisplayMessage,
    ];

    /// Numeric code of this type.
    pub fn code(self) -> u8 {
        match self {
            MessageType::Ping => 0,
            MessageType::Acknowledge => 1,
            MessageType::RxFailed => 2,
            MessageType::Deny => 3,
            MessageType::RequestTracking => 4,
            MessageType::StatusRequest => 5,
            MessageType::StartPlayback => 6,
            MessageType::SuspendPlayback => 7,
            MessageType::RequestId => 8,
            MessageType::GiveId => 9,
            MessageType::PlaybackCommand => 10,
            MessageType::PlaybackSettings => 11,
            MessageType::ReportProximity => 12,
            MessageType::MediaInfo => 13,
            MessageType::ErrorMessage => 14,
            MessageType::DisplayMessage => 15,
        }
    }

    /// Looks up a type by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Returns true if messages of this type must carry a message string.
    pub fn requires_message(self) -> bool {
        match self {
            MessageType::Ping
            | MessageType::Acknowledge
            | MessageType::RxFailed
            | MessageType::Deny
            | MessageType::RequestTracking
            | MessageType::StatusRequest
            | MessageType::StartPlayback
            | MessageType::SuspendPlayback
            | MessageType::RequestId => false,
            MessageType::GiveId
            | MessageType::PlaybackCommand
            | MessageType::PlaybackSettings
            | MessageType::ReportProximity
            | MessageType::MediaInfo
            | MessageType::ErrorMessage
            | MessageType::DisplayMessage => true,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            MessageType::Ping => "ping",
            MessageType::Acknowledge => "acknowledge",
            MessageType::RxFailed => "rxFailed",
            MessageType::Deny => "deny",
            MessageType::RequestTracking => "requestTracking",
            MessageType::StatusRequest => "statusRequest",
            MessageType::StartPlayback => "startPlayback",
            MessageType::SuspendPlayback => "suspendPlayback",
            MessageType::RequestId => "requestID",
            MessageType::GiveId => "giveID",
            MessageType::PlaybackCommand => "playbackCommand",
            MessageType::PlaybackSettings => "playbackSettings",
            MessageType::ReportProximity => "reportProximity",
            MessageType::MediaInfo => "mediaInfo",
            MessageType::ErrorMessage => "errorMessage",
            MessageType::DisplayMessage => "displayMessage",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
