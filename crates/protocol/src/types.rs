use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of device describing itself in an advertisement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    #[default]
    Unknown,
    /// Speaker that only plays what it is sent.
    DedicatedOutput,
    /// Speaker with its own processing.
    SmartOutput,
    /// Media server.
    Server,
}

impl DeviceType {
    /// Single-byte wire code.
    pub fn code(self) -> u8 {
        match self {
            DeviceType::Unknown => 0,
            DeviceType::DedicatedOutput => 1,
            DeviceType::SmartOutput => 2,
            DeviceType::Server => 3,
        }
    }

    /// Maps a wire code back to a type. Unassigned codes read as `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => DeviceType::DedicatedOutput,
            2 => DeviceType::SmartOutput,
            3 => DeviceType::Server,
            _ => DeviceType::Unknown,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Unknown => write!(f, "unknown"),
            DeviceType::DedicatedOutput => write!(f, "dedicated output"),
            DeviceType::SmartOutput => write!(f, "smart output"),
            DeviceType::Server => write!(f, "server"),
        }
    }
}
