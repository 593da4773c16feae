//! Wire records and message types for Sound Track device discovery.
//!
//! See [`wire`] for the binary layout of the probe and the device
//! advertisement.

pub mod constants;
pub mod envelope;
pub mod types;
pub mod wire;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{EnvelopeError, Message};
pub use types::DeviceType;
pub use wire::{DeviceAdvertisement, Probe};
