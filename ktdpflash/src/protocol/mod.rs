//! Secure AUX-ISP protocol layers.

pub mod crc;
pub mod dpcd;
pub mod handshake;
pub mod transfer;

// Re-export common types
pub use dpcd::{Command, status};
pub use handshake::CommandChannel;
pub use transfer::send_payload;
