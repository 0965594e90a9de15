//! AUX channel abstraction for DPCD register access.
//!
//! The secure ISP protocol runs entirely over the DisplayPort AUX channel:
//! every command, status poll, and payload byte goes through reads and
//! writes of DPCD registers. This module defines the transport trait the
//! protocol layers are written against, keeping them I/O-agnostic.
//!
//! ```text
//! +----------------------+
//! |   Protocol layers    |
//! | (handshake, transfer)|
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! |   AuxChannel trait   |
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! |  /dev/drm_dp_aux*    |
//! |      (native)        |
//! +----------------------+
//! ```

#[cfg(all(feature = "native", unix))]
pub mod native;

use crate::error::Result;

/// Synchronous register transport over the DisplayPort AUX channel.
///
/// Addresses are 24-bit DPCD offsets. Both operations are blocking and
/// fallible; the protocol layers decide how much to transfer per call
/// (the AUX specification caps a single transaction at 16 bytes, which
/// the chunked-transfer layer honors itself).
pub trait AuxChannel {
    /// Read `buf.len()` bytes starting at the given DPCD address.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()>;

    /// Write all of `data` starting at the given DPCD address.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<()>;

    /// Human-readable channel name (device node path for native ports).
    fn name(&self) -> &str;
}

#[cfg(all(feature = "native", unix))]
pub use native::DrmDpAuxDev;
