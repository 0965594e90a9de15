//! # ktdpflash
//!
//! A library for updating Kinetic DisplayPort branch device firmware
//! over the AUX channel.
//!
//! This crate implements the secure AUX-ISP protocol spoken by Jaguar
//! and Mustang DP-to-HDMI converters, including:
//!
//! - DPCD command/status handshake with confirmation-bit polling
//! - Chunked payload transfer through the 32 KiB AUX window
//! - The proprietary bit-serial CRC-16 used to guard each chunk
//! - ISP driver bootstrap and firmware image installation
//! - Flash bank queries and AUX forwarding for daisy-chained sinks
//!
//! ## Supported Chips
//!
//! - Jaguar series
//! - Mustang series
//!
//! ## Features
//!
//! - `native` (default): access to `/dev/drm_dp_aux*` device nodes
//! - `serde`: serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use ktdpflash::{ChipFamily, Updater};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chip = ChipFamily::Jaguar;
//!     let mut updater = chip.create_updater("/dev/drm_dp_aux0")?;
//!
//!     let info = updater.probe()?;
//!     println!("running firmware {}", info.fw_version_string());
//!
//!     let data = std::fs::read("firmware.bin")?;
//!     let firmware = updater.prepare_firmware(&data)?;
//!     updater.write_firmware(&firmware, &mut |phase, current, total| {
//!         println!("{phase}: {current}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod aux;
pub mod device;
pub mod error;
pub mod image;
pub mod protocol;
pub mod session;
pub mod target;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupt_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
// Native-specific re-exports
#[cfg(all(feature = "native", unix))]
pub use aux::DrmDpAuxDev;
pub use target::{ChipFamily, SecureAuxIspUpdater, Updater};
pub use {
    aux::AuxChannel,
    device::{DevPort, DeviceInfo, FlashBank, FwRunState},
    error::{Error, Result},
    image::{AppImageLayout, FirmwarePackage},
    protocol::{Command, CommandChannel, crc::crc16_kinetic, send_payload, status},
    session::SessionState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        test_set_interrupted(false);
        assert!(!is_interrupt_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        test_set_interrupted(true);
        assert!(is_interrupt_requested());

        test_set_interrupted(false);
        assert!(!is_interrupt_requested());
    }
}
