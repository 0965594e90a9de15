//! Jaguar/Mustang secure AUX-ISP update flow.
//!
//! Both families share the same DPCD protocol and differ only in their
//! identity bytes, so a single updater drives them. The flow is:
//!
//! 1. select vendor-proprietary mode via the source OUI,
//! 2. load and execute the ISP driver in device RAM,
//! 3. enter firmware update mode (the device erases flash here),
//! 4. stream the image regions through the AUX window,
//! 5. install, then always reset the system.

use std::time::Duration;

pub mod updater;

pub use updater::SecureAuxIspUpdater;

/// Wait for ISP-mode preparation while the application is running.
pub(crate) const PREPARE_MAX_WAIT: Duration = Duration::from_millis(500);
pub(crate) const PREPARE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Wait for the sink to enter code-loading mode.
pub(crate) const CODE_LOADING_MAX_WAIT: Duration = Duration::from_millis(500);
pub(crate) const CODE_LOADING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-chunk wait while streaming the ISP driver into RAM.
pub(crate) const DRIVER_MAX_WAIT: Duration = Duration::from_secs(10);
pub(crate) const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wait for the ISP driver to start executing.
pub(crate) const EXECUTE_MAX_WAIT: Duration = Duration::from_millis(1500);
pub(crate) const EXECUTE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait for update mode; covers a full flash erase on some parts.
pub(crate) const FW_UPDATE_MODE_MAX_WAIT: Duration = Duration::from_secs(200);
pub(crate) const FW_UPDATE_MODE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-chunk wait while streaming image regions.
pub(crate) const REGION_MAX_WAIT: Duration = Duration::from_secs(10);
pub(crate) const REGION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Install poll budget: 1500 polls at 50 ms is 75 s.
pub(crate) const INSTALL_MAX_POLLS: u32 = 1500;
pub(crate) const INSTALL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wait for the active-flash-bank query.
pub(crate) const BANK_MAX_WAIT: Duration = Duration::from_millis(100);
pub(crate) const BANK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Wait for AUX forwarding to toggle.
pub(crate) const FORWARD_MAX_WAIT: Duration = Duration::from_millis(1000);
pub(crate) const FORWARD_POLL_INTERVAL: Duration = Duration::from_millis(20);
