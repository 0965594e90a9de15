//! Firmware image model.

pub mod secure;

pub use secure::{AppImageLayout, FirmwarePackage};
