//! Chip/target abstraction for supporting multiple Kinetic DP branch chips.
//!
//! This module provides a trait-based abstraction over the chip families,
//! allowing the same update flow to drive Jaguar, Mustang, and future
//! parts through a common API.

use crate::device::{DeviceInfo, FlashBank};
use crate::error::{Error, Result};
use crate::image::{AppImageLayout, FirmwarePackage};
use std::fmt;

pub mod jaguar;

pub use jaguar::SecureAuxIspUpdater;

/// Supported chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChipFamily {
    /// Jaguar series DP-to-HDMI converters.
    #[default]
    Jaguar,
    /// Mustang series DP-to-HDMI converters.
    Mustang,
}

impl ChipFamily {
    /// Get the chip family from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "jaguar" => Some(Self::Jaguar),
            "mustang" => Some(Self::Mustang),
            _ => None,
        }
    }

    /// Chip type byte reported in the DPCD identity block.
    pub fn chip_type(&self) -> u8 {
        match self {
            Self::Jaguar => 0x01,
            Self::Mustang => 0x02,
        }
    }

    /// Default region layout for this chip family's firmware images.
    pub fn default_layout(&self) -> AppImageLayout {
        AppImageLayout::default()
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jaguar => write!(f, "Jaguar"),
            Self::Mustang => write!(f, "Mustang"),
        }
    }
}

/// Trait for firmware update operations across all chip families.
///
/// The lifecycle is probe, then optionally detach, then write the
/// firmware, then attach. `attach` resets the device and is expected to
/// be called even when `write_firmware` failed.
pub trait Updater {
    /// Get the chip family this updater drives.
    fn family(&self) -> ChipFamily;

    /// Read the device identity block.
    fn probe(&mut self) -> Result<DeviceInfo>;

    /// Put the device in a state ready for update.
    fn detach(&mut self) -> Result<()>;

    /// Return the device to normal operation (resets the system).
    fn attach(&mut self) -> Result<()>;

    /// Validate a raw update file and split it into its parts.
    fn prepare_firmware(&self, data: &[u8]) -> Result<FirmwarePackage>;

    /// Write a firmware package to the device.
    ///
    /// `progress` is called with a phase name plus confirmed and expected
    /// byte totals. The device is always reset afterwards, even on
    /// failure; the first error wins.
    fn write_firmware(
        &mut self,
        firmware: &FirmwarePackage,
        progress: &mut dyn FnMut(&str, u64, u64),
    ) -> Result<()>;

    /// Query which flash bank is currently active.
    fn active_flash_bank(&mut self) -> Result<FlashBank>;
}

impl ChipFamily {
    /// Create an updater for this chip family on a native AUX device node.
    #[cfg(all(feature = "native", unix))]
    pub fn create_updater(&self, dev_path: &str) -> Result<Box<dyn Updater>> {
        let aux = crate::aux::DrmDpAuxDev::open(dev_path)?;
        self.create_updater_with_channel(aux)
    }

    /// Create an updater over an existing AUX channel.
    ///
    /// Useful for testing or custom transports.
    pub fn create_updater_with_channel<C: crate::aux::AuxChannel + 'static>(
        &self,
        aux: C,
    ) -> Result<Box<dyn Updater>> {
        match self {
            Self::Jaguar | Self::Mustang => Ok(Box::new(SecureAuxIspUpdater::new(aux, *self))),
        }
    }

    /// Match a chip type byte from the identity block to a family.
    pub fn from_chip_type(chip_type: u8) -> Result<Self> {
        match chip_type {
            0x01 => Ok(Self::Jaguar),
            0x02 => Ok(Self::Mustang),
            other => Err(Error::Unsupported(format!(
                "unknown chip type {other:#04x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_family_from_name() {
        assert_eq!(ChipFamily::from_name("jaguar"), Some(ChipFamily::Jaguar));
        assert_eq!(ChipFamily::from_name("MUSTANG"), Some(ChipFamily::Mustang));
        assert_eq!(ChipFamily::from_name("unknown"), None);
    }

    #[test]
    fn test_chip_type_round_trip() {
        for family in [ChipFamily::Jaguar, ChipFamily::Mustang] {
            assert_eq!(ChipFamily::from_chip_type(family.chip_type()).unwrap(), family);
        }
        assert!(ChipFamily::from_chip_type(0x7F).is_err());
    }
}
