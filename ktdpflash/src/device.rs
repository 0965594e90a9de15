//! Device identity and state as read from the DPCD identity block.

use std::fmt;

/// Firmware run state reported by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FwRunState {
    /// Executing from internal ROM, no firmware loaded.
    Irom,
    /// Executing boot code.
    BootCode,
    /// Application firmware running.
    App,
    /// Unrecognized run state byte.
    Unknown(u8),
}

impl FwRunState {
    /// Decode the run state register value.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Irom,
            1 => Self::BootCode,
            2 => Self::App,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for FwRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Irom => write!(f, "iROM"),
            Self::BootCode => write!(f, "boot code"),
            Self::App => write!(f, "application"),
            Self::Unknown(raw) => write!(f, "unknown ({raw:#04x})"),
        }
    }
}

/// Active flash bank on dual-bank parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlashBank {
    /// Bank A is active.
    A,
    /// Bank B is active.
    B,
    /// Single-bank part, or the bank could not be determined.
    None,
}

impl FlashBank {
    /// Decode the bank byte returned by the active-flash-bank query.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::A,
            1 => Self::B,
            _ => Self::None,
        }
    }
}

impl fmt::Display for FlashBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Downstream port selector for AUX forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DevPort {
    /// Downstream port 0.
    Port0,
    /// Downstream port 1.
    Port1,
    /// Downstream port 2.
    Port2,
}

impl DevPort {
    /// Parameter byte written before enabling forwarding.
    pub fn param(self) -> u8 {
        match self {
            Self::Port0 => 0,
            Self::Port1 => 1,
            Self::Port2 => 2,
        }
    }
}

/// Identity read from the branch device's DPCD identity block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Chip revision byte.
    pub chip_rev: u8,
    /// Standard firmware version triplet (major, minor, revision).
    pub fw_version: (u8, u8, u8),
    /// Customer-specific firmware version.
    pub customer_fw_version: u16,
    /// Customer project id.
    pub customer_project_id: u8,
    /// Chip type byte.
    pub chip_type: u8,
    /// Firmware run state at probe time.
    pub run_state: FwRunState,
}

impl DeviceInfo {
    /// Firmware version as a dotted string.
    pub fn fw_version_string(&self) -> String {
        let (major, minor, rev) = self.fw_version;
        format!("{major}.{minor}.{rev}")
    }
}
