//! DPCD register map of the secure AUX-ISP protocol.
//!
//! The protocol lives in a handful of vendor-proprietary DPCD registers
//! plus a 32 KiB address window used for bulk payload transfer:
//!
//! ```text
//! 0x00300  source OUI (3 bytes, selects vendor-proprietary mode)
//! 0x0050D  command/status register
//! 0x0050E  parameter register
//! 0x00513  reply data length
//! 0x00514  reply data (12 bytes, 0x514..0x51F)
//! 0x80000  AUX payload window (32 KiB, 0x80000..0x87FFF)
//! ```
//!
//! A command is written with the confirmation bit (`0x80`) set; the
//! device clears the bit once the command has been processed, or replaces
//! the value with a status code on failure.

/// DPCD address of the source OUI register.
pub const DPCD_ADDR_SOURCE_OUI: u32 = 0x00300;

/// Size of an IEEE OUI in bytes.
pub const DPCD_SIZE_IEEE_OUI: usize = 3;

/// Vendor OUI written to enter proprietary-command mode (MegaChips America).
pub const VENDOR_OUI: [u8; DPCD_SIZE_IEEE_OUI] = [0x00, 0x60, 0xAD];

/// Branch hardware revision register, start of the identity block.
pub const DPCD_ADDR_BRANCH_HW_REV: u32 = 0x00509;

/// Firmware run state register.
pub const DPCD_ADDR_FW_RUN_STATE: u32 = 0x00508;

/// Command/status register.
pub const DPCD_ADDR_CMD_STATUS_REG: u32 = 0x0050D;

/// Parameter register (one byte of per-command feedback or argument).
pub const DPCD_ADDR_PARAM_REG: u32 = 0x0050E;

/// Reply data length register.
pub const DPCD_ADDR_REPLY_LEN_REG: u32 = 0x00513;

/// Reply data register.
pub const DPCD_ADDR_REPLY_DATA_REG: u32 = 0x00514;

/// Capacity of the reply data register in bytes.
pub const DPCD_SIZE_REPLY_DATA_REG: usize = 12;

/// Base address of the AUX payload window.
pub const DPCD_ADDR_AUX_WIN: u32 = 0x80000;

/// Size of the AUX payload window (32 KiB).
pub const DPCD_SIZE_AUX_WIN: usize = 0x8000;

/// Maximum length of a single AUX write transaction.
pub const MAX_AUX_WRITE: usize = 16;

/// Confirmation bit set by the source until the sink processes a command.
pub const CONFIRMATION_BIT: u8 = 0x80;

/// Mask extracting the command/status code from the register value.
pub const COMMAND_MASK: u8 = 0x7F;

/// Proprietary commands written to the command/status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Unlock the diagnostic registers while the application is running.
    PrepareForIspMode = 0x23,
    /// Switch the sink into code-loading mode for the ISP driver.
    EnterCodeLoadingMode = 0x24,
    /// Execute the ISP driver just loaded into RAM.
    ExecuteRamCode = 0x25,
    /// Enter firmware update mode (may trigger a lengthy flash erase).
    EnterFwUpdateMode = 0x26,
    /// A payload chunk has been placed in the AUX window.
    ChunkDataProcessed = 0x27,
    /// Program the staged images into flash.
    InstallImages = 0x28,
    /// Reset the system.
    ResetSystem = 0x29,
    /// Forward AUX transactions to a downstream port.
    EnableAuxForward = 0x31,
    /// Stop forwarding AUX transactions.
    DisableAuxForward = 0x32,
    /// Query which flash bank is currently active.
    GetActiveFlashBank = 0x33,
}

impl Command {
    /// Raw command id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Command id with the confirmation bit set, as written to the sink.
    pub fn with_confirmation(self) -> u8 {
        self as u8 | CONFIRMATION_BIT
    }
}

/// Status codes reported back in the command/status register.
pub mod status {
    /// Neutral/idle value.
    pub const NONE: u8 = 0x00;
    /// The information sent with the command was invalid.
    pub const INVALID_INFO: u8 = 0x01;
    /// CRC check of the last payload chunk failed.
    pub const CRC_FAILURE: u8 = 0x02;
    /// The loaded image is not valid.
    pub const INVALID_IMAGE: u8 = 0x03;
    /// ISP driver ready, secure (signed) updates required.
    pub const SECURE_ENABLED: u8 = 0x04;
    /// ISP driver ready, unsigned updates accepted.
    pub const SECURE_DISABLED: u8 = 0x05;
    /// SPI flash access failed.
    pub const SPI_FLASH_FAILURE: u8 = 0x06;
}
