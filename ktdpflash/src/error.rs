//! Error types for ktdpflash.

use std::io;
use thiserror::Error;

/// Result type for ktdpflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ktdpflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (AUX device node, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A handshake or poll loop exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The device replied with an unexpected status code.
    #[error("Device reported status {code:#04x}")]
    Status {
        /// Status code read from the command/status register (low 7 bits).
        code: u8,
    },

    /// The device rejected the CRC of the last transferred chunk.
    #[error("Device rejected chunk CRC")]
    CrcRejected,

    /// The flash id was read back but the flash type is not supported.
    #[error("SPI flash not supported (flash id {flash_id:#06x})")]
    FlashNotSupported {
        /// Flash id reported by the ISP driver.
        flash_id: u16,
    },

    /// No SPI flash was detected at all.
    #[error("SPI flash not connected")]
    FlashNotConnected,

    /// A buffer or register field is too small for the requested data.
    #[error("Size mismatch: {needed} bytes do not fit in {capacity}")]
    SizeMismatch {
        /// Bytes required by the operation.
        needed: usize,
        /// Bytes available in the destination.
        capacity: usize,
    },

    /// Firmware image rejected before any transfer started.
    #[error("Invalid firmware: {0}")]
    InvalidFirmware(String),

    /// Protocol violation that is not a plain status code.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unsupported chip or operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The embedding application requested interruption.
    #[error("Operation cancelled")]
    Cancelled,

    /// A lower-level error with added call-site context.
    #[error("{context}: {source}")]
    Context {
        /// What the caller was doing when the error occurred.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with call-site context.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Walk the context chain down to the originating error.
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Context { source, .. } = err {
            err = source;
        }
        err
    }
}

/// Extension trait to add context to results, mirroring the prefix-style
/// chaining used at every protocol call site.
pub trait ResultExt<T> {
    /// Wrap the error value with call-site context.
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}
