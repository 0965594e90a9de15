//! Command/status handshake over the proprietary DPCD registers.
//!
//! Every step of the secure ISP protocol is built from the same
//! primitive: write a command with the confirmation bit set, then poll
//! the command/status register until the sink either clears the bit
//! (success) or replaces the value with a status code (failure). The
//! transport offers no interrupt, so polling is sleep-then-read with an
//! explicit wall-clock deadline.

use {
    crate::{
        aux::AuxChannel,
        error::{Error, Result, ResultExt},
        protocol::dpcd::{
            COMMAND_MASK, CONFIRMATION_BIT, Command, DPCD_ADDR_CMD_STATUS_REG,
            DPCD_ADDR_PARAM_REG, DPCD_ADDR_REPLY_DATA_REG, DPCD_ADDR_REPLY_LEN_REG,
            DPCD_ADDR_SOURCE_OUI, DPCD_SIZE_IEEE_OUI, DPCD_SIZE_REPLY_DATA_REG, VENDOR_OUI,
            status,
        },
    },
    log::trace,
    std::{thread, time::Duration},
};

/// Handshake access to the command/status register pair of one sink.
///
/// Borrows the AUX channel for the duration of an operation; the
/// sequencer is the sole writer for a session, so no locking is needed.
pub struct CommandChannel<'p, C: AuxChannel> {
    aux: &'p mut C,
}

impl<'p, C: AuxChannel> CommandChannel<'p, C> {
    /// Wrap an AUX channel.
    pub fn new(aux: &'p mut C) -> Self {
        Self { aux }
    }

    /// Write a command with the confirmation bit set. Does not wait.
    pub fn send_command(&mut self, cmd: Command) -> Result<()> {
        trace!("send command {cmd:?}");
        self.aux
            .write(DPCD_ADDR_CMD_STATUS_REG, &[cmd.with_confirmation()])
            .context("failed to write command/status register")
    }

    /// Force the command/status register back to the neutral value.
    ///
    /// Used on cleanup paths where the caller treats failure as
    /// best-effort.
    pub fn clear_command(&mut self) -> Result<()> {
        self.aux
            .write(DPCD_ADDR_CMD_STATUS_REG, &[status::NONE])
            .context("failed to clear command/status register")
    }

    /// Poll until the sink confirms processing of `cmd`.
    ///
    /// Per poll there are three outcomes: the register still carries the
    /// confirmation bit (keep waiting), it equals the bare command id
    /// (processed), or it holds anything else (failure status; the CRC
    /// failure code maps to [`Error::CrcRejected`]).
    pub fn await_command_processed(
        &mut self,
        cmd: Command,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let mut remaining = max_wait;

        loop {
            let mut val = [0u8; 1];
            self.aux.read(DPCD_ADDR_CMD_STATUS_REG, &mut val)?;

            if val[0] != cmd.with_confirmation() {
                if val[0] == cmd.id() {
                    // confirmation bit cleared by the sink
                    return Ok(());
                }
                return Err(status_error(val[0]));
            }

            if remaining.is_zero() {
                return Err(Error::Timeout(format!(
                    "waiting for command {:#04x} to be processed",
                    cmd.id()
                )));
            }
            if crate::is_interrupt_requested() {
                return Err(Error::Cancelled);
            }

            thread::sleep(poll_interval);
            remaining = remaining.saturating_sub(poll_interval);
        }
    }

    /// Write a command and wait for the sink to process it.
    pub fn transact(
        &mut self,
        cmd: Command,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        self.send_command(cmd)?;
        self.await_command_processed(cmd, max_wait, poll_interval)
    }

    /// Poll until the command/status register returns to the neutral value.
    ///
    /// A cleared confirmation bit with a nonzero code means the sink
    /// responded with a failure.
    pub fn await_command_cleared(
        &mut self,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let mut remaining = max_wait;

        loop {
            let mut val = [0u8; 1];
            self.aux.read(DPCD_ADDR_CMD_STATUS_REG, &mut val)?;

            if val[0] == status::NONE {
                return Ok(());
            }
            if val[0] & CONFIRMATION_BIT != CONFIRMATION_BIT {
                return Err(status_error(val[0]));
            }

            if remaining.is_zero() {
                return Err(Error::Timeout(
                    "waiting for command/status register to clear".into(),
                ));
            }
            if crate::is_interrupt_requested() {
                return Err(Error::Cancelled);
            }

            thread::sleep(poll_interval);
            remaining = remaining.saturating_sub(poll_interval);
        }
    }

    /// Read the one-byte parameter register.
    pub fn read_param(&mut self) -> Result<u8> {
        let mut val = [0u8; 1];
        self.aux
            .read(DPCD_ADDR_PARAM_REG, &mut val)
            .context("failed to read parameter register")?;
        Ok(val[0])
    }

    /// Write the one-byte parameter register.
    pub fn write_param(&mut self, val: u8) -> Result<()> {
        self.aux
            .write(DPCD_ADDR_PARAM_REG, &[val])
            .context("failed to write parameter register")
    }

    /// Read the sink's reply out of the reply-data register.
    ///
    /// The reply-length register decides how many bytes are valid;
    /// returns that count after copying into `buf`.
    pub fn read_reply_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut len = [0u8; 1];
        self.aux
            .read(DPCD_ADDR_REPLY_LEN_REG, &mut len)
            .context("failed to read reply length register")?;

        let reply_len = usize::from(len[0]);
        if buf.len() < reply_len {
            return Err(Error::SizeMismatch {
                needed: reply_len,
                capacity: buf.len(),
            });
        }

        if reply_len > 0 {
            self.aux
                .read(DPCD_ADDR_REPLY_DATA_REG, &mut buf[..reply_len])
                .context("failed to read reply data register")?;
        }
        Ok(reply_len)
    }

    /// Write data into the reply-data register and publish its length.
    ///
    /// If the data write fails the length register is still set, to zero,
    /// so the sink never sees a stale length for garbage data.
    pub fn write_reply_data(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > DPCD_SIZE_REPLY_DATA_REG {
            return Err(Error::SizeMismatch {
                needed: data.len(),
                capacity: DPCD_SIZE_REPLY_DATA_REG,
            });
        }

        let data_res = self
            .aux
            .write(DPCD_ADDR_REPLY_DATA_REG, data)
            .context("failed to write reply data register");
        let len = if data_res.is_ok() { data.len() as u8 } else { 0 };
        self.aux
            .write(DPCD_ADDR_REPLY_LEN_REG, &[len])
            .context("failed to write reply length register")?;
        data_res
    }

    /// Read the current source OUI.
    pub fn read_source_oui(&mut self) -> Result<[u8; DPCD_SIZE_IEEE_OUI]> {
        let mut oui = [0u8; DPCD_SIZE_IEEE_OUI];
        self.aux
            .read(DPCD_ADDR_SOURCE_OUI, &mut oui)
            .context("failed to read source OUI")?;
        Ok(oui)
    }

    /// Write a source OUI.
    pub fn write_source_oui(&mut self, oui: &[u8; DPCD_SIZE_IEEE_OUI]) -> Result<()> {
        self.aux
            .write(DPCD_ADDR_SOURCE_OUI, oui)
            .context("failed to write source OUI")
    }

    /// Select vendor-proprietary command mode.
    pub fn write_vendor_oui(&mut self) -> Result<()> {
        self.write_source_oui(&VENDOR_OUI)
    }
}

/// Map a failure value read from the command/status register to an error.
pub(crate) fn status_error(raw: u8) -> Error {
    let code = raw & COMMAND_MASK;
    if code == status::CRC_FAILURE {
        Error::CrcRejected
    } else {
        Error::Status { code }
    }
}
