//! Chunked payload transfer through the AUX window.
//!
//! Payloads of arbitrary length are pushed through the 32 KiB AUX window
//! one window at a time. Each window is written in at most 16-byte AUX
//! transactions, checksummed with the proprietary CRC-16, and confirmed
//! by the sink before the next window is sent. There is no retry at this
//! layer: any failure aborts the caller's whole operation.

use {
    crate::{
        aux::AuxChannel,
        error::{Result, ResultExt},
        protocol::{
            crc::crc16_kinetic,
            dpcd::{Command, DPCD_ADDR_AUX_WIN, DPCD_SIZE_AUX_WIN, MAX_AUX_WRITE},
            handshake::CommandChannel,
        },
        session::SessionState,
    },
    log::trace,
    std::time::Duration,
};

/// Send a payload through the AUX window, window by window.
///
/// The CRC for each window covers exactly the bytes of that window. On
/// each confirmation `session.bytes_confirmed` advances by the window
/// length and `progress` is invoked with the confirmed and expected
/// totals. Windows are strictly sequential.
pub fn send_payload<C: AuxChannel>(
    aux: &mut C,
    session: &mut SessionState,
    payload: &[u8],
    max_wait: Duration,
    poll_interval: Duration,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<()> {
    for window in payload.chunks(DPCD_SIZE_AUX_WIN) {
        // fill the AUX window in transport-sized sub-writes, in order
        let mut offset = 0u32;
        for sub in window.chunks(MAX_AUX_WRITE) {
            aux.write(DPCD_ADDR_AUX_WIN + offset, sub)
                .context("failed to write payload to AUX window")?;
            offset += sub.len() as u32;
        }

        // CRC of the current window only, little-endian in a 4-byte field
        let crc = u32::from(crc16_kinetic(window));
        trace!("window len {} crc {:#06x}", window.len(), crc);
        CommandChannel::new(&mut *aux)
            .write_reply_data(&crc.to_le_bytes())
            .context("failed to send chunk CRC to reply data register")?;

        CommandChannel::new(&mut *aux)
            .transact(Command::ChunkDataProcessed, max_wait, poll_interval)
            .context("target failed to process payload chunk")?;

        session.advance(window.len() as u64);
        progress(session.bytes_confirmed, session.bytes_total_expected);
    }

    Ok(())
}
