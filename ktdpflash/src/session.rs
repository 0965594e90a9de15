//! Per-update session state.
//!
//! One [`SessionState`] value exists per update attempt, owned by the
//! sequencer and threaded through every protocol call. Nothing in this
//! crate keeps protocol state in globals, so independent sessions to
//! distinct devices cannot interfere.

/// Synthetic progress allotment for the flash-programming phase.
///
/// The device gives no fine-grained progress signal while it programs
/// flash, so the install poll loop spreads this many bytes of estimated
/// progress across the reported programming time.
pub const FLASH_PROGRAM_COUNT: u64 = 100_000;

/// Mutable state of a single update attempt.
///
/// Created when an update starts, mutated by the bootstrap and transfer
/// layers, and discarded when the update ends, on success or failure.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Flash id reported by the ISP driver.
    pub flash_id: u16,
    /// Flash size in KiB reported by the ISP driver.
    pub flash_size_kb: u16,
    /// Flash programming time in seconds (zero is normalized to 10).
    pub flash_program_time_s: u16,
    /// Whether the device requires signed (secure) firmware.
    pub secure_auth_required: bool,
    /// Bytes confirmed so far, including the synthesized install share.
    pub bytes_confirmed: u64,
    /// Total bytes expected over the whole update.
    pub bytes_total_expected: u64,
    /// Total firmware payload announced to the device.
    pub total_payload_announced: u64,
}

impl SessionState {
    /// Start a session for an update pushing `driver_len` bytes of ISP
    /// driver plus `payload_announced` bytes of firmware payload.
    ///
    /// Secure mode is assumed until the ISP driver reports otherwise.
    pub fn new(driver_len: u64, payload_announced: u64) -> Self {
        Self {
            flash_id: 0,
            flash_size_kb: 0,
            flash_program_time_s: 10,
            secure_auth_required: true,
            bytes_confirmed: 0,
            bytes_total_expected: driver_len + payload_announced + FLASH_PROGRAM_COUNT,
            total_payload_announced: payload_announced,
        }
    }

    /// Record the flash geometry reported by the ISP driver.
    pub fn set_flash_info(&mut self, flash_id: u16, flash_size_kb: u16, program_time_s: u16) {
        self.flash_id = flash_id;
        self.flash_size_kb = flash_size_kb;
        self.flash_program_time_s = if program_time_s == 0 { 10 } else { program_time_s };
    }

    /// Whether the reported flash is large enough to hold two banks.
    ///
    /// Dual-bank updates need 2 MiB of flash; smaller parts hold a
    /// single image. Known only after the ISP driver's flash report.
    pub fn dual_bank_capable(&self) -> bool {
        self.flash_size_kb >= 2048
    }

    /// Drop `bytes` of never-sent secure material from the totals.
    ///
    /// Called when the ISP driver reports non-secure mode: certificates
    /// and signature blocks stay on the host.
    pub fn drop_secure_payload(&mut self, bytes: u64) {
        self.secure_auth_required = false;
        self.total_payload_announced = self.total_payload_announced.saturating_sub(bytes);
        self.bytes_total_expected = self.bytes_total_expected.saturating_sub(bytes);
    }

    /// Advance confirmed progress, clamped to the expected total.
    pub fn advance(&mut self, bytes: u64) {
        self.bytes_confirmed = self
            .bytes_confirmed
            .saturating_add(bytes)
            .min(self.bytes_total_expected);
    }

    /// Snap progress to completion once the install finishes.
    pub fn snap_complete(&mut self) {
        self.bytes_confirmed = self.bytes_total_expected;
    }

    /// Synthesized progress per install poll, given the poll interval.
    pub fn install_progress_step(&self, poll_interval_ms: u64) -> u64 {
        let polls = (u64::from(self.flash_program_time_s) * 1000 / poll_interval_ms).max(1);
        FLASH_PROGRAM_COUNT / polls
    }

    /// Progress in percent, 0..=100.
    pub fn progress_percent(&self) -> u8 {
        if self.bytes_total_expected == 0 {
            return 100;
        }
        ((self.bytes_confirmed * 100) / self.bytes_total_expected) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_totals() {
        let session = SessionState::new(1000, 5000);
        assert_eq!(session.bytes_total_expected, 6000 + FLASH_PROGRAM_COUNT);
        assert_eq!(session.total_payload_announced, 5000);
        assert!(session.secure_auth_required);
    }

    #[test]
    fn test_zero_program_time_normalized() {
        let mut session = SessionState::new(0, 0);
        session.set_flash_info(0xC220, 4096, 0);
        assert_eq!(session.flash_program_time_s, 10);
        session.set_flash_info(0xC220, 4096, 25);
        assert_eq!(session.flash_program_time_s, 25);
    }

    #[test]
    fn test_drop_secure_payload() {
        let mut session = SessionState::new(100, 10_000);
        session.drop_secure_payload(4096);
        assert!(!session.secure_auth_required);
        assert_eq!(session.total_payload_announced, 10_000 - 4096);
        assert_eq!(
            session.bytes_total_expected,
            100 + 10_000 + FLASH_PROGRAM_COUNT - 4096
        );
    }

    #[test]
    fn test_advance_clamps_and_snap_completes() {
        let mut session = SessionState::new(0, 10);
        session.advance(u64::MAX);
        assert_eq!(session.bytes_confirmed, session.bytes_total_expected);
        let mut session = SessionState::new(0, 10);
        session.advance(5);
        assert!(session.progress_percent() < 100);
        session.snap_complete();
        assert_eq!(session.progress_percent(), 100);
    }

    #[test]
    fn test_dual_bank_capability_follows_flash_size() {
        let mut session = SessionState::new(0, 0);
        assert!(!session.dual_bank_capable());
        session.set_flash_info(0xC220, 1024, 10);
        assert!(!session.dual_bank_capable());
        session.set_flash_info(0xC220, 2048, 10);
        assert!(session.dual_bank_capable());
    }

    #[test]
    fn test_install_progress_step() {
        let mut session = SessionState::new(0, 0);
        session.set_flash_info(1, 4096, 10);
        // 10 s at 50 ms polls -> 200 steps
        assert_eq!(session.install_progress_step(50), FLASH_PROGRAM_COUNT / 200);
    }
}
