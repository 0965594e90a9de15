//! Secure AUX-ISP updater implementation.

use {
    super::{
        BANK_MAX_WAIT, BANK_POLL_INTERVAL, CODE_LOADING_MAX_WAIT, CODE_LOADING_POLL_INTERVAL,
        DRIVER_MAX_WAIT, DRIVER_POLL_INTERVAL, EXECUTE_MAX_WAIT, EXECUTE_POLL_INTERVAL,
        FORWARD_MAX_WAIT, FORWARD_POLL_INTERVAL, FW_UPDATE_MODE_MAX_WAIT,
        FW_UPDATE_MODE_POLL_INTERVAL, INSTALL_MAX_POLLS, INSTALL_POLL_INTERVAL, PREPARE_MAX_WAIT,
        PREPARE_POLL_INTERVAL, REGION_MAX_WAIT, REGION_POLL_INTERVAL,
    },
    crate::{
        aux::AuxChannel,
        device::{DevPort, DeviceInfo, FlashBank, FwRunState},
        error::{Error, Result, ResultExt},
        image::{
            AppImageLayout, FirmwarePackage,
            secure::CERTIFICATES_SIZE,
        },
        protocol::{
            Command, CommandChannel, send_payload,
            dpcd::{DPCD_ADDR_BRANCH_HW_REV, DPCD_ADDR_CMD_STATUS_REG, DPCD_ADDR_FW_RUN_STATE},
            handshake::status_error,
            status,
        },
        session::SessionState,
        target::{ChipFamily, Updater},
    },
    byteorder::{BigEndian, ReadBytesExt},
    log::{debug, info, warn},
    std::thread,
};

/// Updater for Jaguar and Mustang branch devices over an AUX channel.
pub struct SecureAuxIspUpdater<C: AuxChannel> {
    aux: C,
    family: ChipFamily,
    layout: AppImageLayout,
}

impl<C: AuxChannel> SecureAuxIspUpdater<C> {
    /// Create an updater over `aux` using the family's default layout.
    pub fn new(aux: C, family: ChipFamily) -> Self {
        Self {
            aux,
            family,
            layout: family.default_layout(),
        }
    }

    /// Override the region layout used to interpret update files.
    #[must_use]
    pub fn with_layout(mut self, layout: AppImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Read the firmware run state register.
    pub fn run_state(&mut self) -> Result<FwRunState> {
        let mut val = [0u8; 1];
        self.aux
            .read(DPCD_ADDR_FW_RUN_STATE, &mut val)
            .context("failed to read firmware run state")?;
        Ok(FwRunState::from_raw(val[0]))
    }

    /// Unlock the ISP registers if the application is still running.
    fn prepare_for_isp_mode(&mut self) -> Result<()> {
        let state = self.run_state()?;
        if state == FwRunState::App {
            CommandChannel::new(&mut self.aux)
                .transact(Command::PrepareForIspMode, PREPARE_MAX_WAIT, PREPARE_POLL_INTERVAL)
                .context("failed to prepare for ISP mode")?;
        } else {
            debug!("skipping ISP preparation, run state is {state}");
        }
        Ok(())
    }

    /// Announce the ISP driver size and switch to code-loading mode.
    fn enter_code_loading_mode(&mut self, driver_len: u32) -> Result<()> {
        let mut chan = CommandChannel::new(&mut self.aux);
        chan.write_reply_data(&driver_len.to_le_bytes())
            .context("failed to announce ISP driver size")?;
        chan.transact(
            Command::EnterCodeLoadingMode,
            CODE_LOADING_MAX_WAIT,
            CODE_LOADING_POLL_INTERVAL,
        )
        .context("failed to enter code loading mode")
    }

    /// Execute the ISP driver and collect its flash report.
    ///
    /// The driver answers with the secure mode in the parameter register
    /// and a six-byte big-endian flash report (id, size in KiB,
    /// programming time in seconds) in the reply data.
    fn execute_isp_driver(&mut self, session: &mut SessionState) -> Result<()> {
        let mut chan = CommandChannel::new(&mut self.aux);
        chan.send_command(Command::ExecuteRamCode)?;
        if let Err(err) = chan.await_command_cleared(EXECUTE_MAX_WAIT, EXECUTE_POLL_INTERVAL) {
            let invalid =
                matches!(err.root(), Error::Status { code } if *code == status::INVALID_IMAGE);
            let msg = if invalid {
                "ISP driver rejected as invalid image"
            } else {
                "ISP driver did not start"
            };
            return Err(err.context(msg));
        }

        match chan.read_param()? {
            status::SECURE_ENABLED => debug!("secure mode: signed firmware required"),
            status::SECURE_DISABLED => {
                debug!("secure mode disabled, certificates stay on the host");
                session.drop_secure_payload(CERTIFICATES_SIZE as u64);
            }
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected secure mode report {other:#04x}"
                )));
            }
        }

        let mut reply = [0u8; 12];
        let len = chan.read_reply_data(&mut reply)?;
        if len < 6 {
            return Err(Error::Protocol(format!(
                "flash report is {len} bytes, expected 6"
            )));
        }
        let mut report = &reply[..6];
        let flash_id = report.read_u16::<BigEndian>()?;
        let flash_size_kb = report.read_u16::<BigEndian>()?;
        let program_time_s = report.read_u16::<BigEndian>()?;
        session.set_flash_info(flash_id, flash_size_kb, program_time_s);
        info!(
            "flash id {flash_id:#06x}, {flash_size_kb} KiB, programs in ~{} s",
            session.flash_program_time_s
        );

        if flash_size_kb == 0 {
            return Err(if flash_id != 0 {
                Error::FlashNotSupported { flash_id }
            } else {
                Error::FlashNotConnected
            });
        }
        if !session.dual_bank_capable() {
            debug!("flash of {flash_size_kb} KiB cannot hold dual banks");
        }
        Ok(())
    }

    /// Load the ISP driver into device RAM and start it.
    fn send_isp_driver(
        &mut self,
        firmware: &FirmwarePackage,
        session: &mut SessionState,
        progress: &mut dyn FnMut(&str, u64, u64),
    ) -> Result<()> {
        self.prepare_for_isp_mode()?;
        self.enter_code_loading_mode(firmware.isp_driver().len() as u32)?;
        send_payload(
            &mut self.aux,
            session,
            firmware.isp_driver(),
            DRIVER_MAX_WAIT,
            DRIVER_POLL_INTERVAL,
            &mut |done, total| progress("isp driver", done, total),
        )
        .context("failed to send ISP driver")?;
        self.execute_isp_driver(session)
    }

    /// Announce the region sizes and enter firmware update mode.
    ///
    /// The long wait covers the flash erase some parts perform here.
    fn enter_fw_update_mode(&mut self, firmware: &FirmwarePackage) -> Result<()> {
        let mut chan = CommandChannel::new(&mut self.aux);
        chan.write_reply_data(&firmware.update_mode_descriptor())
            .context("failed to announce image region sizes")?;
        chan.transact(
            Command::EnterFwUpdateMode,
            FW_UPDATE_MODE_MAX_WAIT,
            FW_UPDATE_MODE_POLL_INTERVAL,
        )
        .context("failed to enter firmware update mode")
    }

    fn send_region(
        &mut self,
        session: &mut SessionState,
        name: &str,
        data: &[u8],
        progress: &mut dyn FnMut(&str, u64, u64),
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        debug!("sending {name} ({} bytes)", data.len());
        send_payload(
            &mut self.aux,
            session,
            data,
            REGION_MAX_WAIT,
            REGION_POLL_INTERVAL,
            &mut |done, total| progress(name, done, total),
        )
        .context(&format!("failed to send {name}"))
    }

    /// Program the staged images into flash.
    ///
    /// The device gives no progress signal while programming, so each
    /// poll synthesizes a share of [`crate::session::FLASH_PROGRAM_COUNT`]
    /// spread over the reported programming time, and progress snaps to
    /// complete on success.
    fn install_images(
        &mut self,
        session: &mut SessionState,
        progress: &mut dyn FnMut(&str, u64, u64),
    ) -> Result<()> {
        CommandChannel::new(&mut self.aux).send_command(Command::InstallImages)?;
        let step = session.install_progress_step(INSTALL_POLL_INTERVAL.as_millis() as u64);

        for _ in 0..INSTALL_MAX_POLLS {
            let mut val = [0u8; 1];
            self.aux
                .read(DPCD_ADDR_CMD_STATUS_REG, &mut val)
                .context("failed to read command/status register")?;

            if val[0] != Command::InstallImages.with_confirmation() {
                if val[0] == Command::InstallImages.id() {
                    session.snap_complete();
                    progress("install", session.bytes_confirmed, session.bytes_total_expected);
                    return Ok(());
                }
                return Err(status_error(val[0]).context("image install failed"));
            }
            if crate::is_interrupt_requested() {
                return Err(Error::Cancelled);
            }

            thread::sleep(INSTALL_POLL_INTERVAL);
            session.advance(step);
            progress("install", session.bytes_confirmed, session.bytes_total_expected);
        }
        Err(Error::Timeout("waiting for image install to finish".into()))
    }

    fn run_update(
        &mut self,
        firmware: &FirmwarePackage,
        session: &mut SessionState,
        progress: &mut dyn FnMut(&str, u64, u64),
    ) -> Result<()> {
        CommandChannel::new(&mut self.aux).write_vendor_oui()?;

        if firmware.isp_driver().is_empty() {
            debug!("no ISP driver bundled, assuming one is already running");
        } else {
            self.send_isp_driver(firmware, session, progress)?;
        }

        self.enter_fw_update_mode(firmware)?;

        if session.secure_auth_required {
            self.send_region(session, "certificates", firmware.certificates(), progress)?;
        }
        self.send_region(session, "esm", firmware.esm_code(), progress)?;
        self.send_region(session, "app code", firmware.app_code(), progress)?;
        self.send_region(session, "init data", firmware.app_init_data(), progress)?;
        self.send_region(session, "cmdb", firmware.cmdb(), progress)?;
        self.send_region(session, "app id", firmware.app_id(), progress)?;

        self.install_images(session, progress)
    }

    /// Request a system reset. The device drops off the AUX channel
    /// without confirming, so this does not wait.
    fn send_reset(&mut self) -> Result<()> {
        CommandChannel::new(&mut self.aux)
            .send_command(Command::ResetSystem)
            .context("failed to request system reset")
    }

    /// Forward AUX transactions to the downstream port `port`.
    pub fn enable_aux_forward(&mut self, port: DevPort) -> Result<()> {
        let mut chan = CommandChannel::new(&mut self.aux);
        let saved_oui = chan.read_source_oui()?;
        chan.write_vendor_oui()?;
        let result = chan.write_param(port.param()).and_then(|()| {
            chan.transact(Command::EnableAuxForward, FORWARD_MAX_WAIT, FORWARD_POLL_INTERVAL)
        });
        if let Err(err) = chan.clear_command() {
            warn!("failed to clear command register after forward toggle: {err}");
        }
        if let Err(err) = chan.write_source_oui(&saved_oui) {
            warn!("failed to restore source OUI: {err}");
        }
        result.context("failed to enable AUX forwarding")
    }

    /// Stop forwarding AUX transactions downstream.
    pub fn disable_aux_forward(&mut self) -> Result<()> {
        let mut chan = CommandChannel::new(&mut self.aux);
        let saved_oui = chan.read_source_oui()?;
        chan.write_vendor_oui()?;
        let result =
            chan.transact(Command::DisableAuxForward, FORWARD_MAX_WAIT, FORWARD_POLL_INTERVAL);
        if let Err(err) = chan.clear_command() {
            warn!("failed to clear command register after forward toggle: {err}");
        }
        if let Err(err) = chan.write_source_oui(&saved_oui) {
            warn!("failed to restore source OUI: {err}");
        }
        result.context("failed to disable AUX forwarding")
    }
}

impl<C: AuxChannel> Updater for SecureAuxIspUpdater<C> {
    fn family(&self) -> ChipFamily {
        self.family
    }

    fn probe(&mut self) -> Result<DeviceInfo> {
        let run_state = self.run_state()?;
        let mut ident = [0u8; 16];
        self.aux
            .read(DPCD_ADDR_BRANCH_HW_REV, &mut ident)
            .context("failed to read identity block")?;
        Ok(DeviceInfo {
            chip_rev: ident[0],
            fw_version: (ident[1], ident[2], ident[3]),
            customer_fw_version: (u16::from(ident[6]) << 8) | u16::from(ident[11]),
            customer_project_id: ident[12],
            chip_type: ident[13],
            run_state,
        })
    }

    fn detach(&mut self) -> Result<()> {
        self.prepare_for_isp_mode()
    }

    fn attach(&mut self) -> Result<()> {
        self.send_reset()
    }

    fn prepare_firmware(&self, data: &[u8]) -> Result<FirmwarePackage> {
        FirmwarePackage::parse(data, self.layout)
    }

    fn write_firmware(
        &mut self,
        firmware: &FirmwarePackage,
        progress: &mut dyn FnMut(&str, u64, u64),
    ) -> Result<()> {
        let mut session = SessionState::new(
            firmware.isp_driver().len() as u64,
            firmware.total_payload_size(),
        );

        let result = self.run_update(firmware, &mut session, progress);

        // the device must be reset whether the update worked or not
        if let Err(reset_err) = self.send_reset() {
            if result.is_ok() {
                return Err(reset_err.context("failed to reset device after update"));
            }
            warn!("device reset after failed update also failed: {reset_err}");
        }
        result
    }

    fn active_flash_bank(&mut self) -> Result<FlashBank> {
        let mut chan = CommandChannel::new(&mut self.aux);
        let saved_oui = chan.read_source_oui()?;
        chan.write_vendor_oui()?;
        let result = chan
            .transact(Command::GetActiveFlashBank, BANK_MAX_WAIT, BANK_POLL_INTERVAL)
            .and_then(|()| chan.read_param())
            .map(FlashBank::from_raw);
        if let Err(err) = chan.clear_command() {
            warn!("failed to clear command register after bank query: {err}");
        }
        if let Err(err) = chan.write_source_oui(&saved_oui) {
            warn!("failed to restore source OUI: {err}");
        }
        result.context("failed to query active flash bank")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::dpcd::{
        COMMAND_MASK, DPCD_ADDR_PARAM_REG, DPCD_ADDR_SOURCE_OUI, VENDOR_OUI,
    };
    use std::collections::HashMap;

    /// Flat register-map fake. Writes to the command/status register are
    /// processed instantly: the confirmation bit is cleared in place.
    struct MapAux {
        mem: HashMap<u32, u8>,
        writes: Vec<(u32, Vec<u8>)>,
    }

    impl MapAux {
        fn new() -> Self {
            Self {
                mem: HashMap::new(),
                writes: Vec::new(),
            }
        }

        fn seed(&mut self, address: u32, data: &[u8]) {
            for (i, b) in data.iter().enumerate() {
                self.mem.insert(address + i as u32, *b);
            }
        }
    }

    impl AuxChannel for MapAux {
        fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = *self.mem.get(&(address + i as u32)).unwrap_or(&0);
            }
            Ok(())
        }

        fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
            self.writes.push((address, data.to_vec()));
            if address == DPCD_ADDR_CMD_STATUS_REG {
                self.mem.insert(address, data[0] & COMMAND_MASK);
            } else {
                let copy = data.to_vec();
                self.seed(address, &copy);
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "map"
        }
    }

    #[test]
    fn test_probe_decodes_identity_block() {
        let mut aux = MapAux::new();
        aux.seed(DPCD_ADDR_FW_RUN_STATE, &[2]);
        let mut ident = [0u8; 16];
        ident[0] = 0xB0; // chip revision
        ident[1] = 3;
        ident[2] = 8;
        ident[3] = 12;
        ident[6] = 0x12;
        ident[11] = 0x34;
        ident[12] = 0x05;
        ident[13] = 0x01;
        aux.seed(DPCD_ADDR_BRANCH_HW_REV, &ident);

        let mut updater = SecureAuxIspUpdater::new(aux, ChipFamily::Jaguar);
        let info = updater.probe().unwrap();
        assert_eq!(info.run_state, FwRunState::App);
        assert_eq!(info.chip_rev, 0xB0);
        assert_eq!(info.fw_version_string(), "3.8.12");
        assert_eq!(info.customer_fw_version, 0x1234);
        assert_eq!(info.customer_project_id, 0x05);
        assert_eq!(ChipFamily::from_chip_type(info.chip_type).unwrap(), ChipFamily::Jaguar);
    }

    #[test]
    fn test_flash_bank_query_restores_oui() {
        let mut aux = MapAux::new();
        let host_oui = [0x11, 0x22, 0x33];
        aux.seed(DPCD_ADDR_SOURCE_OUI, &host_oui);
        aux.seed(DPCD_ADDR_PARAM_REG, &[1]);

        let mut updater = SecureAuxIspUpdater::new(aux, ChipFamily::Mustang);
        let bank = updater.active_flash_bank().unwrap();
        assert_eq!(bank, FlashBank::B);

        let oui_writes: Vec<&Vec<u8>> = updater
            .aux
            .writes
            .iter()
            .filter(|(addr, _)| *addr == DPCD_ADDR_SOURCE_OUI)
            .map(|(_, data)| data)
            .collect();
        assert_eq!(oui_writes, vec![&VENDOR_OUI.to_vec(), &host_oui.to_vec()]);
    }

    #[test]
    fn test_detach_prepares_only_when_app_running() {
        let mut aux = MapAux::new();
        aux.seed(DPCD_ADDR_FW_RUN_STATE, &[0]); // iROM
        let mut updater = SecureAuxIspUpdater::new(aux, ChipFamily::Jaguar);
        updater.detach().unwrap();
        assert!(updater.aux.writes.is_empty());

        let mut aux = MapAux::new();
        aux.seed(DPCD_ADDR_FW_RUN_STATE, &[2]); // application
        let mut updater = SecureAuxIspUpdater::new(aux, ChipFamily::Jaguar);
        updater.detach().unwrap();
        assert_eq!(
            updater.aux.writes,
            vec![(
                DPCD_ADDR_CMD_STATUS_REG,
                vec![Command::PrepareForIspMode.with_confirmation()]
            )]
        );
    }

    #[test]
    fn test_attach_sends_reset_without_waiting() {
        let mut updater = SecureAuxIspUpdater::new(MapAux::new(), ChipFamily::Jaguar);
        updater.attach().unwrap();
        assert_eq!(
            updater.aux.writes,
            vec![(
                DPCD_ADDR_CMD_STATUS_REG,
                vec![Command::ResetSystem.with_confirmation()]
            )]
        );
    }
}
