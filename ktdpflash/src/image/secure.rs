//! Secure firmware image layout.
//!
//! A flashed application image is a fixed 1 MiB payload whose regions
//! live at protocol-fixed offsets:
//!
//! ```text
//! 0x00000  ESM certificate        (1 KiB)
//! 0x00400  App certificate        (1 KiB)
//! 0x00800  ESM RSA signature      (1 KiB)
//! 0x00C00  App RSA signature      (1 KiB)
//! 0x01000  ESM code               (up to 256 KiB)
//! 0x41000  App code               (up to 384 KiB, 640 KiB with XIP)
//! 0xA1000  App init data          (normal layout)
//! 0xE1000  App init data          (XIP layout)
//! 0xFE000  CMDB                   (optional)
//! 0xFFFE0  Application id         (32 bytes)
//! ```
//!
//! An update package is that payload with the ISP driver binary appended.
//! The region lengths actually transferred come from the
//! [`AppImageLayout`] metadata, not from the slab itself; accessors here
//! hand out borrowed slices, nothing is copied eagerly.

use crate::error::{Error, Result};

/// Size of one certificate.
pub const CERTIFICATE_SIZE: usize = 0x400;

/// Size of one RSA signature block.
pub const RSA_SIGNATURE_BLOCK_SIZE: usize = 0x400;

/// Combined size of both certificates and both signature blocks.
pub const CERTIFICATES_SIZE: usize = CERTIFICATE_SIZE * 2 + RSA_SIGNATURE_BLOCK_SIZE * 2;

/// Size of the standard application payload.
pub const STD_PAYLOAD_SIZE: usize = 0x10_0000;

/// Offset of the ESM code region.
pub const ESM_PAYLOAD_START: usize = CERTIFICATES_SIZE;

/// Maximum ESM code size.
pub const ESM_BLOCK_SIZE: usize = 0x4_0000;

/// Offset of the application code region.
pub const APP_PAYLOAD_START: usize = ESM_PAYLOAD_START + ESM_BLOCK_SIZE;

/// Maximum application code size in the normal layout.
pub const APP_CODE_NORMAL_BLOCK_SIZE: usize = 0x6_0000;

/// Maximum application code size when execute-in-place is enabled.
pub const APP_CODE_EXTEND_BLOCK_SIZE: usize = 0xA_0000;

/// Offset of the application init data in the normal layout.
pub const APP_NORMAL_INIT_DATA_START: usize = APP_PAYLOAD_START + APP_CODE_NORMAL_BLOCK_SIZE;

/// Offset of the application init data in the XIP layout.
pub const APP_EXTEND_INIT_DATA_START: usize = APP_PAYLOAD_START + APP_CODE_EXTEND_BLOCK_SIZE;

/// Offset of the CMDB block.
pub const CMDB_BLOCK_START: usize = 0xF_E000;

/// Size of the application identifier.
pub const APP_ID_SIZE: usize = 32;

/// Offset of the application identifier.
pub const APP_ID_START: usize = STD_PAYLOAD_SIZE - APP_ID_SIZE;

/// Declared region sizes of an application image.
///
/// This is the metadata the firmware container supplies alongside the
/// payload: how much of each fixed region is actually occupied, whether
/// the app runs execute-in-place, and how large the optional CMDB is
/// (zero means absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppImageLayout {
    /// ESM code size in bytes.
    pub esm_size: u32,
    /// Application code size in bytes.
    pub app_code_size: u32,
    /// Application init data size in bytes.
    pub app_init_data_size: u16,
    /// CMDB size in bytes; zero means no CMDB is bundled.
    pub cmdb_size: u16,
    /// Whether the application executes in place from flash.
    pub xip_enabled: bool,
}

impl Default for AppImageLayout {
    fn default() -> Self {
        Self {
            esm_size: ESM_BLOCK_SIZE as u32,
            app_code_size: APP_CODE_NORMAL_BLOCK_SIZE as u32,
            app_init_data_size: 0x1000,
            cmdb_size: 0,
            xip_enabled: false,
        }
    }
}

impl AppImageLayout {
    /// Offset of the app init data for this layout.
    fn app_init_data_start(&self) -> usize {
        if self.xip_enabled {
            APP_EXTEND_INIT_DATA_START
        } else {
            APP_NORMAL_INIT_DATA_START
        }
    }

    /// Validate that every declared region fits its fixed slot.
    fn validate(&self) -> Result<()> {
        if self.esm_size as usize > ESM_BLOCK_SIZE {
            return Err(Error::InvalidFirmware(format!(
                "ESM code size {} exceeds block size {ESM_BLOCK_SIZE}",
                self.esm_size
            )));
        }
        let app_block = if self.xip_enabled {
            APP_CODE_EXTEND_BLOCK_SIZE
        } else {
            APP_CODE_NORMAL_BLOCK_SIZE
        };
        if self.app_code_size as usize > app_block {
            return Err(Error::InvalidFirmware(format!(
                "app code size {} exceeds block size {app_block}",
                self.app_code_size
            )));
        }
        if self.app_init_data_start() + usize::from(self.app_init_data_size) > CMDB_BLOCK_START {
            return Err(Error::InvalidFirmware(format!(
                "app init data size {} overruns CMDB block",
                self.app_init_data_size
            )));
        }
        if CMDB_BLOCK_START + usize::from(self.cmdb_size) > APP_ID_START {
            return Err(Error::InvalidFirmware(format!(
                "CMDB size {} overruns application id",
                self.cmdb_size
            )));
        }
        Ok(())
    }
}

/// An update package: application payload plus ISP driver binary.
#[derive(Debug, Clone)]
pub struct FirmwarePackage {
    isp_driver: Vec<u8>,
    app_image: Vec<u8>,
    layout: AppImageLayout,
}

impl FirmwarePackage {
    /// Build a package from separate driver and application buffers.
    pub fn new(isp_driver: Vec<u8>, app_image: Vec<u8>, layout: AppImageLayout) -> Result<Self> {
        if app_image.len() != STD_PAYLOAD_SIZE {
            return Err(Error::InvalidFirmware(format!(
                "application payload is {} bytes, expected {STD_PAYLOAD_SIZE}",
                app_image.len()
            )));
        }
        layout.validate()?;
        Ok(Self {
            isp_driver,
            app_image,
            layout,
        })
    }

    /// Parse a combined update file: 1 MiB application payload with the
    /// ISP driver appended.
    pub fn parse(data: &[u8], layout: AppImageLayout) -> Result<Self> {
        if data.len() < STD_PAYLOAD_SIZE {
            return Err(Error::InvalidFirmware(format!(
                "update file is {} bytes, smaller than the {STD_PAYLOAD_SIZE}-byte payload",
                data.len()
            )));
        }
        let (app, driver) = data.split_at(STD_PAYLOAD_SIZE);
        Self::new(driver.to_vec(), app.to_vec(), layout)
    }

    /// Declared region layout.
    pub fn layout(&self) -> &AppImageLayout {
        &self.layout
    }

    /// ISP driver binary.
    pub fn isp_driver(&self) -> &[u8] {
        &self.isp_driver
    }

    /// Certificates and RSA signature blocks (secure mode only).
    pub fn certificates(&self) -> &[u8] {
        &self.app_image[..CERTIFICATES_SIZE]
    }

    /// ESM code region.
    pub fn esm_code(&self) -> &[u8] {
        let start = ESM_PAYLOAD_START;
        &self.app_image[start..start + self.layout.esm_size as usize]
    }

    /// Application code region.
    pub fn app_code(&self) -> &[u8] {
        let start = APP_PAYLOAD_START;
        &self.app_image[start..start + self.layout.app_code_size as usize]
    }

    /// Application init data region.
    pub fn app_init_data(&self) -> &[u8] {
        let start = self.layout.app_init_data_start();
        &self.app_image[start..start + usize::from(self.layout.app_init_data_size)]
    }

    /// CMDB region; empty when no CMDB is bundled.
    pub fn cmdb(&self) -> &[u8] {
        &self.app_image[CMDB_BLOCK_START..CMDB_BLOCK_START + usize::from(self.layout.cmdb_size)]
    }

    /// Application identifier region.
    pub fn app_id(&self) -> &[u8] {
        &self.app_image[APP_ID_START..APP_ID_START + APP_ID_SIZE]
    }

    /// Total payload the device will be told to expect, certificates
    /// included. Non-secure devices subtract the certificate share from
    /// the session totals instead.
    pub fn total_payload_size(&self) -> u64 {
        CERTIFICATES_SIZE as u64
            + u64::from(self.layout.esm_size)
            + u64::from(self.layout.app_code_size)
            + u64::from(self.layout.app_init_data_size)
            + u64::from(self.layout.cmdb_size)
            + APP_ID_SIZE as u64
    }

    /// The 12-byte size descriptor announced when entering update mode:
    /// ESM size (u32), app code size (u32), init data size (u16), then
    /// the CMDB size with bit 15 flagging execute-in-place, all
    /// little-endian.
    pub fn update_mode_descriptor(&self) -> [u8; 12] {
        let mut desc = [0u8; 12];
        desc[0..4].copy_from_slice(&self.layout.esm_size.to_le_bytes());
        desc[4..8].copy_from_slice(&self.layout.app_code_size.to_le_bytes());
        desc[8..10].copy_from_slice(&self.layout.app_init_data_size.to_le_bytes());
        let flags = (if self.layout.xip_enabled { 1u16 << 15 } else { 0 }) | self.layout.cmdb_size;
        desc[10..12].copy_from_slice(&flags.to_le_bytes());
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked_image() -> Vec<u8> {
        let mut image = vec![0u8; STD_PAYLOAD_SIZE];
        image[0] = 0xC0; // certificates
        image[ESM_PAYLOAD_START] = 0xE5;
        image[APP_PAYLOAD_START] = 0xA9;
        image[APP_NORMAL_INIT_DATA_START] = 0x1D;
        image[CMDB_BLOCK_START] = 0xCB;
        image[APP_ID_START] = 0x1F;
        image
    }

    #[test]
    fn test_fixed_offsets() {
        assert_eq!(ESM_PAYLOAD_START, 0x1000);
        assert_eq!(APP_PAYLOAD_START, 0x41000);
        assert_eq!(APP_NORMAL_INIT_DATA_START, 0xA1000);
        assert_eq!(APP_EXTEND_INIT_DATA_START, 0xE1000);
        assert_eq!(APP_ID_START, 0xFFFE0);
    }

    #[test]
    fn test_regions_slice_at_fixed_offsets() {
        let layout = AppImageLayout {
            cmdb_size: 0x100,
            ..AppImageLayout::default()
        };
        let fw = FirmwarePackage::new(vec![0xDD; 64], marked_image(), layout).unwrap();
        assert_eq!(fw.certificates().len(), CERTIFICATES_SIZE);
        assert_eq!(fw.certificates()[0], 0xC0);
        assert_eq!(fw.esm_code()[0], 0xE5);
        assert_eq!(fw.app_code()[0], 0xA9);
        assert_eq!(fw.app_init_data()[0], 0x1D);
        assert_eq!(fw.cmdb().len(), 0x100);
        assert_eq!(fw.cmdb()[0], 0xCB);
        assert_eq!(fw.app_id().len(), APP_ID_SIZE);
        assert_eq!(fw.app_id()[0], 0x1F);
    }

    #[test]
    fn test_xip_moves_init_data() {
        let mut image = marked_image();
        image[APP_EXTEND_INIT_DATA_START] = 0x2D;
        let layout = AppImageLayout {
            xip_enabled: true,
            ..AppImageLayout::default()
        };
        let fw = FirmwarePackage::new(Vec::new(), image, layout).unwrap();
        assert_eq!(fw.app_init_data()[0], 0x2D);
    }

    #[test]
    fn test_parse_splits_driver() {
        let mut data = marked_image();
        data.extend_from_slice(&[0xDE; 300]);
        let fw = FirmwarePackage::parse(&data, AppImageLayout::default()).unwrap();
        assert_eq!(fw.isp_driver().len(), 300);
        assert_eq!(fw.isp_driver()[0], 0xDE);
    }

    #[test]
    fn test_parse_rejects_short_file() {
        let err = FirmwarePackage::parse(&[0u8; 100], AppImageLayout::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidFirmware(_)));
    }

    #[test]
    fn test_layout_validation() {
        let layout = AppImageLayout {
            esm_size: ESM_BLOCK_SIZE as u32 + 1,
            ..AppImageLayout::default()
        };
        assert!(FirmwarePackage::new(Vec::new(), marked_image(), layout).is_err());

        let layout = AppImageLayout {
            app_code_size: APP_CODE_NORMAL_BLOCK_SIZE as u32 + 1,
            ..AppImageLayout::default()
        };
        assert!(FirmwarePackage::new(Vec::new(), marked_image(), layout).is_err());

        // the same size is fine once XIP widens the app block
        let layout = AppImageLayout {
            app_code_size: APP_CODE_NORMAL_BLOCK_SIZE as u32 + 1,
            xip_enabled: true,
            ..AppImageLayout::default()
        };
        assert!(FirmwarePackage::new(Vec::new(), marked_image(), layout).is_ok());
    }

    #[test]
    fn test_update_mode_descriptor_encoding() {
        let layout = AppImageLayout {
            esm_size: 0x1234,
            app_code_size: 0x5678,
            app_init_data_size: 0x9A,
            cmdb_size: 0x100,
            xip_enabled: true,
        };
        let fw = FirmwarePackage::new(Vec::new(), marked_image(), layout).unwrap();
        let desc = fw.update_mode_descriptor();
        assert_eq!(&desc[0..4], &0x1234u32.to_le_bytes());
        assert_eq!(&desc[4..8], &0x5678u32.to_le_bytes());
        assert_eq!(&desc[8..10], &0x9Au16.to_le_bytes());
        assert_eq!(&desc[10..12], &(0x8000u16 | 0x100).to_le_bytes());
    }

    #[test]
    fn test_total_payload_size() {
        let layout = AppImageLayout {
            esm_size: 100,
            app_code_size: 200,
            app_init_data_size: 10,
            cmdb_size: 0,
            xip_enabled: false,
        };
        let fw = FirmwarePackage::new(Vec::new(), marked_image(), layout).unwrap();
        assert_eq!(
            fw.total_payload_size(),
            CERTIFICATES_SIZE as u64 + 100 + 200 + 10 + APP_ID_SIZE as u64
        );
    }
}
