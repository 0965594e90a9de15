//! Proprietary CRC-16 used by the secure AUX-ISP protocol.
//!
//! Every 32 KiB payload window is checksummed with this CRC before the
//! device is told to process it. The algorithm is bit-serial, MSB first,
//! with both the initial value and the polynomial equal to `0x1021`. It
//! must match the receiver's implementation bit for bit; there is no
//! other integrity check on the transfer path.

/// Initial value for the proprietary CRC-16.
pub const CRC_INIT: u16 = 0x1021;

/// Polynomial for the proprietary CRC-16.
pub const CRC_POLY: u16 = 0x1021;

/// Compute the proprietary CRC-16 over a byte buffer.
#[must_use]
pub fn crc16_kinetic(buf: &[u8]) -> u16 {
    let mut crc = CRC_INIT;

    for byte in buf {
        let mut data = *byte;
        for _ in 0..8 {
            let flag = data ^ ((crc >> 8) as u8);
            crc <<= 1;
            if flag & 0x80 != 0 {
                crc ^= CRC_POLY;
            }
            data <<= 1;
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_returns_init() {
        assert_eq!(crc16_kinetic(&[]), CRC_INIT);
    }

    // Golden values pinned against the reference implementation.
    #[test]
    fn test_golden_vectors() {
        assert_eq!(crc16_kinetic(b"123456789"), 0x5E86);
        assert_eq!(crc16_kinetic(&[0x00]), 0x3331);
        assert_eq!(crc16_kinetic(&[0xFF; 16]), 0x10A3);
    }

    #[test]
    fn test_full_window_ramp() {
        let window: Vec<u8> = (0..32768u32).map(|i| (i & 0xFF) as u8).collect();
        assert_eq!(crc16_kinetic(&window), 0x55B9);
    }

    #[test]
    fn test_deterministic() {
        let buf = b"secure aux isp";
        assert_eq!(crc16_kinetic(buf), crc16_kinetic(buf));
    }
}
