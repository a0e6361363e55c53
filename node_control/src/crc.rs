//! CRC-8 flavours spoken by the sensors on the node.

/// Sensirion CRC-8: polynomial 0x31, init 0xff, MSB first.
pub fn sensirion(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xff;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Maxim/Dallas one-wire CRC-8: polynomial 0x31 reflected (0x8c), init 0, LSB first.
pub fn maxim(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for byte in data {
        let mut b = *byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8c;
            }
            b >>= 1;
        }
    }
    crc
}

#[cfg(test)]
mod test {
    use crate::crc::{maxim, sensirion};

    #[test]
    fn sensirion_datasheet_example() {
        assert_eq!(sensirion(&[0xbe, 0xef]), 0x92);
    }

    #[test]
    fn maxim_power_on_scratchpad() {
        let scratchpad = [0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10];
        assert_eq!(maxim(&scratchpad), 0x1c);
        // appending the crc gives zero
        assert_eq!(maxim(&[0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x1c]), 0);
    }
}
