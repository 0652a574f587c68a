//! Byte-wise 16-bit checksum shared by the flight and ground software.
//!
//! The shuffle is the nibble-folded form of the `x^16 + x^12 + x^5 + 1`
//! shift register, but the protocol starts it from `0x1021` rather than from
//! the `0xFFFF`/`0x0000` presets library CRCs assume. Flight-side code
//! computes exactly this, so keep the seed explicit at every call.

/// Initial accumulator used for every checksum in the protocol.
pub const CRC_SEED: u16 = 0x1021;

/// Folds `data` into an accumulator starting at `seed`.
pub fn checksum(seed: u16, data: &[u8]) -> u16 {
    let mut msb = (seed >> 8) as u8;
    let mut lsb = (seed & 0xFF) as u8;

    for &c in data {
        let mut x = c ^ msb;
        x ^= x >> 4;
        msb = lsb ^ (x >> 3) ^ (x << 4);
        lsb = x ^ (x << 5);
    }

    (u16::from(msb) << 8) | u16::from(lsb)
}

/// Checksum with the protocol seed.
pub fn frame_checksum(data: &[u8]) -> u16 {
    checksum(CRC_SEED, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straight transcription of the integer arithmetic, masking after the
    /// shifts instead of relying on `u8` truncation.
    fn reference(seed: u16, data: &[u8]) -> u16 {
        let mut msb = u32::from(seed >> 8);
        let mut lsb = u32::from(seed & 0xFF);
        for &c in data {
            let mut x = u32::from(c) ^ msb;
            x ^= x >> 4;
            msb = (lsb ^ (x >> 3) ^ (x << 4)) & 0xFF;
            lsb = (x ^ (x << 5)) & 0xFF;
        }
        ((msb << 8) | lsb) as u16
    }

    #[test]
    fn empty_input_returns_seed() {
        assert_eq!(checksum(CRC_SEED, b""), CRC_SEED);
        assert_eq!(checksum(0xBEEF, b""), 0xBEEF);
    }

    #[test]
    fn single_byte_matches_hand_computation() {
        // msb=0x10, lsb=0x21; c=0x00 -> x=0x10 ^ 0x01 = 0x11
        // msb = 0x21 ^ 0x02 ^ 0x10 = 0x33, lsb = 0x11 ^ 0x20 = 0x31
        assert_eq!(checksum(CRC_SEED, &[0x00]), 0x3331);
    }

    #[test]
    fn matches_reference_arithmetic() {
        let samples: [&[u8]; 4] = [
            b"1;",
            b"<TC>\n\t<Msg>1</Msg>\n\t<Inst>RATS</Inst>\n\t<Length>2</Length>\n</TC>\n",
            &[0xFF, 0x00, 0x80, 0x7F, 0x01],
            b"147;",
        ];
        for data in samples {
            assert_eq!(checksum(CRC_SEED, data), reference(CRC_SEED, data));
            assert_eq!(checksum(0xFFFF, data), reference(0xFFFF, data));
        }
    }

    #[test]
    fn is_deterministic() {
        let data = b"<GPS>\n\t<SZA>45.0</SZA>\n</GPS>\n";
        assert_eq!(frame_checksum(data), frame_checksum(data));
        assert_eq!(frame_checksum(data), checksum(CRC_SEED, data));
    }

    #[test]
    fn agrees_with_bit_serial_register() {
        let bitwise = |seed: u16, data: &[u8]| {
            let mut crc = seed;
            for &b in data {
                crc ^= u16::from(b) << 8;
                for _ in 0..8 {
                    crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
                }
            }
            crc
        };
        assert_eq!(checksum(0xFFFF, b"123456789"), 0x29B1);
        assert_eq!(checksum(CRC_SEED, b"123456789"), bitwise(CRC_SEED, b"123456789"));
    }

    #[test]
    fn known_command_checksums() {
        assert_eq!(frame_checksum(b"1;"), 0x86AC);
        assert_eq!(frame_checksum(b"abc"), 0xEB62);
    }
}
