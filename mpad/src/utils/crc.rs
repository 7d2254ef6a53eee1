//! CRC validation for protected frames.
//!
//! Frames with the header protection bit set carry a 16-bit checksum over
//! the last two header bytes and the side information. The generator is
//! the MPEG audio polynomial x^16 + x^15 + x^2 + 1 with all-ones preset,
//! bits processed most significant first.

/// CRC algorithm specification with polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-16 algorithm for frame header/side info protection.
pub const CRC_PROTECTION_ALG: Algorithm<u16> = Algorithm {
    poly: 0x8005,
    init: 0xffff,
};

/// Computes the CRC-16 remainder of `len` zero-appended bits of `value`.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, (i as u16) << 8, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm<u16>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc16_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            crc = (crc << 8) ^ self.table[(((crc >> 8) ^ bytes[i] as u16) & 0xff) as usize];
            i += 1;
        }

        crc
    }

    /// One-shot checksum starting from the algorithm preset.
    #[inline(always)]
    pub const fn checksum(&self, bytes: &[u8]) -> u16 {
        self.update(self.init, bytes)
    }
}

#[test]
fn crc16_protection_check_value() {
    let crc = Crc16::new(&CRC_PROTECTION_ALG);
    assert_eq!(crc.checksum(b"123456789"), 0xaee7);
}

#[test]
fn crc16_update_is_incremental() {
    let crc = Crc16::new(&CRC_PROTECTION_ALG);
    let whole = crc.checksum(b"123456789");
    let split = crc.update(crc.update(crc.init, b"1234"), b"56789");
    assert_eq!(whole, split);
}
