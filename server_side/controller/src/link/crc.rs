/// x^8 + x^5 + x^4 + 1
pub const CRC8_POLY: u8 = 0x31;

/// CRC-8 over `bytes`: polynomial 0x31, initial value 0, MSB first, no reflection and no final xor.
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;
    for &b in bytes {
        crc ^= b;
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
