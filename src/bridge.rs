use crate::error::DaqResult;
use crate::frame::DeviceIndex;
use crate::link::AcquisitionLink;
use std::sync::Arc;

/// High bit selecting 16-bit (vs 8-bit) sub-addressing on the target chip.
const ADDR_16BIT: u32 = 0x8000_0000;
/// Shift of the byte-count field for multi-byte word reads.
const WIDTH_SHIFT: u32 = 28;

/// I2C-style register client for one chip reached through the link, behind
/// zero or more serializer/deserializer hops.
///
/// Every access composes the chip address and sub-address into a single
/// link register address and goes through the link's serialized register
/// entry point, so multi-hop transactions stay atomic system-wide.
pub struct RegisterBridge {
    link: Arc<AcquisitionLink>,
    device: DeviceIndex,
    chip_address: u32,
    sixteen_bit: bool,
}

/// `(sub << 7) | (chip & 0x7F)`: the base composite address for one chip
/// register, before any width or addressing-mode bits.
pub fn compose_address(sub_address: u32, chip_address: u32) -> u32 {
    (sub_address << 7) | (chip_address & 0x7F)
}

impl RegisterBridge {
    pub fn new(link: Arc<AcquisitionLink>, device: DeviceIndex, chip_address: u32) -> Self {
        RegisterBridge {
            link,
            device,
            chip_address,
            sixteen_bit: false,
        }
    }

    /// Use 16-bit sub-addressing on the target chip.
    pub fn with_16bit_addressing(mut self) -> Self {
        self.sixteen_bit = true;
        self
    }

    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    fn address(&self, sub_address: u32, byte_count: u32) -> u32 {
        let mut addr = compose_address(sub_address, self.chip_address);
        if self.sixteen_bit {
            addr |= ADDR_16BIT;
        }
        addr | ((byte_count - 1) << WIDTH_SHIFT)
    }

    pub fn write_byte(&self, sub_address: u32, value: u8) -> DaqResult<()> {
        self.link
            .write_register(self.device, self.address(sub_address, 1), value as u32)?;
        Ok(())
    }

    pub fn read_byte(&self, sub_address: u32) -> DaqResult<u8> {
        let value = self
            .link
            .read_register(self.device, self.address(sub_address, 1))?;
        Ok(value as u8)
    }

    /// Read a little-endian word of 1..=4 bytes.
    pub fn read_word(&self, sub_address: u32, byte_count: u32) -> DaqResult<u32> {
        debug_assert!((1..=4).contains(&byte_count));
        let value = self
            .link
            .read_register(self.device, self.address(sub_address, byte_count))?;
        let mask = if byte_count == 4 {
            u32::MAX
        } else {
            (1u32 << (8 * byte_count)) - 1
        };
        Ok(value & mask)
    }

    pub fn read_i16(&self, sub_address: u32) -> DaqResult<i16> {
        Ok(self.read_word(sub_address, 2)? as u16 as i16)
    }

    /// Read up to `length` bytes from consecutive sub-addresses, stopping
    /// early at the first zero byte.
    pub fn read_string(&self, sub_address: u32, length: u32) -> DaqResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(length as usize);
        for i in 0..length {
            let b = self.read_byte(sub_address + i)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;

    #[test]
    fn composition_matches_wire_contract() {
        // Serializer GPIO register through the deserializer, 8-bit mode.
        assert_eq!(compose_address(0x0D, 0x58), (0x0D << 7) | 0x58);
        // Chip address is masked to 7 bits.
        assert_eq!(compose_address(0x01, 0xD8), (0x01 << 7) | 0x58);
    }

    #[test]
    fn sixteen_bit_mode_sets_high_bit() {
        let driver = MockDriver::new(48_000_000);
        let dev = DeviceIndex::new(0, 1);
        driver.set_register(dev, ADDR_16BIT | compose_address(0x0200, 0x50), 0x42);
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let bridge = RegisterBridge::new(link, dev, 0x50).with_16bit_addressing();
        assert_eq!(bridge.read_byte(0x0200).unwrap(), 0x42);
    }

    #[test]
    fn word_reads_carry_width_field_and_mask() {
        let driver = MockDriver::new(48_000_000);
        let dev = DeviceIndex::new(0, 1);
        driver.set_register(dev, (1 << WIDTH_SHIFT) | compose_address(0x1A, 0x28), 0xFFFF_BEEF);
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let bridge = RegisterBridge::new(link, dev, 0x28);
        assert_eq!(bridge.read_word(0x1A, 2).unwrap(), 0xBEEF);
    }

    #[test]
    fn string_reads_stop_at_nul() {
        let driver = MockDriver::new(48_000_000);
        let dev = DeviceIndex::new(0, 1);
        for (i, b) in [b'P' as u32, b'R' as u32, b'B' as u32, 0].iter().enumerate() {
            driver.set_register(dev, compose_address(0x20 + i as u32, 0x50), *b);
        }
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let bridge = RegisterBridge::new(link, dev, 0x50);
        assert_eq!(bridge.read_string(0x20, 16).unwrap(), b"PRB");
    }
}
