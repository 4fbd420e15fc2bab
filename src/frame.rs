/// Hierarchical identifier of one physical device behind the acquisition
/// controller: the high bits select the port/hub, the low byte the slot on
/// that hub.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DeviceIndex(u32);

impl DeviceIndex {
    pub fn new(hub: u8, slot: u8) -> Self {
        DeviceIndex(((hub as u32) << 8) | slot as u32)
    }

    pub fn from_raw(raw: u32) -> Self {
        DeviceIndex(raw)
    }

    pub fn hub(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn slot(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.hub(), self.slot())
    }
}

/// One fixed-layout binary unit delivered by the acquisition link.
///
/// The payload layout is the per-device wire contract; decoders index into
/// it at fixed offsets and trust the hardware's frame-size guarantee. A
/// frame is owned by whichever decoder accepts it and dropped after decode,
/// or immediately if no decoder claims its device index.
#[derive(Debug)]
pub struct RawFrame {
    pub device: DeviceIndex,
    /// Link-relative tick timestamp, converted to seconds by the link clock.
    pub ticks: u64,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(device: DeviceIndex, ticks: u64, payload: Vec<u8>) -> Self {
        RawFrame {
            device,
            ticks,
            payload,
        }
    }

    pub fn u16_at(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.payload[offset], self.payload[offset + 1]])
    }

    pub fn i16_at(&self, offset: usize) -> i16 {
        self.u16_at(offset) as i16
    }

    pub fn u32_at(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.payload[offset],
            self.payload[offset + 1],
            self.payload[offset + 2],
            self.payload[offset + 3],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_round_trips_hub_and_slot() {
        let idx = DeviceIndex::new(2, 7);
        assert_eq!(idx.hub(), 2);
        assert_eq!(idx.slot(), 7);
        assert_eq!(idx.raw(), (2 << 8) | 7);
        assert_eq!(DeviceIndex::from_raw(idx.raw()), idx);
    }

    #[test]
    fn frame_field_readers_are_little_endian() {
        let frame = RawFrame::new(
            DeviceIndex::new(0, 0),
            0,
            vec![0x34, 0x12, 0xFF, 0xFF, 0x78, 0x56, 0x34, 0x12],
        );
        assert_eq!(frame.u16_at(0), 0x1234);
        assert_eq!(frame.i16_at(2), -1);
        assert_eq!(frame.u32_at(4), 0x12345678);
    }
}
