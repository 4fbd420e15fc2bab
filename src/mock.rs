//! Simulated acquisition hardware for tests and offline demo runs.

use crate::frame::{DeviceIndex, RawFrame};
use crate::link::{DeviceInfo, DeviceKind, LinkDriver, LinkReturn};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// In-memory [`LinkDriver`] backed by a frame queue and a register store.
///
/// Tests pre-queue frames and preset register values; the demo binary
/// attaches a [`FrameGenerator`] that synthesizes frames on demand. When
/// the queue is empty and no generator is attached, `read_frame` reports
/// `Stop`, which ends the routing loop the same way real hardware does.
pub struct MockDriver {
    clock_hz: u32,
    devices: Mutex<Vec<DeviceInfo>>,
    frames: Mutex<VecDeque<RawFrame>>,
    registers: Mutex<HashMap<(u32, u32), u32>>,
    generator: Option<Mutex<FrameGenerator>>,
    /// Error injected on the next frame read, if any.
    fail_next_read: Mutex<Option<LinkReturn>>,
}

impl MockDriver {
    pub fn new(clock_hz: u32) -> Self {
        MockDriver {
            clock_hz,
            devices: Mutex::new(Vec::new()),
            frames: Mutex::new(VecDeque::new()),
            registers: Mutex::new(HashMap::new()),
            generator: None,
            fail_next_read: Mutex::new(None),
        }
    }

    pub fn with_generator(mut self, generator: FrameGenerator) -> Self {
        self.generator = Some(Mutex::new(generator));
        self
    }

    pub fn add_device(&self, index: DeviceIndex, kind: DeviceKind) {
        self.devices.lock().unwrap().push(DeviceInfo { index, kind });
    }

    pub fn push_frame(&self, frame: RawFrame) {
        self.frames.lock().unwrap().push_back(frame);
    }

    pub fn set_register(&self, device: DeviceIndex, address: u32, value: u32) {
        self.registers
            .lock()
            .unwrap()
            .insert((device.raw(), address), value);
    }

    pub fn register(&self, device: DeviceIndex, address: u32) -> Option<u32> {
        self.registers
            .lock()
            .unwrap()
            .get(&(device.raw(), address))
            .copied()
    }

    pub fn fail_next_read(&self, code: LinkReturn) {
        *self.fail_next_read.lock().unwrap() = Some(code);
    }
}

impl LinkDriver for MockDriver {
    fn read_frame(&self) -> Result<RawFrame, LinkReturn> {
        if let Some(code) = self.fail_next_read.lock().unwrap().take() {
            return Err(code);
        }
        if let Some(frame) = self.frames.lock().unwrap().pop_front() {
            return Ok(frame);
        }
        if let Some(generator) = &self.generator {
            return Ok(generator.lock().unwrap().next_frame());
        }
        Err(LinkReturn::Stop)
    }

    fn read_register(&self, device: DeviceIndex, address: u32) -> Result<u32, LinkReturn> {
        Ok(self.register(device, address).unwrap_or(0))
    }

    fn write_register(
        &self,
        device: DeviceIndex,
        address: u32,
        value: u32,
    ) -> Result<(), LinkReturn> {
        self.set_register(device, address, value);
        Ok(())
    }

    fn acq_clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn device_table(&self) -> Vec<DeviceInfo> {
        self.devices.lock().unwrap().clone()
    }
}

// Tests hold an `Arc<MockDriver>` to inspect registers after the link has
// taken ownership of its boxed clone.
impl LinkDriver for std::sync::Arc<MockDriver> {
    fn read_frame(&self) -> Result<RawFrame, LinkReturn> {
        self.as_ref().read_frame()
    }

    fn read_register(&self, device: DeviceIndex, address: u32) -> Result<u32, LinkReturn> {
        self.as_ref().read_register(device, address)
    }

    fn write_register(
        &self,
        device: DeviceIndex,
        address: u32,
        value: u32,
    ) -> Result<(), LinkReturn> {
        self.as_ref().write_register(device, address, value)
    }

    fn acq_clock_hz(&self) -> u32 {
        self.as_ref().acq_clock_hz()
    }

    fn device_table(&self) -> Vec<DeviceInfo> {
        self.as_ref().device_table()
    }
}

/// Round-robin synthetic frame source for the demo binary.
///
/// Each registered stream produces fixed-size payloads of small random
/// noise around a DC level at its own tick period.
pub struct FrameGenerator {
    clock_hz: u32,
    streams: Vec<StreamSpec>,
    /// (next emit tick, frame counter) per stream.
    cursors: Vec<(u64, u64)>,
}

struct StreamSpec {
    device: DeviceIndex,
    payload_len: usize,
    tick_period: u64,
    dc_level: u16,
}

impl FrameGenerator {
    pub fn new(clock_hz: u32) -> Self {
        FrameGenerator {
            clock_hz,
            streams: Vec::new(),
            cursors: Vec::new(),
        }
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    pub fn add_stream(
        &mut self,
        device: DeviceIndex,
        payload_len: usize,
        sample_rate_hz: u32,
        dc_level: u16,
    ) {
        self.streams.push(StreamSpec {
            device,
            payload_len,
            tick_period: (self.clock_hz / sample_rate_hz) as u64,
            dc_level,
        });
        self.cursors.push((0, 0));
    }

    /// Emit the frame with the earliest pending tick.
    fn next_frame(&mut self) -> RawFrame {
        let slot = self
            .cursors
            .iter()
            .enumerate()
            .min_by_key(|(_, (tick, _))| *tick)
            .map(|(i, _)| i)
            .expect("generator has no streams");
        let spec = &self.streams[slot];
        let (tick, count) = self.cursors[slot];

        let mut rng = rand::rng();
        let mut payload = vec![0u8; spec.payload_len];
        for word in payload.chunks_exact_mut(2) {
            let sample = spec.dc_level.wrapping_add(rng.random_range(0..8));
            word.copy_from_slice(&sample.to_le_bytes());
        }

        self.cursors[slot] = (tick + spec.tick_period, count + 1);
        RawFrame::new(spec.device, tick, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_frames_come_back_fifo_then_stop() {
        let driver = MockDriver::new(48_000_000);
        let dev = DeviceIndex::new(0, 2);
        driver.push_frame(RawFrame::new(dev, 10, vec![1]));
        driver.push_frame(RawFrame::new(dev, 20, vec![2]));

        assert_eq!(driver.read_frame().unwrap().ticks, 10);
        assert_eq!(driver.read_frame().unwrap().ticks, 20);
        assert_eq!(driver.read_frame().unwrap_err(), LinkReturn::Stop);
    }

    #[test]
    fn generator_interleaves_streams_by_tick() {
        let mut generator = FrameGenerator::new(1000);
        let fast = DeviceIndex::new(0, 1);
        let slow = DeviceIndex::new(0, 2);
        generator.add_stream(fast, 2, 500, 0); // every 2 ticks
        generator.add_stream(slow, 2, 100, 0); // every 10 ticks

        let driver = MockDriver::new(1000).with_generator(generator);
        let mut fast_count = 0;
        for _ in 0..12 {
            let frame = driver.read_frame().unwrap();
            if frame.device == fast {
                fast_count += 1;
            }
        }
        assert!(fast_count >= 9);
    }
}
