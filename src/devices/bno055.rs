//! BNO055 inertial sensor, reached over I2C behind the serializer.
//!
//! Unlike the streamed devices this one is actively polled: a dedicated
//! thread reads its fusion outputs through the register bridge on a fixed
//! period. It therefore has no frame queue and no router route.

use crate::block::{BlockAccumulator, SharedSink, StreamId};
use crate::bridge::RegisterBridge;
use crate::error::{DaqError, DaqResult};
use crate::frame::DeviceIndex;
use crate::registers::{bno055, common};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const BLOCK_LEN: usize = 2;
/// euler 3 + quaternion 4 + linear accel 3 + gravity 3 + temperature 1 +
/// calibration status 1.
pub const NUM_CHANNELS: usize = 15;

const EULER_SCALE: f32 = 1.0 / 16.0;
const QUAT_SCALE: f32 = 1.0 / 16384.0;
const ACCEL_SCALE: f32 = 1.0 / 100.0;

pub struct Bno055Poller {
    device: DeviceIndex,
    bridge: Arc<RegisterBridge>,
    period: Duration,
    enabled: bool,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// One full register sweep of the sensor's fusion outputs.
fn read_sample(bridge: &RegisterBridge) -> DaqResult<[f32; NUM_CHANNELS]> {
    let mut out = [0.0f32; NUM_CHANNELS];
    for i in 0..3 {
        out[i] = bridge.read_i16(bno055::EUL_DATA + 2 * i as u32)? as f32 * EULER_SCALE;
    }
    for i in 0..4 {
        out[3 + i] = bridge.read_i16(bno055::QUA_DATA + 2 * i as u32)? as f32 * QUAT_SCALE;
    }
    for i in 0..3 {
        out[7 + i] = bridge.read_i16(bno055::LIA_DATA + 2 * i as u32)? as f32 * ACCEL_SCALE;
    }
    for i in 0..3 {
        out[10 + i] = bridge.read_i16(bno055::GRV_DATA + 2 * i as u32)? as f32 * ACCEL_SCALE;
    }
    out[13] = bridge.read_byte(bno055::TEMP)? as i8 as f32;
    out[14] = bridge.read_byte(bno055::CALIB_STAT)? as f32;
    Ok(out)
}

impl Bno055Poller {
    /// `hub` is the deserializer device whose bridge reaches the sensor.
    pub fn new(
        link: Arc<crate::link::AcquisitionLink>,
        device: DeviceIndex,
        hub: DeviceIndex,
        period: Duration,
    ) -> Self {
        Bno055Poller {
            device,
            bridge: Arc::new(RegisterBridge::new(link, hub, bno055::CHIP_ADDR)),
            period,
            enabled: false,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn configure(&mut self, link: &crate::link::AcquisitionLink) -> DaqResult<()> {
        let chip_id = self.bridge.read_byte(bno055::CHIP_ID)?;
        if chip_id != bno055::CHIP_ID_VALUE {
            return Err(DaqError::FatalConfig(format!(
                "BNO055 at {} answered chip id 0x{chip_id:02X}",
                self.device
            )));
        }
        self.bridge.write_byte(bno055::OPR_MODE, bno055::MODE_NDOF)?;
        link.write_register(self.device, common::ENABLE, 1)?;
        self.enabled = true;
        Ok(())
    }

    /// Spawn the polling thread. Samples go straight to the shared sink;
    /// a failed register sweep is logged and skipped.
    pub fn start(&mut self, sink: SharedSink) {
        if !self.enabled || self.handle.is_some() {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let bridge = Arc::clone(&self.bridge);
        let period = self.period;
        let stream = StreamId {
            device: self.device,
            name: "imu",
        };
        self.handle = Some(std::thread::spawn(move || {
            let started = Instant::now();
            let mut accumulator = BlockAccumulator::new(NUM_CHANNELS, BLOCK_LEN);
            while !stop.load(Ordering::SeqCst) {
                match read_sample(&bridge) {
                    Ok(sample) => {
                        let timestamp = started.elapsed().as_secs_f64();
                        if let Some(block) = accumulator.push_sample(&sample, timestamp, 0) {
                            sink.lock().unwrap().push_block(stream, block);
                        }
                    }
                    Err(e) => warn!("IMU poll failed: {e}"),
                }
                std::thread::sleep(period);
            }
        }));
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Bno055Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
