use crate::frame::{DeviceIndex, RawFrame};
use std::sync::Mutex;

/// Return codes of the acquisition-link driver.
///
/// Zero is success; anything below zero is a failure of the call that
/// produced it. `Stop` is the orderly end-of-acquisition signal and is not
/// treated as an error by the routing loop.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub enum LinkReturn {
    Success = 0,
    Generic = -1,
    InvalidParam = -2,
    DevNotFound = -3,
    ReadFailure = -4,
    WriteFailure = -5,
    Timeout = -6,
    Stop = -7,
    Uninitialized = -8,
    Comm = -9,
    Unknown = 1,
}

impl From<i32> for LinkReturn {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Success,
            -1 => Self::Generic,
            -2 => Self::InvalidParam,
            -3 => Self::DevNotFound,
            -4 => Self::ReadFailure,
            -5 => Self::WriteFailure,
            -6 => Self::Timeout,
            -7 => Self::Stop,
            -8 => Self::Uninitialized,
            -9 => Self::Comm,
            _ => Self::Unknown,
        }
    }
}

/// Closed set of device kinds the controller can expose in its table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviceKind {
    NeuropixelsV1,
    Bno055,
    AnalogIo,
    DigitalIo,
    Heartbeat,
    Unknown,
}

/// One row of the controller's device table.
#[derive(Clone, Copy, Debug)]
pub struct DeviceInfo {
    pub index: DeviceIndex,
    pub kind: DeviceKind,
}

/// Raw driver boundary to the acquisition hardware.
///
/// Implementations provide unsynchronized access; all serialization happens
/// in [`AcquisitionLink`]. `read_frame` blocks until a frame, a timeout, or
/// a stop condition; register calls are single atomic transactions.
pub trait LinkDriver: Send + Sync {
    fn read_frame(&self) -> Result<RawFrame, LinkReturn>;
    fn read_register(&self, device: DeviceIndex, address: u32) -> Result<u32, LinkReturn>;
    fn write_register(&self, device: DeviceIndex, address: u32, value: u32)
        -> Result<(), LinkReturn>;
    fn acq_clock_hz(&self) -> u32;
    fn device_table(&self) -> Vec<DeviceInfo>;
}

/// Serialized front door to the link driver.
///
/// The hardware supports exactly one register transaction and one frame read
/// in flight system-wide, so the two are funneled through two process-wide
/// critical sections regardless of how many devices or threads are active.
/// Register traffic and frame traffic never block each other.
pub struct AcquisitionLink {
    driver: Box<dyn LinkDriver>,
    register_lock: Mutex<()>,
    frame_lock: Mutex<()>,
}

impl AcquisitionLink {
    pub fn new(driver: Box<dyn LinkDriver>) -> Self {
        AcquisitionLink {
            driver,
            register_lock: Mutex::new(()),
            frame_lock: Mutex::new(()),
        }
    }

    /// Blocking frame read; at most one in flight system-wide.
    pub fn read_frame(&self) -> Result<RawFrame, LinkReturn> {
        let _guard = self.frame_lock.lock().unwrap();
        self.driver.read_frame()
    }

    pub fn read_register(&self, device: DeviceIndex, address: u32) -> Result<u32, LinkReturn> {
        let _guard = self.register_lock.lock().unwrap();
        self.driver.read_register(device, address)
    }

    pub fn write_register(
        &self,
        device: DeviceIndex,
        address: u32,
        value: u32,
    ) -> Result<(), LinkReturn> {
        let _guard = self.register_lock.lock().unwrap();
        self.driver.write_register(device, address, value)
    }

    /// Convert a link-relative tick timestamp to seconds.
    pub fn timestamp_to_secs(&self, ticks: u64) -> f64 {
        ticks as f64 / self.driver.acq_clock_hz() as f64
    }

    pub fn acq_clock_hz(&self) -> u32 {
        self.driver.acq_clock_hz()
    }

    pub fn device_table(&self) -> Vec<DeviceInfo> {
        self.driver.device_table()
    }
}
