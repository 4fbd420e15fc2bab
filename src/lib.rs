//! Acquisition core for a hub-based neural recording system.
//!
//! A single link thread reads mixed frames from the hardware and routes
//! them to per-device decoders; register traffic to devices behind a
//! serializer/deserializer pair goes through [`bridge::RegisterBridge`].

pub mod acquisition;
pub mod bits;
pub mod block;
pub mod bridge;
pub mod bringup;
pub mod calibration;
pub mod composite;
pub mod config;
pub mod devices;
pub mod error;
pub mod frame;
pub mod link;
pub mod mock;
pub mod probe;
pub mod registers;
pub mod router;
pub mod stats;

pub use acquisition::AcquisitionSession;
pub use block::{MemorySink, SampleBlock, SampleSink, SharedSink, StreamId};
pub use bringup::BringupTask;
pub use config::Conf;
pub use error::{DaqError, DaqResult};
pub use frame::{DeviceIndex, RawFrame};
pub use link::{AcquisitionLink, DeviceInfo, DeviceKind, LinkDriver, LinkReturn};
