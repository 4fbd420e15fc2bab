//! Per-device decode state machines.
//!
//! One decoder per physical device type; each owns its frame queue and a
//! register bridge for bring-up. Configuration runs once before
//! acquisition; decode runs cooperatively inside the caller's processing
//! cycle and never touches the register path.

pub mod analog_io;
pub mod bno055;
pub mod digital_io;
pub mod heartbeat;
pub mod neuropixels_v1;

use crate::block::SampleSink;
use crate::error::DaqResult;
use crate::frame::{DeviceIndex, RawFrame};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// Unbounded MPSC hand-off between the frame router (producer) and the
/// owning decode call (consumer). Ingestion never applies backpressure;
/// the consumer drains non-blockingly and stops when empty.
pub struct FrameQueue {
    tx: Sender<RawFrame>,
    rx: Receiver<RawFrame>,
}

impl FrameQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        FrameQueue { tx, rx }
    }

    pub fn sender(&self) -> Sender<RawFrame> {
        self.tx.clone()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn try_pop(&self) -> Option<RawFrame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drop every queued frame without decoding.
    pub fn clear(&self) {
        while self.try_pop().is_some() {}
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Common capability interface over the closed set of device kinds.
///
/// A decoder that fails `configure` stays disabled: it is never routed and
/// never decodes. `flush` discards queued frames and partial blocks; it is
/// called when acquisition stops, which deliberately does not emit
/// incomplete data downstream.
pub trait Decoder: Send {
    fn device(&self) -> DeviceIndex;

    fn enabled(&self) -> bool;

    /// Bring the hardware up and apply the full device configuration.
    fn configure(&mut self) -> DaqResult<()>;

    /// Router-facing queue handles, one per device index this decoder
    /// claims (composites claim several).
    fn routes(&self) -> Vec<(DeviceIndex, Sender<RawFrame>)>;

    /// Frames waiting in this decoder's queue.
    fn queued(&self) -> usize;

    /// Drain the queue non-blockingly, emitting finished blocks to `sink`.
    fn decode(&mut self, sink: &mut dyn SampleSink);

    /// Discard queued frames and partially accumulated state.
    fn flush(&mut self);
}
