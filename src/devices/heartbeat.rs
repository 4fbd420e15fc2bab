//! Link-status heartbeat decoder: a fixed-rate uptime counter used to
//! confirm the acquisition link is alive.

use crate::block::{BlockAccumulator, SampleSink, StreamId};
use crate::devices::{Decoder, FrameQueue};
use crate::error::DaqResult;
use crate::frame::{DeviceIndex, RawFrame};
use crate::link::AcquisitionLink;
use crate::registers::heartbeat;
use crossbeam_channel::Sender;
use std::sync::Arc;

pub const BLOCK_LEN: usize = 2;
/// Heartbeat beats per second programmed at bring-up.
pub const BEAT_HZ: u32 = 10;

pub struct HeartbeatDecoder {
    device: DeviceIndex,
    link: Arc<AcquisitionLink>,
    queue: FrameQueue,
    stream: StreamId,
    accumulator: BlockAccumulator,
    enabled: bool,
}

impl HeartbeatDecoder {
    pub fn new(link: Arc<AcquisitionLink>, device: DeviceIndex) -> Self {
        HeartbeatDecoder {
            device,
            link,
            queue: FrameQueue::new(),
            stream: StreamId {
                device,
                name: "heartbeat",
            },
            accumulator: BlockAccumulator::new(1, BLOCK_LEN),
            enabled: false,
        }
    }
}

impl Decoder for HeartbeatDecoder {
    fn device(&self) -> DeviceIndex {
        self.device
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn configure(&mut self) -> DaqResult<()> {
        let clk_hz = self.link.read_register(self.device, heartbeat::CLK_HZ)?;
        if clk_hz == 0 {
            return Err(crate::error::DaqError::FatalConfig(format!(
                "heartbeat {} reports a zero clock",
                self.device
            )));
        }
        self.link
            .write_register(self.device, heartbeat::CLK_DIV, clk_hz / BEAT_HZ)?;
        self.link.write_register(self.device, heartbeat::ENABLE, 1)?;
        self.enabled = true;
        Ok(())
    }

    fn routes(&self) -> Vec<(DeviceIndex, Sender<RawFrame>)> {
        vec![(self.device, self.queue.sender())]
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn decode(&mut self, sink: &mut dyn SampleSink) {
        while let Some(frame) = self.queue.try_pop() {
            let timestamp = self.link.timestamp_to_secs(frame.ticks);
            let beats = frame.u32_at(0);
            let uptime = beats as f32 / BEAT_HZ as f32;
            if let Some(block) = self.accumulator.push_sample(&[uptime], timestamp, 0) {
                sink.push_block(self.stream, block);
            }
        }
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.accumulator.discard_partial();
    }
}
