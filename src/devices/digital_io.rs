//! Breakout-board digital/event port decoder.
//!
//! Each frame reports the digital port and button states. In a composite
//! arrangement the decoded event codes annotate the analog stream; running
//! standalone, the decoder emits its own single-channel state blocks.

use crate::block::{BlockAccumulator, SampleSink, StreamId};
use crate::devices::{Decoder, FrameQueue};
use crate::error::DaqResult;
use crate::frame::{DeviceIndex, RawFrame};
use crate::link::AcquisitionLink;
use crate::registers::common;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::sync::Arc;

pub const BLOCK_LEN: usize = 2;

const PORT_OFFSET: usize = 0;
const BUTTONS_OFFSET: usize = 2;

pub struct DigitalIoDecoder {
    device: DeviceIndex,
    link: Arc<AcquisitionLink>,
    queue: FrameQueue,
    stream: StreamId,
    /// Decoded but not yet consumed event units, oldest first.
    pending: VecDeque<u64>,
    accumulator: BlockAccumulator,
    enabled: bool,
}

impl DigitalIoDecoder {
    pub fn new(link: Arc<AcquisitionLink>, device: DeviceIndex) -> Self {
        DigitalIoDecoder {
            device,
            link,
            queue: FrameQueue::new(),
            stream: StreamId {
                device,
                name: "digital",
            },
            pending: VecDeque::new(),
            accumulator: BlockAccumulator::new(1, BLOCK_LEN),
            enabled: false,
        }
    }

    fn event_code(frame: &RawFrame) -> u64 {
        let port = frame.u16_at(PORT_OFFSET) as u64;
        let buttons = frame.u16_at(BUTTONS_OFFSET) as u64;
        port | (buttons << 16)
    }

    /// Move every queued frame into the pending event queue.
    pub(crate) fn drain_to_pending(&mut self) {
        while let Some(frame) = self.queue.try_pop() {
            self.pending.push_back(Self::event_code(&frame));
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn pop_pending(&mut self) -> Option<u64> {
        self.pending.pop_front()
    }
}

impl Decoder for DigitalIoDecoder {
    fn device(&self) -> DeviceIndex {
        self.device
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn configure(&mut self) -> DaqResult<()> {
        self.link.write_register(self.device, common::ENABLE, 1)?;
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
            let code = Self::event_code(&frame);
            let state = frame.u16_at(PORT_OFFSET) as f32;
            if let Some(block) = self.accumulator.push_sample(&[state], timestamp, code) {
                sink.push_block(self.stream, block);
            }
        }
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.pending.clear();
        self.accumulator.discard_partial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemorySink;
    use crate::mock::MockDriver;

    fn digital_frame(
        device: DeviceIndex,
        ticks: u64,
        port: u16,
        buttons: u16,
    ) -> RawFrame {
        let mut payload = Vec::new();
        payload.extend_from_slice(&port.to_le_bytes());
        payload.extend_from_slice(&buttons.to_le_bytes());
        RawFrame::new(device, ticks, payload)
    }

    #[test]
    fn standalone_blocks_carry_state_and_event_codes() {
        let link = Arc::new(AcquisitionLink::new(Box::new(MockDriver::new(100_000))));
        let dev = DeviceIndex::new(0, 7);
        let mut dec = DigitalIoDecoder::new(link, dev);
        let tx = dec.routes()[0].1.clone();
        tx.send(digital_frame(dev, 0, 0b0101, 0)).unwrap();
        tx.send(digital_frame(dev, 10, 0b0110, 1)).unwrap();

        let mut sink = MemorySink::new();
        dec.decode(&mut sink);
        let blocks: Vec<_> = sink.blocks_for(dec.stream).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples[[0, 0]], 0b0101 as f32);
        assert_eq!(blocks[0].event_codes[1], 0b0110 | (1 << 16));
    }

    #[test]
    fn pending_events_are_fifo() {
        let link = Arc::new(AcquisitionLink::new(Box::new(MockDriver::new(100_000))));
        let dev = DeviceIndex::new(0, 7);
        let mut dec = DigitalIoDecoder::new(link, dev);
        let tx = dec.routes()[0].1.clone();
        tx.send(digital_frame(dev, 0, 1, 0)).unwrap();
        tx.send(digital_frame(dev, 1, 2, 0)).unwrap();
        dec.drain_to_pending();
        assert_eq!(dec.pending_len(), 2);
        assert_eq!(dec.pop_pending(), Some(1));
        assert_eq!(dec.pop_pending(), Some(2));
    }
}
