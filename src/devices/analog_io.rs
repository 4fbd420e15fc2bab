//! Breakout-board analog input decoder: 12 channels of signed 16-bit
//! samples, reduced 4:1 by integer averaging.

use crate::block::{Averager, BlockAccumulator, SampleSink, StreamId};
use crate::devices::{Decoder, FrameQueue};
use crate::error::DaqResult;
use crate::frame::{DeviceIndex, RawFrame};
use crate::link::AcquisitionLink;
use crate::registers::{analog_io, common};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Raw frames consumed per emitted sample.
pub const AVERAGING_FACTOR: usize = 4;
pub const BLOCK_LEN: usize = 10;
pub const NUM_CHANNELS: usize = analog_io::NUM_CHANNELS;

fn range_volts(code: u32) -> f32 {
    match code {
        analog_io::RANGE_2V5 => 2.5,
        analog_io::RANGE_5V => 5.0,
        _ => 10.0,
    }
}

pub struct AnalogIoDecoder {
    device: DeviceIndex,
    link: Arc<AcquisitionLink>,
    queue: FrameQueue,
    stream: StreamId,
    /// Volts per ADC code, one entry per channel.
    scales: [f32; NUM_CHANNELS],
    averager: Averager,
    accumulator: BlockAccumulator,
    enabled: bool,
}

impl AnalogIoDecoder {
    pub fn new(link: Arc<AcquisitionLink>, device: DeviceIndex) -> Self {
        AnalogIoDecoder {
            device,
            link,
            queue: FrameQueue::new(),
            stream: StreamId {
                device,
                name: "analog",
            },
            scales: [10.0 / 32768.0; NUM_CHANNELS],
            averager: Averager::new(AVERAGING_FACTOR, NUM_CHANNELS),
            accumulator: BlockAccumulator::new(NUM_CHANNELS, BLOCK_LEN),
            enabled: false,
        }
    }

    pub(crate) fn pop(&self) -> Option<RawFrame> {
        self.queue.try_pop()
    }

    /// Decode one frame, tagging any emitted sample with `event_code`.
    pub(crate) fn decode_frame(
        &mut self,
        frame: RawFrame,
        event_code: u64,
        sink: &mut dyn SampleSink,
    ) {
        let timestamp = self.link.timestamp_to_secs(frame.ticks);
        let mut volts = [0.0f32; NUM_CHANNELS];
        for (ch, v) in volts.iter_mut().enumerate() {
            *v = frame.i16_at(2 * ch) as f32 * self.scales[ch];
        }
        if let Some(sample) = self.averager.push(&volts) {
            if let Some(block) = self.accumulator.push_sample(&sample, timestamp, event_code) {
                sink.push_block(self.stream, block);
            }
        }
    }
}

impl Decoder for AnalogIoDecoder {
    fn device(&self) -> DeviceIndex {
        self.device
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn configure(&mut self) -> DaqResult<()> {
        // All channels as inputs, then pick up the per-channel range the
        // hardware reports back.
        self.link
            .write_register(self.device, analog_io::CH_DIR, 0)?;
        for ch in 0..NUM_CHANNELS {
            let code = self
                .link
                .read_register(self.device, analog_io::CH00_RANGE + ch as u32)?;
            self.scales[ch] = range_volts(code) / 32768.0;
        }
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
            self.decode_frame(frame, 0, sink);
        }
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.averager.reset();
        self.accumulator.discard_partial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemorySink;
    use crate::mock::MockDriver;

    fn analog_frame(device: DeviceIndex, ticks: u64, value: i16) -> RawFrame {
        let mut payload = Vec::with_capacity(2 * NUM_CHANNELS);
        for _ in 0..NUM_CHANNELS {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        RawFrame::new(device, ticks, payload)
    }

    #[test]
    fn four_to_one_averaging_of_identical_samples_is_exact() {
        let link = Arc::new(AcquisitionLink::new(Box::new(MockDriver::new(100_000))));
        let dev = DeviceIndex::new(0, 6);
        let mut dec = AnalogIoDecoder::new(link, dev);
        let tx = dec.routes()[0].1.clone();

        let value = 8192i16; // 2.5 V at the default 10 V range
        for i in 0..(AVERAGING_FACTOR * BLOCK_LEN) as u64 {
            tx.send(analog_frame(dev, i, value)).unwrap();
        }
        let mut sink = MemorySink::new();
        dec.decode(&mut sink);

        let blocks: Vec<_> = sink.blocks_for(dec.stream).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples[[0, 0]], 2.5);
        assert_eq!(blocks[0].samples[[11, 9]], 2.5);
        assert_eq!(blocks[0].event_codes, vec![0; BLOCK_LEN]);
    }

    #[test]
    fn partial_averaging_group_emits_nothing() {
        let link = Arc::new(AcquisitionLink::new(Box::new(MockDriver::new(100_000))));
        let dev = DeviceIndex::new(0, 6);
        let mut dec = AnalogIoDecoder::new(link, dev);
        let tx = dec.routes()[0].1.clone();
        for i in 0..(AVERAGING_FACTOR - 1) as u64 {
            tx.send(analog_frame(dev, i, 100)).unwrap();
        }
        let mut sink = MemorySink::new();
        dec.decode(&mut sink);
        assert!(sink.blocks.is_empty());
    }
}
