//! Neuropixels 1.0 probe decoder and bring-up.
//!
//! Each raw frame carries one 384-channel AP sample vector followed by one
//! 384-channel LFP vector of 10-bit words. AP passes through at the raw
//! rate; LFP is reduced 12:1 by integer averaging. Both bands learn a
//! per-channel baseline offset once at the start of acquisition.

use crate::block::{Averager, BlockAccumulator, SampleSink, StreamId};
use crate::bridge::RegisterBridge;
use crate::calibration::{
    load_adc_calibration, load_gain_calibration, AdcCalibration, GainCalibration,
};
use crate::devices::{Decoder, FrameQueue};
use crate::error::{DaqError, DaqResult};
use crate::frame::{DeviceIndex, RawFrame};
use crate::link::AcquisitionLink;
use crate::probe::{ProbeConfigEncoder, ProbeSettings, GAIN_STEPS, NUM_CHANNELS};
use crate::registers::{common, ds90ub953, npix1};
use crossbeam_channel::Sender;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub const AP_SAMPLE_RATE: u32 = 30_000;
/// Raw frames consumed per emitted LFP sample.
pub const LFP_DIVISOR: usize = 12;
pub const AP_BLOCK_LEN: usize = 25;
pub const LFP_BLOCK_LEN: usize = 10;

const AP_OFFSET: usize = 0;
const LFP_OFFSET: usize = 2 * NUM_CHANNELS;
/// Mid-scale of the probe's 10-bit ADCs.
const ADC_MIDPOINT: i32 = 512;
/// Full-scale input range in microvolts over the 10-bit code space.
const MICROVOLTS_PER_RANGE: f32 = 1.2e6;
const CHANNELS_PER_ADC: usize = 12;

/// One-shot per-channel offset learner.
///
/// Samples inside the settle interval are ignored; afterwards each decoded
/// sample feeds the accumulator until the minimum count is reached, at
/// which point the mean offsets are computed once and the complete flag
/// latches true for the rest of the session.
pub struct BaselineEstimator {
    settle_secs: f64,
    min_samples: usize,
    start_time: Option<f64>,
    sums: Vec<f64>,
    count: usize,
    offsets: Vec<f32>,
    complete: bool,
}

impl BaselineEstimator {
    pub fn new(channels: usize, settle_secs: f64, min_samples: usize) -> Self {
        BaselineEstimator {
            settle_secs,
            min_samples,
            start_time: None,
            sums: vec![0.0; channels],
            count: 0,
            offsets: vec![0.0; channels],
            complete: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed one decoded sample vector; once complete, corrects it in place.
    pub fn observe_and_correct(&mut self, timestamp: f64, samples: &mut [f32]) {
        if self.complete {
            for (s, &o) in samples.iter_mut().zip(&self.offsets) {
                *s -= o;
            }
            return;
        }
        let start = *self.start_time.get_or_insert(timestamp);
        if timestamp - start < self.settle_secs {
            return;
        }
        for (sum, &s) in self.sums.iter_mut().zip(samples.iter()) {
            *sum += s as f64;
        }
        self.count += 1;
        if self.count >= self.min_samples {
            let n = self.count as f64;
            for (o, &sum) in self.offsets.iter_mut().zip(&self.sums) {
                *o = (sum / n) as f32;
            }
            self.complete = true;
        }
    }
}

/// One output band (AP or LFP) of the probe.
struct Band {
    stream: StreamId,
    scale: f32,
    averager: Option<Averager>,
    accumulator: BlockAccumulator,
    baseline: BaselineEstimator,
}

impl Band {
    fn push(&mut self, timestamp: f64, samples: Vec<f32>, sink: &mut dyn SampleSink) {
        let emitted = match &mut self.averager {
            Some(avg) => avg.push(&samples),
            None => Some(samples),
        };
        if let Some(mut out) = emitted {
            self.baseline.observe_and_correct(timestamp, &mut out);
            if let Some(block) = self.accumulator.push_sample(&out, timestamp, 0) {
                sink.push_block(self.stream, block);
            }
        }
    }

    fn flush(&mut self) {
        if let Some(avg) = &mut self.averager {
            avg.reset();
        }
        self.accumulator.discard_partial();
    }
}

pub struct NeuropixelsV1Decoder {
    device: DeviceIndex,
    link: Arc<AcquisitionLink>,
    queue: FrameQueue,
    serializer: RegisterBridge,
    probe: RegisterBridge,
    flex: RegisterBridge,
    pub settings: ProbeSettings,
    adc_cal_path: Option<PathBuf>,
    gain_cal_path: Option<PathBuf>,
    adc_cal: Option<AdcCalibration>,
    gain_cal: Option<GainCalibration>,
    settle_secs: f64,
    baseline_samples: usize,
    enabled: bool,
    ap: Band,
    lfp: Band,
}

impl NeuropixelsV1Decoder {
    /// `hub` is the deserializer device carrying this probe's serdes pair.
    pub fn new(link: Arc<AcquisitionLink>, device: DeviceIndex, hub: DeviceIndex) -> Self {
        let settings = ProbeSettings::default();
        let settle_secs = 5.0;
        let baseline_samples = AP_SAMPLE_RATE as usize;
        NeuropixelsV1Decoder {
            device,
            queue: FrameQueue::new(),
            serializer: RegisterBridge::new(link.clone(), hub, crate::registers::ds90ub9x::SER_ADDR),
            probe: RegisterBridge::new(link.clone(), hub, npix1::CHIP_ADDR),
            flex: RegisterBridge::new(link.clone(), hub, npix1::FLEX_EEPROM_ADDR)
                .with_16bit_addressing(),
            link,
            adc_cal_path: None,
            gain_cal_path: None,
            adc_cal: None,
            gain_cal: None,
            settle_secs,
            baseline_samples,
            enabled: false,
            ap: Self::band(device, "ap", &settings, None, AP_BLOCK_LEN, settle_secs, baseline_samples),
            lfp: Self::band(
                device,
                "lfp",
                &settings,
                Some(LFP_DIVISOR),
                LFP_BLOCK_LEN,
                settle_secs,
                baseline_samples / LFP_DIVISOR,
            ),
            settings,
        }
    }

    fn band(
        device: DeviceIndex,
        name: &'static str,
        settings: &ProbeSettings,
        divisor: Option<usize>,
        block_len: usize,
        settle_secs: f64,
        baseline_samples: usize,
    ) -> Band {
        let gain = if name == "ap" {
            settings.ap_gain
        } else {
            settings.lfp_gain
        };
        Band {
            stream: StreamId { device, name },
            scale: MICROVOLTS_PER_RANGE / 1024.0 / GAIN_STEPS[gain as usize] as f32,
            averager: divisor.map(|d| Averager::new(d, NUM_CHANNELS)),
            accumulator: BlockAccumulator::new(NUM_CHANNELS, block_len),
            baseline: BaselineEstimator::new(NUM_CHANNELS, settle_secs, baseline_samples),
        }
    }

    pub fn calibration_files(&mut self, adc: PathBuf, gain: PathBuf) {
        self.adc_cal_path = Some(adc);
        self.gain_cal_path = Some(gain);
    }

    /// Inject already-parsed calibration, bypassing the file loaders.
    pub fn with_calibration(mut self, adc: AdcCalibration, gain: GainCalibration) -> Self {
        self.adc_cal = Some(adc);
        self.gain_cal = Some(gain);
        self
    }

    pub fn set_baseline_schedule(&mut self, settle_secs: f64, min_samples: usize) {
        self.settle_secs = settle_secs;
        self.baseline_samples = min_samples;
        self.ap.baseline = BaselineEstimator::new(NUM_CHANNELS, settle_secs, min_samples);
        self.lfp.baseline =
            BaselineEstimator::new(NUM_CHANNELS, settle_secs, min_samples / LFP_DIVISOR);
    }

    /// Replace the electrode/gain selection programmed at bring-up.
    pub fn set_settings(&mut self, settings: ProbeSettings) {
        self.ap.scale =
            MICROVOLTS_PER_RANGE / 1024.0 / GAIN_STEPS[settings.ap_gain as usize] as f32;
        self.lfp.scale =
            MICROVOLTS_PER_RANGE / 1024.0 / GAIN_STEPS[settings.lfp_gain as usize] as f32;
        self.settings = settings;
    }

    pub fn baseline_complete(&self) -> (bool, bool) {
        (self.ap.baseline.is_complete(), self.lfp.baseline.is_complete())
    }

    /// Probe serial from the headstage flex EEPROM.
    fn read_serial(&self) -> DaqResult<u64> {
        Ok(self.flex.read_word(0x0000, 4)? as u64)
    }

    fn load_calibration(&mut self, serial: u64) -> DaqResult<()> {
        if self.adc_cal.is_some() && self.gain_cal.is_some() {
            return Ok(());
        }
        let adc_path = self
            .adc_cal_path
            .clone()
            .ok_or_else(|| DaqError::Calibration("no ADC calibration file configured".into()))?;
        let gain_path = self
            .gain_cal_path
            .clone()
            .ok_or_else(|| DaqError::Calibration("no gain calibration file configured".into()))?;
        self.adc_cal = Some(load_adc_calibration(&adc_path, serial)?);
        self.gain_cal = Some(load_gain_calibration(&gain_path, serial)?);
        Ok(())
    }

    fn apply_gain_correction(&mut self) {
        let cal = self.gain_cal.as_ref().expect("gain calibration loaded");
        self.ap.scale = MICROVOLTS_PER_RANGE / 1024.0
            / GAIN_STEPS[self.settings.ap_gain as usize] as f32
            * cal.ap_factors[self.settings.ap_gain as usize] as f32;
        self.lfp.scale = MICROVOLTS_PER_RANGE / 1024.0
            / GAIN_STEPS[self.settings.lfp_gain as usize] as f32
            * cal.lfp_factors[self.settings.lfp_gain as usize] as f32;
    }

    fn decode_band(&self, frame: &RawFrame, offset: usize, scale: f32) -> Vec<f32> {
        let cal = self.adc_cal.as_ref();
        (0..NUM_CHANNELS)
            .map(|ch| {
                let mut raw = frame.u16_at(offset + 2 * ch) as i32;
                if let Some(cal) = cal {
                    let trim = &cal.adcs[ch / CHANNELS_PER_ADC];
                    if raw >= trim.threshold {
                        raw -= trim.offset;
                    }
                }
                (raw - ADC_MIDPOINT) as f32 * scale
            })
            .collect()
    }

    /// Decode one queued frame; returns false when the queue is empty.
    pub(crate) fn step(&mut self, sink: &mut dyn SampleSink) -> bool {
        let Some(frame) = self.queue.try_pop() else {
            return false;
        };
        let timestamp = self.link.timestamp_to_secs(frame.ticks);
        let ap = self.decode_band(&frame, AP_OFFSET, self.ap.scale);
        let lfp = self.decode_band(&frame, LFP_OFFSET, self.lfp.scale);
        self.ap.push(timestamp, ap, sink);
        self.lfp.push(timestamp, lfp, sink);
        true
    }
}

impl Decoder for NeuropixelsV1Decoder {
    fn device(&self) -> DeviceIndex {
        self.device
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn configure(&mut self) -> DaqResult<()> {
        // Wake the serdes pair so the probe ASIC answers at all.
        self.serializer.write_byte(ds90ub953::RESET, 0x01)?;
        self.serializer
            .write_byte(ds90ub953::GPIO10, ds90ub953::GPIO_HIGH)?;
        self.serializer
            .write_byte(ds90ub953::GPIO32, ds90ub953::GPIO_HIGH)?;

        let serial = self.read_serial()?;
        self.load_calibration(serial)?;
        self.apply_gain_correction();
        info!("probe {}: serial {serial}, calibration accepted", self.device);

        self.probe.write_byte(npix1::OP_MODE, npix1::OP_RECORD)?;
        self.probe.write_byte(npix1::CAL_MOD, 0x00)?;

        let cal = self.adc_cal.as_ref().expect("ADC calibration loaded");
        ProbeConfigEncoder::new(&self.probe).program(&self.settings, cal)?;

        self.probe.write_byte(npix1::REC_MOD, npix1::REC_ACTIVE)?;
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
        while self.step(sink) {}
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.ap.flush();
        self.lfp.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemorySink;
    use crate::calibration::{AdcTrim, NUM_ADCS, NUM_GAIN_STEPS};
    use crate::mock::MockDriver;

    fn flat_calibration() -> (AdcCalibration, GainCalibration) {
        (
            AdcCalibration {
                serial: 1,
                adcs: vec![AdcTrim::default(); NUM_ADCS],
            },
            GainCalibration {
                serial: 1,
                ap_factors: vec![1.0; NUM_GAIN_STEPS],
                lfp_factors: vec![1.0; NUM_GAIN_STEPS],
            },
        )
    }

    fn test_decoder() -> (NeuropixelsV1Decoder, Arc<AcquisitionLink>) {
        let link = Arc::new(AcquisitionLink::new(Box::new(MockDriver::new(30_000))));
        let (adc, gain) = flat_calibration();
        let mut dec =
            NeuropixelsV1Decoder::new(link.clone(), DeviceIndex::new(1, 0), DeviceIndex::new(1, 255))
                .with_calibration(adc, gain);
        dec.set_baseline_schedule(1.0, 120);
        (dec, link)
    }

    fn probe_frame(device: DeviceIndex, ticks: u64, ap_raw: u16, lfp_raw: u16) -> RawFrame {
        let mut payload = Vec::with_capacity(4 * NUM_CHANNELS);
        for _ in 0..NUM_CHANNELS {
            payload.extend_from_slice(&ap_raw.to_le_bytes());
        }
        for _ in 0..NUM_CHANNELS {
            payload.extend_from_slice(&lfp_raw.to_le_bytes());
        }
        RawFrame::new(device, ticks, payload)
    }

    #[test]
    fn lfp_averages_twelve_frames_exactly() {
        let (mut dec, _link) = test_decoder();
        let dev = dec.device();
        let tx = dec.routes()[0].1.clone();
        let raw = 640u16;

        for i in 0..(LFP_DIVISOR * LFP_BLOCK_LEN) as u64 {
            tx.send(probe_frame(dev, i, 512, raw)).unwrap();
        }
        let mut sink = MemorySink::new();
        dec.decode(&mut sink);

        let lfp = StreamId { device: dev, name: "lfp" };
        let blocks: Vec<_> = sink.blocks_for(lfp).collect();
        assert_eq!(blocks.len(), 1);
        // Identical raw samples must average to the identical value.
        let expected = (raw as i32 - 512) as f32 * dec.lfp.scale;
        assert_eq!(blocks[0].samples[[0, 0]], expected);
        assert_eq!(blocks[0].samples[[383, 9]], expected);
    }

    #[test]
    fn ap_blocks_flush_every_25_samples() {
        let (mut dec, _link) = test_decoder();
        let dev = dec.device();
        let tx = dec.routes()[0].1.clone();
        for i in 0..(2 * AP_BLOCK_LEN + 3) as u64 {
            tx.send(probe_frame(dev, i, 512, 512)).unwrap();
        }
        let mut sink = MemorySink::new();
        dec.decode(&mut sink);

        let ap = StreamId { device: dev, name: "ap" };
        let blocks: Vec<_> = sink.blocks_for(ap).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].sample_numbers.first(), Some(&(AP_BLOCK_LEN as u64)));
    }

    #[test]
    fn adc_correction_applies_above_threshold() {
        let (mut dec, _link) = test_decoder();
        let mut cal = dec.adc_cal.take().unwrap();
        for trim in &mut cal.adcs {
            trim.offset = 4;
            trim.threshold = 600;
        }
        dec.adc_cal = Some(cal);
        let dev = dec.device();

        let below = dec.decode_band(&probe_frame(dev, 0, 599, 0), AP_OFFSET, 1.0);
        let above = dec.decode_band(&probe_frame(dev, 0, 600, 0), AP_OFFSET, 1.0);
        assert_eq!(below[0], (599 - 512) as f32);
        assert_eq!(above[0], (600 - 4 - 512) as f32);
    }

    #[test]
    fn baseline_latches_once_per_band_independently() {
        let channels = 2;
        let mut ap = BaselineEstimator::new(channels, 1.0, 3);
        let mut lfp = BaselineEstimator::new(channels, 1.0, 5);

        let mut t = 0.0;
        let mut feed = |est: &mut BaselineEstimator, t: f64, v: f32| {
            let mut s = vec![v; channels];
            est.observe_and_correct(t, &mut s);
            s[0]
        };

        // Settle interval: nothing accumulates.
        feed(&mut ap, t, 10.0);
        assert!(!ap.is_complete());

        // Exactly three post-settle samples complete the AP estimator.
        for _ in 0..3 {
            t += 0.5;
            feed(&mut ap, 1.0 + t, 10.0);
        }
        assert!(ap.is_complete());
        assert!(!lfp.is_complete());

        // Completed band subtracts the learned offset and never recomputes.
        assert_eq!(feed(&mut ap, 10.0, 10.0), 0.0);
        assert_eq!(feed(&mut ap, 11.0, 250.0), 240.0);
        assert_eq!(feed(&mut ap, 12.0, 250.0), 240.0);
    }

    #[test]
    fn flush_discards_queue_and_partial_blocks() {
        let (mut dec, _link) = test_decoder();
        let dev = dec.device();
        let tx = dec.routes()[0].1.clone();
        for i in 0..5 {
            tx.send(probe_frame(dev, i, 512, 512)).unwrap();
        }
        let mut sink = MemorySink::new();
        dec.decode(&mut sink);
        assert!(sink.blocks.is_empty());

        tx.send(probe_frame(dev, 6, 512, 512)).unwrap();
        dec.flush();
        assert_eq!(dec.queued(), 0);

        // After a flush, a fresh full block is still emitted cleanly.
        for i in 0..AP_BLOCK_LEN as u64 {
            tx.send(probe_frame(dev, 10 + i, 512, 512)).unwrap();
        }
        dec.decode(&mut sink);
        let ap = StreamId { device: dev, name: "ap" };
        assert_eq!(sink.blocks_for(ap).count(), 1);
    }
}
