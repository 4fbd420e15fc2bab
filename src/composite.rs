//! Composite devices: two sub-device decoders advanced in lockstep.

use crate::block::SampleSink;
use crate::devices::analog_io::{AnalogIoDecoder, AVERAGING_FACTOR};
use crate::devices::digital_io::DigitalIoDecoder;
use crate::devices::neuropixels_v1::NeuropixelsV1Decoder;
use crate::devices::Decoder;
use crate::error::DaqResult;
use crate::frame::{DeviceIndex, RawFrame};
use crossbeam_channel::Sender;
use log::warn;

/// Breakout board: the digital/event port annotates the analog stream.
///
/// The event sub-device advances first; then, while one event unit and one
/// full averaging group of analog frames are both buffered, exactly that
/// ratio is consumed and the emitted analog sample carries the event code.
/// The same `>=` buffered-units check is applied to both sub-devices. If
/// either side is disabled, the other decodes independently with no
/// cross-annotation.
pub struct BreakoutBoard {
    digital: DigitalIoDecoder,
    analog: AnalogIoDecoder,
}

impl BreakoutBoard {
    pub fn new(digital: DigitalIoDecoder, analog: AnalogIoDecoder) -> Self {
        BreakoutBoard { digital, analog }
    }
}

impl Decoder for BreakoutBoard {
    fn device(&self) -> DeviceIndex {
        self.analog.device()
    }

    fn enabled(&self) -> bool {
        self.digital.enabled() || self.analog.enabled()
    }

    fn configure(&mut self) -> DaqResult<()> {
        // Sub-devices are brought up independently; one refusing activation
        // leaves the other usable.
        if let Err(e) = self.digital.configure() {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("digital port disabled: {e}");
        }
        self.analog.configure()
    }

    fn routes(&self) -> Vec<(DeviceIndex, Sender<RawFrame>)> {
        let mut routes = Vec::new();
        if self.digital.enabled() {
            routes.extend(self.digital.routes());
        }
        if self.analog.enabled() {
            routes.extend(self.analog.routes());
        }
        routes
    }

    fn queued(&self) -> usize {
        self.digital.queued() + self.analog.queued()
    }

    fn decode(&mut self, sink: &mut dyn SampleSink) {
        match (self.digital.enabled(), self.analog.enabled()) {
            (true, true) => {}
            (true, false) => return self.digital.decode(sink),
            (false, true) => return self.analog.decode(sink),
            (false, false) => return,
        }

        self.digital.drain_to_pending();
        while self.digital.pending_len() >= 1 && self.analog.queued() >= AVERAGING_FACTOR {
            let code = self.digital.pop_pending().expect("pending checked above");
            for _ in 0..AVERAGING_FACTOR {
                let frame = self.analog.pop().expect("queue length checked above");
                self.analog.decode_frame(frame, code, sink);
            }
        }
    }

    fn flush(&mut self) {
        self.digital.flush();
        self.analog.flush();
    }
}

/// Two probes on one headstage, advanced one frame each in lockstep.
pub struct ProbePair {
    a: NeuropixelsV1Decoder,
    b: NeuropixelsV1Decoder,
}

impl ProbePair {
    pub fn new(a: NeuropixelsV1Decoder, b: NeuropixelsV1Decoder) -> Self {
        ProbePair { a, b }
    }
}

impl Decoder for ProbePair {
    fn device(&self) -> DeviceIndex {
        self.a.device()
    }

    fn enabled(&self) -> bool {
        self.a.enabled() || self.b.enabled()
    }

    fn configure(&mut self) -> DaqResult<()> {
        for probe in [&mut self.a, &mut self.b] {
            if let Err(e) = probe.configure() {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("probe {} disabled: {e}", probe.device());
            }
        }
        Ok(())
    }

    fn routes(&self) -> Vec<(DeviceIndex, Sender<RawFrame>)> {
        let mut routes = Vec::new();
        if self.a.enabled() {
            routes.extend(self.a.routes());
        }
        if self.b.enabled() {
            routes.extend(self.b.routes());
        }
        routes
    }

    fn queued(&self) -> usize {
        self.a.queued() + self.b.queued()
    }

    fn decode(&mut self, sink: &mut dyn SampleSink) {
        match (self.a.enabled(), self.b.enabled()) {
            (true, true) => {}
            (true, false) => return self.a.decode(sink),
            (false, true) => return self.b.decode(sink),
            (false, false) => return,
        }
        while self.a.queued() >= 1 && self.b.queued() >= 1 {
            self.a.step(sink);
            self.b.step(sink);
        }
    }

    fn flush(&mut self) {
        self.a.flush();
        self.b.flush();
    }
}
