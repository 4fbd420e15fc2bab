use crate::frame::DeviceIndex;
use ndarray::Array2;

/// Identifies one output stream of one device (a device may emit several,
/// e.g. a probe's AP and LFP bands).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StreamId {
    pub device: DeviceIndex,
    pub name: &'static str,
}

/// One atomically emitted multi-channel block.
#[derive(Debug)]
pub struct SampleBlock {
    /// Calibrated samples, shape (channels, block length).
    pub samples: Array2<f32>,
    /// Monotonic per-sample numbers within the stream.
    pub sample_numbers: Vec<u64>,
    /// Per-sample timestamps in seconds of the link clock.
    pub timestamps: Vec<f64>,
    /// Per-sample event-code bitmask.
    pub event_codes: Vec<u64>,
}

impl SampleBlock {
    pub fn block_len(&self) -> usize {
        self.sample_numbers.len()
    }

    pub fn num_channels(&self) -> usize {
        self.samples.nrows()
    }
}

/// Opaque downstream consumer of emitted blocks.
pub trait SampleSink: Send {
    fn push_block(&mut self, stream: StreamId, block: SampleBlock);
}

/// Sink handle shared between the cooperative decode cycle and any
/// dedicated polling threads.
pub type SharedSink = std::sync::Arc<std::sync::Mutex<dyn SampleSink>>;

/// Sink that keeps every block; test and inspection use only.
#[derive(Default)]
pub struct MemorySink {
    pub blocks: Vec<(StreamId, SampleBlock)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_for(&self, stream: StreamId) -> impl Iterator<Item = &SampleBlock> {
        self.blocks
            .iter()
            .filter(move |(s, _)| *s == stream)
            .map(|(_, b)| b)
    }
}

impl SampleSink for MemorySink {
    fn push_block(&mut self, stream: StreamId, block: SampleBlock) {
        self.blocks.push((stream, block));
    }
}

/// Rolling per-channel buffer behind every decoder.
///
/// Samples accumulate column by column; once exactly `block_len` have been
/// pushed the block is handed back whole and the fill counter resets to
/// zero. Sample numbers increase monotonically across blocks.
pub struct BlockAccumulator {
    samples: Array2<f32>,
    sample_numbers: Vec<u64>,
    timestamps: Vec<f64>,
    event_codes: Vec<u64>,
    block_len: usize,
    filled: usize,
    next_number: u64,
}

impl BlockAccumulator {
    pub fn new(channels: usize, block_len: usize) -> Self {
        BlockAccumulator {
            samples: Array2::zeros((channels, block_len)),
            sample_numbers: vec![0; block_len],
            timestamps: vec![0.0; block_len],
            event_codes: vec![0; block_len],
            block_len,
            filled: 0,
            next_number: 0,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Append one multi-channel sample; returns the finished block when the
    /// fill counter reaches the configured length.
    pub fn push_sample(
        &mut self,
        column: &[f32],
        timestamp: f64,
        event_code: u64,
    ) -> Option<SampleBlock> {
        for (ch, &value) in column.iter().enumerate() {
            self.samples[[ch, self.filled]] = value;
        }
        self.sample_numbers[self.filled] = self.next_number;
        self.timestamps[self.filled] = timestamp;
        self.event_codes[self.filled] = event_code;
        self.next_number += 1;
        self.filled += 1;

        if self.filled < self.block_len {
            return None;
        }
        self.filled = 0;
        let channels = self.num_channels();
        Some(SampleBlock {
            samples: std::mem::replace(&mut self.samples, Array2::zeros((channels, self.block_len))),
            sample_numbers: std::mem::replace(&mut self.sample_numbers, vec![0; self.block_len]),
            timestamps: std::mem::replace(&mut self.timestamps, vec![0.0; self.block_len]),
            event_codes: std::mem::replace(&mut self.event_codes, vec![0; self.block_len]),
        })
    }

    /// Discard partially accumulated samples without touching the sample
    /// numbering. Used when acquisition stops mid-block.
    pub fn discard_partial(&mut self) {
        self.filled = 0;
    }
}

/// Integer N:1 rate reduction: sum N raw sample vectors, divide by N, and
/// zero the accumulator immediately after each emitted sample.
pub struct Averager {
    factor: usize,
    acc: Vec<f64>,
    count: usize,
}

impl Averager {
    pub fn new(factor: usize, channels: usize) -> Self {
        assert!(factor >= 1);
        Averager {
            factor,
            acc: vec![0.0; channels],
            count: 0,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn push(&mut self, raw: &[f32]) -> Option<Vec<f32>> {
        for (a, &v) in self.acc.iter_mut().zip(raw) {
            *a += v as f64;
        }
        self.count += 1;
        if self.count < self.factor {
            return None;
        }
        let n = self.factor as f64;
        let out = self.acc.iter().map(|&a| (a / n) as f32).collect();
        self.acc.iter_mut().for_each(|a| *a = 0.0);
        self.count = 0;
        Some(out)
    }

    pub fn reset(&mut self) {
        self.acc.iter_mut().for_each(|a| *a = 0.0);
        self.count = 0;
    }
}
