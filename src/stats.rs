use crate::block::{SampleBlock, SampleSink, StreamId};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Throughput tracker for emitted sample blocks, with all-time totals and
/// a sliding 1 s window rate.
#[derive(Debug)]
pub struct BlockCounter {
    /// All-time total payload bytes.
    pub total_bytes: usize,
    /// All-time number of blocks.
    pub n_blocks: usize,
    /// Time when this counter was created or last reset.
    pub t_begin: Instant,

    window: Duration,
    recent: VecDeque<(Instant, usize)>,
    bytes_in_window: usize,
}

impl Default for BlockCounter {
    fn default() -> Self {
        BlockCounter {
            total_bytes: 0,
            n_blocks: 0,
            t_begin: Instant::now(),
            window: Duration::from_secs(1),
            recent: VecDeque::new(),
            bytes_in_window: 0,
        }
    }
}

impl BlockCounter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Long-term average rate since t_begin, in MB/s.
    pub fn average_rate(&self) -> f64 {
        let secs = self.t_begin.elapsed().as_secs_f64().max(1e-6);
        (self.total_bytes as f64 / secs) / (1024.0 * 1024.0)
    }

    /// Sliding-window rate over the last second, in MB/s.
    pub fn rate(&self) -> f64 {
        let secs = self.window.as_secs_f64().max(1e-6);
        (self.bytes_in_window as f64 / secs) / (1024.0 * 1024.0)
    }

    /// Blocks per second over the sliding window.
    pub fn block_rate(&self) -> f64 {
        self.recent.len() as f64 / self.window.as_secs_f64().max(1e-6)
    }

    /// Record one emitted block of `bytes` payload bytes.
    pub fn increment(&mut self, bytes: usize) {
        let now = Instant::now();
        self.total_bytes += bytes;
        self.n_blocks += 1;

        self.recent.push_back((now, bytes));
        self.bytes_in_window += bytes;
        while let Some(&(ts, sz)) = self.recent.front() {
            if now.duration_since(ts) > self.window {
                self.recent.pop_front();
                self.bytes_in_window -= sz;
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.total_bytes = 0;
        self.n_blocks = 0;
        self.t_begin = Instant::now();
        self.recent.clear();
        self.bytes_in_window = 0;
    }
}

/// Sink that discards sample data and keeps only throughput totals.
#[derive(Default)]
pub struct CountingSink {
    pub counter: BlockCounter,
}

impl CountingSink {
    pub fn new() -> Self {
        Default::default()
    }
}

impl SampleSink for CountingSink {
    fn push_block(&mut self, _stream: StreamId, block: SampleBlock) {
        self.counter
            .increment(block.samples.len() * std::mem::size_of::<f32>());
    }
}
