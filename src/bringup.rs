//! Background device bring-up with pollable progress.
//!
//! Configuration can take seconds (shift-register chains are shipped one
//! byte at a time), so it runs on its own thread. Callers poll the
//! progress percentage from any thread and join for the result; no UI
//! toolkit is involved.

use crate::error::DaqResult;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Write-side handle given to the bring-up closure.
#[derive(Clone)]
pub struct Progress {
    percent: Arc<AtomicU8>,
}

impl Progress {
    pub fn set(&self, percent: u8) {
        self.percent.store(percent.min(100), Ordering::SeqCst);
    }

    /// Convenience for "step i of n completed".
    pub fn step(&self, completed: usize, total: usize) {
        if total > 0 {
            self.set((completed * 100 / total) as u8);
        }
    }
}

/// A running bring-up operation.
pub struct BringupTask {
    percent: Arc<AtomicU8>,
    handle: JoinHandle<DaqResult<()>>,
}

impl BringupTask {
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce(&Progress) -> DaqResult<()> + Send + 'static,
    {
        let percent = Arc::new(AtomicU8::new(0));
        let progress = Progress {
            percent: Arc::clone(&percent),
        };
        let handle = std::thread::spawn(move || {
            let result = work(&progress);
            if result.is_ok() {
                progress.set(100);
            }
            result
        });
        BringupTask { percent, handle }
    }

    pub fn progress(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until bring-up completes and return its result.
    pub fn join(self) -> DaqResult<()> {
        self.handle.join().expect("bring-up thread panicked")
    }
}
