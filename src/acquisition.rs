//! Top-level acquisition session: the single owner of every device
//! instance, the routing thread, and the polling threads.

use crate::block::SharedSink;
use crate::devices::bno055::Bno055Poller;
use crate::devices::Decoder;
use crate::error::DaqResult;
use crate::link::AcquisitionLink;
use crate::router::FrameRouter;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Owns the arena of decoders and the threads that feed them.
///
/// Decoders live here and nowhere else; anything outside the session
/// refers to them by slot index. The routing thread holds only queue
/// senders, never the decoders themselves.
pub struct AcquisitionSession {
    link: Arc<AcquisitionLink>,
    decoders: Vec<Box<dyn Decoder>>,
    pollers: Vec<Bno055Poller>,
    sink: SharedSink,
    stop: Arc<AtomicBool>,
    router_handle: Option<JoinHandle<DaqResult<()>>>,
}

impl AcquisitionSession {
    pub fn new(link: Arc<AcquisitionLink>, sink: SharedSink) -> Self {
        AcquisitionSession {
            link,
            decoders: Vec::new(),
            pollers: Vec::new(),
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            router_handle: None,
        }
    }

    pub fn link(&self) -> &Arc<AcquisitionLink> {
        &self.link
    }

    /// Add a decoder to the arena; returns its slot index.
    pub fn add_decoder(&mut self, decoder: Box<dyn Decoder>) -> usize {
        self.decoders.push(decoder);
        self.decoders.len() - 1
    }

    pub fn add_poller(&mut self, poller: Bno055Poller) {
        self.pollers.push(poller);
    }

    pub fn decoder(&self, slot: usize) -> &dyn Decoder {
        self.decoders[slot].as_ref()
    }

    /// Configure every device. A fatal error aborts bring-up; a refused
    /// activation (calibration) leaves that device disabled and continues.
    pub fn bring_up(&mut self, progress: Option<&crate::bringup::Progress>) -> DaqResult<()> {
        let total = self.decoders.len() + self.pollers.len();
        let mut done = 0usize;
        for decoder in &mut self.decoders {
            match decoder.configure() {
                Ok(()) => info!("device {} configured", decoder.device()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("device {} not activated: {e}", decoder.device()),
            }
            done += 1;
            if let Some(p) = progress {
                p.step(done, total);
            }
        }
        for poller in &mut self.pollers {
            match poller.configure(&self.link) {
                Ok(()) => info!("device {} configured", poller.device()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("device {} not activated: {e}", poller.device()),
            }
            done += 1;
            if let Some(p) = progress {
                p.step(done, total);
            }
        }
        Ok(())
    }

    /// Spawn the routing thread and the polling threads.
    pub fn start(&mut self) -> DaqResult<()> {
        self.stop.store(false, Ordering::SeqCst);
        let mut router = FrameRouter::new(Arc::clone(&self.link), Arc::clone(&self.stop));
        for decoder in self.decoders.iter().filter(|d| d.enabled()) {
            for (device, queue) in decoder.routes() {
                router.register(device, queue)?;
            }
        }
        self.router_handle = Some(std::thread::spawn(move || router.run()));
        for poller in &mut self.pollers {
            poller.start(Arc::clone(&self.sink));
        }
        Ok(())
    }

    /// One cooperative decode cycle over every enabled decoder.
    pub fn process(&mut self) {
        let mut sink = self.sink.lock().unwrap();
        for decoder in self.decoders.iter_mut().filter(|d| d.enabled()) {
            decoder.decode(&mut *sink);
        }
    }

    /// Frames currently queued across all decoders.
    pub fn queued(&self) -> usize {
        self.decoders.iter().map(|d| d.queued()).sum()
    }

    /// Signal the routing thread, join it, stop pollers, and discard any
    /// frames still queued. Queued data is dropped, not flushed downstream.
    pub fn stop(&mut self) -> DaqResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        let result = match self.router_handle.take() {
            Some(handle) => handle.join().expect("routing thread panicked"),
            None => Ok(()),
        };
        for poller in &mut self.pollers {
            poller.stop();
        }
        for decoder in &mut self.decoders {
            decoder.flush();
        }
        result
    }
}
