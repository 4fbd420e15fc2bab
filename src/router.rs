use crate::error::{DaqError, DaqResult};
use crate::frame::{DeviceIndex, RawFrame};
use crate::link::{AcquisitionLink, LinkReturn};
use crossbeam_channel::Sender;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single ingestion loop between the acquisition link and the per-device
/// frame queues.
///
/// One dedicated thread runs [`run`](FrameRouter::run), blocking on the
/// link's frame read. A frame whose device index has a registered decoder
/// is handed over whole; anything else is dropped on the spot. The loop is
/// not preemptible inside the blocking read: the stop flag takes effect
/// when the current read returns.
pub struct FrameRouter {
    link: Arc<AcquisitionLink>,
    routes: HashMap<u32, Sender<RawFrame>>,
    stop: Arc<AtomicBool>,
}

impl FrameRouter {
    pub fn new(link: Arc<AcquisitionLink>, stop: Arc<AtomicBool>) -> Self {
        FrameRouter {
            link,
            routes: HashMap::new(),
            stop,
        }
    }

    /// Claim `device` for one decoder queue. At most one decoder may claim
    /// any device index.
    pub fn register(&mut self, device: DeviceIndex, queue: Sender<RawFrame>) -> DaqResult<()> {
        if self.routes.insert(device.raw(), queue).is_some() {
            return Err(DaqError::FatalConfig(format!(
                "device {device} claimed by two decoders"
            )));
        }
        Ok(())
    }

    /// Route frames until stopped or the link fails.
    ///
    /// `Stop` ends the loop cleanly; every other failure code, timeouts
    /// included, terminates the acquisition session and is not retried.
    pub fn run(&mut self) -> DaqResult<()> {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            match self.link.read_frame() {
                Ok(frame) => {
                    match self.routes.get(&frame.device.raw()) {
                        Some(queue) => {
                            // A receiver dropped mid-session still counts as
                            // delivered; the frame dies with the send.
                            let _ = queue.send(frame);
                        }
                        None => debug!("dropping frame from unclaimed device {}", frame.device),
                    }
                }
                Err(LinkReturn::Stop) => {
                    info!("link reported acquisition stop");
                    return Ok(());
                }
                Err(code) => {
                    error!("frame read failed ({code:?}); stopping acquisition");
                    return Err(DaqError::AcquisitionStopped(code));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::FrameQueue;
    use crate::mock::MockDriver;

    fn setup(frames: Vec<RawFrame>) -> (FrameRouter, Arc<AtomicBool>) {
        let driver = MockDriver::new(1000);
        for frame in frames {
            driver.push_frame(frame);
        }
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let stop = Arc::new(AtomicBool::new(false));
        (FrameRouter::new(link, Arc::clone(&stop)), stop)
    }

    #[test]
    fn frames_reach_exactly_their_own_decoder() {
        let a = DeviceIndex::new(0, 1);
        let b = DeviceIndex::new(0, 2);
        let unclaimed = DeviceIndex::new(0, 9);
        let (mut router, _stop) = setup(vec![
            RawFrame::new(a, 1, vec![]),
            RawFrame::new(unclaimed, 2, vec![]),
            RawFrame::new(b, 3, vec![]),
            RawFrame::new(a, 4, vec![]),
        ]);

        let qa = FrameQueue::new();
        let qb = FrameQueue::new();
        router.register(a, qa.sender()).unwrap();
        router.register(b, qb.sender()).unwrap();

        // Queue exhausts -> Stop -> clean exit.
        router.run().unwrap();

        assert_eq!(qa.len(), 2);
        assert_eq!(qb.len(), 1);
        // FIFO within one device's queue.
        assert_eq!(qa.try_pop().unwrap().ticks, 1);
        assert_eq!(qa.try_pop().unwrap().ticks, 4);
    }

    #[test]
    fn duplicate_claims_are_rejected() {
        let (mut router, _stop) = setup(vec![]);
        let dev = DeviceIndex::new(0, 1);
        let q = FrameQueue::new();
        router.register(dev, q.sender()).unwrap();
        let err = router.register(dev, q.sender()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn read_failure_terminates_without_retry() {
        let driver = MockDriver::new(1000);
        driver.fail_next_read(LinkReturn::ReadFailure);
        driver.push_frame(RawFrame::new(DeviceIndex::new(0, 1), 1, vec![]));
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let mut router = FrameRouter::new(link, Arc::new(AtomicBool::new(false)));

        let err = router.run().unwrap_err();
        assert!(matches!(
            err,
            DaqError::AcquisitionStopped(LinkReturn::ReadFailure)
        ));
    }

    #[test]
    fn timeout_terminates_without_routing_the_queued_frame() {
        let a = DeviceIndex::new(0, 1);
        let driver = MockDriver::new(1000);
        driver.fail_next_read(LinkReturn::Timeout);
        driver.push_frame(RawFrame::new(a, 1, vec![]));
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let mut router = FrameRouter::new(link, Arc::new(AtomicBool::new(false)));
        let q = FrameQueue::new();
        router.register(a, q.sender()).unwrap();

        let err = router.run().unwrap_err();
        assert!(matches!(
            err,
            DaqError::AcquisitionStopped(LinkReturn::Timeout)
        ));
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn stop_flag_exits_after_current_read() {
        let a = DeviceIndex::new(0, 1);
        let (mut router, stop) = setup(vec![RawFrame::new(a, 1, vec![])]);
        let q = FrameQueue::new();
        router.register(a, q.sender()).unwrap();
        stop.store(true, Ordering::SeqCst);
        router.run().unwrap();
        // Flag was observed before any read happened.
        assert_eq!(q.len(), 0);
    }
}
