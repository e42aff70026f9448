use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacerError {
    #[error("no frame permit became available within {0:?}")]
    Timeout(Duration),
    #[error("frame pacer has shut down")]
    Closed,
}

#[derive(Debug, Default)]
struct Counters {
    outstanding: AtomicUsize,
    high_water_mark: AtomicUsize,
}

/// Counting permit pool bounding the number of frames in flight.
///
/// Tokens live in a bounded channel; acquiring takes one out, dropping the
/// [`FramePermit`] puts it back.
#[derive(Debug, Clone)]
pub struct FramePacer {
    tokens: Receiver<()>,
    returns: Sender<()>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl FramePacer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (returns, tokens) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel was sized for exactly this many tokens.
            let _ = returns.try_send(());
        }
        Self {
            tokens,
            returns,
            capacity,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a permit is free.
    pub fn acquire(&self) -> Result<FramePermit, PacerError> {
        self.tokens.recv().map_err(|_| PacerError::Closed)?;
        Ok(self.issue())
    }

    pub fn acquire_timeout(&self, timeout: Duration) -> Result<FramePermit, PacerError> {
        match self.tokens.recv_timeout(timeout) {
            Ok(()) => Ok(self.issue()),
            Err(RecvTimeoutError::Timeout) => Err(PacerError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(PacerError::Closed),
        }
    }

    pub fn try_acquire(&self) -> Option<FramePermit> {
        self.tokens.try_recv().ok().map(|()| self.issue())
    }

    /// Permits currently held.
    pub fn outstanding(&self) -> usize {
        self.counters.outstanding.load(Ordering::Acquire)
    }

    /// Largest number of permits ever held at once.
    pub fn high_water_mark(&self) -> usize {
        self.counters.high_water_mark.load(Ordering::Acquire)
    }

    /// Wait until every permit has been returned.
    pub fn drain(&self, timeout: Duration) -> Result<(), PacerError> {
        let mut held = Vec::with_capacity(self.capacity);
        for _ in 0..self.capacity {
            held.push(self.acquire_timeout(timeout)?);
        }
        Ok(())
    }

    fn issue(&self) -> FramePermit {
        let outstanding = self.counters.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters
            .high_water_mark
            .fetch_max(outstanding, Ordering::AcqRel);
        FramePermit {
            returns: self.returns.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// One in-flight frame's claim on the pacer. Returned exactly once, on drop.
#[derive(Debug)]
#[must_use = "dropping a permit immediately releases the frame slot"]
pub struct FramePermit {
    returns: Sender<()>,
    counters: Arc<Counters>,
}

impl FramePermit {
    pub fn release(self) {}
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.counters.outstanding.fetch_sub(1, Ordering::AcqRel);
        let _ = self.returns.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use super::*;

    #[test]
    fn permits_are_bounded_by_capacity() {
        let pacer = FramePacer::new(FRAMES_IN_FLIGHT);
        let held: Vec<_> = (0..FRAMES_IN_FLIGHT)
            .map(|_| pacer.try_acquire().unwrap())
            .collect();
        assert_eq!(pacer.outstanding(), 3);
        assert!(pacer.try_acquire().is_none());
        assert_eq!(
            pacer.acquire_timeout(Duration::from_millis(10)).unwrap_err(),
            PacerError::Timeout(Duration::from_millis(10))
        );

        drop(held);
        assert_eq!(pacer.outstanding(), 0);
        let permit = pacer.try_acquire().unwrap();
        permit.release();
        assert_eq!(pacer.outstanding(), 0);
        assert_eq!(pacer.high_water_mark(), 3);
    }

    #[test]
    fn blocked_acquire_resumes_after_release() {
        let pacer = FramePacer::new(1);
        let permit = pacer.acquire().unwrap();
        let waiter = {
            let pacer = pacer.clone();
            thread::spawn(move || pacer.acquire().map(|permit| permit.release()))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(permit);
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn concurrent_use_never_exceeds_capacity() {
        let pacer = FramePacer::new(FRAMES_IN_FLIGHT);
        let violated = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pacer = pacer.clone();
                let violated = Arc::clone(&violated);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let permit = pacer.acquire().unwrap();
                        if pacer.outstanding() > FRAMES_IN_FLIGHT {
                            violated.store(true, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        drop(permit);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(!violated.load(Ordering::SeqCst));
        assert!(pacer.high_water_mark() <= FRAMES_IN_FLIGHT);
        assert_eq!(pacer.outstanding(), 0);
        pacer.drain(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn drain_waits_for_permits_held_elsewhere() {
        let pacer = FramePacer::new(2);
        let permit = pacer.acquire().unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(permit);
        });
        pacer.drain(Duration::from_secs(5)).unwrap();
        releaser.join().unwrap();
        assert_eq!(pacer.outstanding(), 0);
    }
}
