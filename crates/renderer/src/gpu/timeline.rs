use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ratemap::StatisticsSnapshot;
use tracing::{debug, warn};

use super::pacer::FramePermit;
use super::readback::{read_statistics, ExpectedStatistics, StatisticsReport};

/// How often the retire worker complains about a completion callback that
/// has not arrived yet.
const OVERDUE_INTERVAL: Duration = Duration::from_secs(2);

/// The device operations the retire worker needs.
pub(crate) trait RetireDevice: Send + 'static {
    type Submission: Send + 'static;
    type Staging: Send + 'static;

    /// Block until `submission` has executed. Later submissions may still
    /// be running.
    fn wait_for(&self, submission: &Self::Submission) -> Result<()>;

    fn read_statistics(
        &self,
        submission: &Self::Submission,
        staging: &Self::Staging,
    ) -> Result<StatisticsSnapshot>;
}

impl RetireDevice for wgpu::Device {
    type Submission = wgpu::SubmissionIndex;
    type Staging = wgpu::Buffer;

    fn wait_for(&self, submission: &wgpu::SubmissionIndex) -> Result<()> {
        self.poll(wgpu::PollType::WaitForSubmissionIndex(submission.clone()))
            .map(drop)
            .context("failed to poll device for frame completion")
    }

    fn read_statistics(
        &self,
        submission: &wgpu::SubmissionIndex,
        staging: &wgpu::Buffer,
    ) -> Result<StatisticsSnapshot> {
        read_statistics(self, submission, staging)
    }
}

/// Statistics copy recorded into a frame, to be read once the frame retires.
pub(crate) struct PendingReadback<D: RetireDevice = wgpu::Device> {
    pub staging: D::Staging,
    pub expected: ExpectedStatistics,
}

/// A submitted frame whose permit is held until the GPU has finished it.
pub(crate) struct InFlightFrame<D: RetireDevice = wgpu::Device> {
    pub frame: u64,
    pub submission: D::Submission,
    pub permit: FramePermit,
    pub readback: Option<PendingReadback<D>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrameEvent {
    Retired {
        frame: u64,
        statistics: Option<StatisticsReport>,
    },
}

/// Retires submitted frames on a worker thread.
///
/// Frames are retired in submission order: the worker waits for the frame's
/// own submission and its completion callback, resolves any pending
/// readback, publishes a [`FrameEvent`] and only then returns the frame's
/// permit to the pacer. There is no timeout on completion; a frame is only
/// released without completing once the timeline shuts down.
pub(crate) struct FrameTimeline<D: RetireDevice = wgpu::Device> {
    submissions: Option<Sender<InFlightFrame<D>>>,
    completions: Option<Sender<u64>>,
    events: Receiver<FrameEvent>,
    worker: Option<JoinHandle<()>>,
}

impl<D: RetireDevice> FrameTimeline<D> {
    pub fn spawn(device: D) -> Result<Self> {
        Self::with_overdue_interval(device, OVERDUE_INTERVAL)
    }

    fn with_overdue_interval(device: D, overdue: Duration) -> Result<Self> {
        let (submission_tx, submission_rx) = unbounded();
        let (completion_tx, completion_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let worker = thread::Builder::new()
            .name("frame-retire".into())
            .spawn(move || retire_frames(device, submission_rx, completion_rx, event_tx, overdue))
            .context("failed to spawn frame retire worker")?;

        Ok(Self {
            submissions: Some(submission_tx),
            completions: Some(completion_tx),
            events: event_rx,
            worker: Some(worker),
        })
    }

    /// Callback for `Queue::on_submitted_work_done` announcing `frame`.
    pub fn completion_callback(&self, frame: u64) -> impl FnOnce() + Send + 'static {
        let completions = self.completions.clone();
        move || {
            if let Some(completions) = completions {
                let _ = completions.send(frame);
            }
        }
    }

    pub fn submit(&self, in_flight: InFlightFrame<D>) {
        if let Some(submissions) = &self.submissions {
            if let Err(err) = submissions.send(in_flight) {
                warn!(frame = err.0.frame, "retire worker stopped; releasing frame immediately");
            }
        }
    }

    pub fn drain_events(&self) -> Vec<FrameEvent> {
        self.events.try_iter().collect()
    }
}

impl<D: RetireDevice> Drop for FrameTimeline<D> {
    fn drop(&mut self) {
        self.submissions.take();
        // Once the callbacks still held by the queue have fired, the worker
        // sees the completion channel disconnect and stops waiting.
        self.completions.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("frame retire worker panicked");
            }
        }
    }
}

fn retire_frames<D: RetireDevice>(
    device: D,
    submissions: Receiver<InFlightFrame<D>>,
    completions: Receiver<u64>,
    events: Sender<FrameEvent>,
    overdue: Duration,
) {
    let mut completed: Option<u64> = None;

    for in_flight in submissions.iter() {
        let InFlightFrame {
            frame,
            submission,
            permit,
            readback,
        } = in_flight;

        wait_for_submission(&device, frame, &submission);
        let mut waited = Duration::ZERO;
        let finished = loop {
            if completed.is_some_and(|done| done >= frame) {
                break true;
            }
            match completions.recv_timeout(overdue) {
                Ok(done) => completed = Some(completed.map_or(done, |prev| prev.max(done))),
                Err(RecvTimeoutError::Timeout) => {
                    waited += overdue;
                    warn!(frame, ?waited, "completion callback overdue; polling device again");
                    wait_for_submission(&device, frame, &submission);
                }
                Err(RecvTimeoutError::Disconnected) => break false,
            }
        };

        if !finished {
            debug!(frame, "timeline shut down before frame completed; skipping readback");
            let _ = events.send(FrameEvent::Retired {
                frame,
                statistics: None,
            });
            permit.release();
            continue;
        }

        let statistics = readback.and_then(|readback| {
            match device.read_statistics(&submission, &readback.staging) {
                Ok(snapshot) => Some(StatisticsReport::new(frame, readback.expected, snapshot)),
                Err(err) => {
                    warn!(frame, error = %format!("{err:#}"), "statistics readback failed");
                    None
                }
            }
        });

        debug!(frame, readback = statistics.is_some(), "frame retired");
        let _ = events.send(FrameEvent::Retired { frame, statistics });
        permit.release();
    }
}

fn wait_for_submission<D: RetireDevice>(device: &D, frame: u64, submission: &D::Submission) {
    if let Err(err) = device.wait_for(submission) {
        warn!(frame, error = %format!("{err:#}"), "waiting for frame submission failed");
    }
}
