//! VisionWorker: a `TrackerManager` running on its own thread.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use ndarray::{Array2, Array3};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, TrackError};
use crate::tracker::{BoundingRange, Snapshot, TrackerManager};
use crate::vision::filter::FilterFactory;
use crate::vision::frame::to_grayscale;
use crate::vision::segments::SegmentDetector;

/// Frame as delivered by the camera.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Gray(Array2<u8>),
    /// `H x W x 3`, BGR channel order
    Bgr(Array3<u8>),
}

/// Requests handled by the worker, in order of arrival.
#[derive(Debug, Clone)]
pub enum VisionCommand {
    Frame { frame: FramePayload, sensitivity: f32 },
    SelectCell(BoundingRange),
    KillCell,
    KillAspiration,
    KillPipette,
    Reset,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum VisionEvent {
    Snapshot(Snapshot),
    CellSelection(Result<BoundingRange, TrackError>),
}

/// Handle to a running vision worker.
///
/// Every `Frame` command produces exactly one `Snapshot` event and every
/// `SelectCell` one `CellSelection` event. Loss flags are cleared once the
/// snapshot carrying them has been handed to the event channel.
pub struct VisionWorker {
    commands: Sender<VisionCommand>,
    events: Receiver<VisionEvent>,
    handle: JoinHandle<()>,
}

impl VisionWorker {
    /// Move `manager` onto a new thread. `capacity` bounds both channels.
    pub fn spawn<D, M>(manager: TrackerManager<D, M>, capacity: usize) -> Self
    where
        D: SegmentDetector + Send + 'static,
        M: FilterFactory + Send + 'static,
        M::Filter: Send + 'static,
    {
        let (commands, command_rx) = bounded::<VisionCommand>(capacity);
        let (event_tx, events) = bounded::<VisionEvent>(capacity);
        let handle = thread::spawn(move || run(manager, &command_rx, &event_tx));
        Self {
            commands,
            events,
            handle,
        }
    }

    /// Queue a command, blocking while the queue is full.
    pub fn send(&self, command: VisionCommand) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::Disconnected)
    }

    /// Queue a frame without blocking. Returns `Ok(false)` when the queue is full
    /// and the frame was dropped.
    pub fn try_submit_frame(&self, frame: FramePayload, sensitivity: f32) -> Result<bool, PipelineError> {
        match self.commands.try_send(VisionCommand::Frame { frame, sensitivity }) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::Disconnected),
        }
    }

    /// Queue a frame, blocking while the queue is full.
    pub fn submit_frame(&self, frame: FramePayload, sensitivity: f32) -> Result<(), PipelineError> {
        self.send(VisionCommand::Frame { frame, sensitivity })
    }

    /// Ask for a new cell track; answered by a `CellSelection` event.
    pub fn select_cell(&self, range: BoundingRange) -> Result<(), PipelineError> {
        self.send(VisionCommand::SelectCell(range))
    }

    /// A sender for another thread, e.g. the camera loop.
    pub fn command_sender(&self) -> Sender<VisionCommand> {
        self.commands.clone()
    }

    /// Snapshots and selection results, in command order.
    pub fn events(&self) -> &Receiver<VisionEvent> {
        &self.events
    }

    /// Stop the worker and wait for its thread. Pending events are discarded.
    ///
    /// Commands queued ahead of the shutdown are still handled. Senders from
    /// [`command_sender`](Self::command_sender) may outlive the worker.
    pub fn shutdown(self) -> Result<(), PipelineError> {
        let Self {
            commands,
            events,
            handle,
        } = self;
        // unblocks a worker waiting on a full event queue
        drop(events);
        // blocks behind a full queue; fails only once the worker has exited
        if commands.send(VisionCommand::Shutdown).is_err() {
            debug!("vision worker already stopped");
        }
        drop(commands);
        handle.join().map_err(|_| PipelineError::WorkerPanicked)
    }
}

fn run<D, M>(
    mut manager: TrackerManager<D, M>,
    commands: &Receiver<VisionCommand>,
    events: &Sender<VisionEvent>,
) where
    D: SegmentDetector,
    M: FilterFactory,
{
    info!("vision worker started");
    while let Ok(command) = commands.recv() {
        let event = match command {
            VisionCommand::Frame { frame, sensitivity } => {
                let snapshot = match frame {
                    FramePayload::Gray(gray) => manager.update(gray.view(), sensitivity),
                    FramePayload::Bgr(color) => {
                        let gray = to_grayscale(color.view());
                        manager.update(gray.view(), sensitivity)
                    }
                };
                if events.send(VisionEvent::Snapshot(snapshot)).is_err() {
                    break;
                }
                manager.clear_frame_flags();
                continue;
            }
            VisionCommand::SelectCell(range) => {
                VisionEvent::CellSelection(manager.initialize_cell_track(range))
            }
            VisionCommand::KillCell => {
                manager.kill_cell_track();
                continue;
            }
            VisionCommand::KillAspiration => {
                manager.kill_aspiration_track();
                continue;
            }
            VisionCommand::KillPipette => {
                manager.kill_pipette_track();
                continue;
            }
            VisionCommand::Reset => {
                debug!("vision session reset");
                manager.reset();
                continue;
            }
            VisionCommand::Shutdown => break,
        };
        if events.send(event).is_err() {
            warn!("event receiver dropped");
            break;
        }
    }
    info!(frames = manager.frame_id(), "vision worker stopped");
}
