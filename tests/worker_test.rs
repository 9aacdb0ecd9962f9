mod common;

use std::thread;

use common::{MockDetector, SENSITIVITY, Script, ScriptedFilter, pipette_frame};
use pipette_track::integration::coordinator::{cell_distance_um, cell_settled, latch_ready, pipette_settled};
use pipette_track::integration::wait_for;
use pipette_track::{
    BoundingRange, ControlConfig, FramePayload, PipelineError, TrackerConfig, TrackerManager,
    VisionCommand, VisionEvent, VisionWorker,
};

type Factory = Box<dyn Fn() -> ScriptedFilter + Send>;

fn spawn(script: &Script, stationary_threshold: u32) -> VisionWorker {
    let config = TrackerConfig {
        stationary_threshold,
        ..TrackerConfig::default()
    };
    let factory: Factory = Box::new(script.factory());
    VisionWorker::spawn(TrackerManager::new(MockDetector, factory, config), 4)
}

fn next_snapshot(worker: &VisionWorker) -> pipette_track::Snapshot {
    match worker.events().recv().unwrap() {
        VisionEvent::Snapshot(snapshot) => snapshot,
        other => panic!("expected a snapshot, got {other:?}"),
    }
}

fn select(worker: &VisionWorker, range: BoundingRange) -> BoundingRange {
    worker
        .send(VisionCommand::Frame {
            frame: FramePayload::Gray(pipette_frame()),
            sensitivity: SENSITIVITY,
        })
        .unwrap();
    next_snapshot(worker);
    worker.select_cell(range).unwrap();
    match worker.events().recv().unwrap() {
        VisionEvent::CellSelection(result) => result.unwrap(),
        other => panic!("expected a selection result, got {other:?}"),
    }
}

#[test]
fn test_wait_until_cell_and_pipette_settle() {
    let script = Script::default();
    let worker = spawn(&script, 3);
    let cell = BoundingRange::new(200.0, 110.0, 20.0, 20.0);
    assert_eq!(select(&worker, cell), cell);

    let commands = worker.command_sender();
    let feeder = thread::spawn(move || {
        for _ in 0..10 {
            let frame = VisionCommand::Frame {
                frame: FramePayload::Gray(pipette_frame()),
                sensitivity: SENSITIVITY,
            };
            if commands.send(frame).is_err() {
                break;
            }
        }
    });

    let settled = wait_for(
        worker.events(),
        |s| s.cell.is_active() && cell_settled(s) && pipette_settled(s),
        20,
    )
    .unwrap();
    assert!(settled.cell.stationary_frames >= 3);
    assert!(settled.pipette.stationary_frames >= 3);

    // pipette center (150, 120), cell center (210, 120): 60 px
    let control = ControlConfig::default();
    let distance = cell_distance_um(&settled, &control).unwrap();
    assert!((distance - 60.0 / 72.0).abs() < 1e-5);
    assert!(latch_ready(&settled, &control));

    worker.shutdown().unwrap();
    feeder.join().unwrap();
}

#[test]
fn test_wait_times_out() {
    let script = Script::default();
    let worker = spawn(&script, 50);
    for _ in 0..3 {
        worker
            .submit_frame(FramePayload::Gray(pipette_frame()), SENSITIVITY)
            .unwrap();
    }
    assert_eq!(
        wait_for(worker.events(), pipette_settled, 3),
        Err(PipelineError::Timeout)
    );
    worker.shutdown().unwrap();
}

#[test]
fn test_loss_reported_in_one_snapshot() {
    let script = Script::default();
    let worker = spawn(&script, 50);
    select(&worker, BoundingRange::new(200.0, 110.0, 20.0, 20.0));

    script.move_to(None);
    worker
        .submit_frame(FramePayload::Gray(pipette_frame()), SENSITIVITY)
        .unwrap();
    assert!(next_snapshot(&worker).cell.was_lost());

    worker
        .submit_frame(FramePayload::Gray(pipette_frame()), SENSITIVITY)
        .unwrap();
    let snapshot = next_snapshot(&worker);
    assert!(!snapshot.cell.was_lost());
    assert!(!snapshot.cell.is_active());

    worker.shutdown().unwrap();
}

#[test]
fn test_kill_and_reset_commands() {
    let script = Script::default();
    let worker = spawn(&script, 50);
    select(&worker, BoundingRange::new(200.0, 110.0, 20.0, 20.0));

    worker.send(VisionCommand::KillCell).unwrap();
    worker
        .submit_frame(FramePayload::Gray(pipette_frame()), SENSITIVITY)
        .unwrap();
    let snapshot = next_snapshot(&worker);
    assert!(!snapshot.cell.is_active());
    assert!(snapshot.pipette.is_active());

    worker.send(VisionCommand::Reset).unwrap();
    worker.select_cell(BoundingRange::new(10.0, 10.0, 5.0, 5.0)).unwrap();
    assert!(matches!(
        worker.events().recv().unwrap(),
        VisionEvent::CellSelection(Err(pipette_track::TrackError::NoFrame))
    ));

    worker.shutdown().unwrap();
}
