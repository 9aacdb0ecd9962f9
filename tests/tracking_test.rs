mod common;

use common::{MockDetector, PIPETTE, SENSITIVITY, Script, ScriptedFilter, frame_with_body, pipette_frame};
use pipette_track::config::AspirationConfig;
use pipette_track::{AspirationPhase, BoundingRange, TrackError, TrackerConfig, TrackerManager};

type Factory = Box<dyn Fn() -> ScriptedFilter + Send>;
type Manager = TrackerManager<MockDetector, Factory>;

fn manager(script: &Script) -> Manager {
    let config = TrackerConfig {
        aspiration: AspirationConfig {
            full_aspiration_distance_px: 30.0,
            ..AspirationConfig::default()
        },
        ..TrackerConfig::default()
    };
    let factory: Factory = Box::new(script.factory());
    TrackerManager::new(MockDetector, factory, config)
}

/// Drives a manager with a cell selected at `cell` and returns it after one frame.
fn with_cell(script: &Script, cell: BoundingRange) -> Manager {
    let mut manager = manager(script);
    manager.update(pipette_frame().view(), SENSITIVITY);
    manager.initialize_cell_track(cell).unwrap();
    manager
}

/// Manager that has just entered the aspirating phase.
fn aspirating(script: &Script) -> Manager {
    let mut manager = with_cell(script, BoundingRange::new(152.0, 110.0, 20.0, 20.0));
    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::Aspirating);
    manager
}

#[test]
fn test_cell_approaches_and_aspiration_starts() {
    let script = Script::default();
    let mut manager = with_cell(&script, BoundingRange::new(200.0, 110.0, 20.0, 20.0));

    // right of the tip: still free
    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::NotAspirating);
    assert_eq!(snapshot.pipette.range(), Some(PIPETTE));
    assert!(snapshot.cell.is_active());
    manager.clear_frame_flags();

    // the cell moves onto the tip; the transition is judged on the next frame
    script.move_to(Some(BoundingRange::new(152.0, 110.0, 20.0, 20.0)));
    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::NotAspirating);
    manager.clear_frame_flags();

    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::Aspirating);
    assert!(!snapshot.cell.is_active());
    assert!(!snapshot.cell.was_lost());
    // nothing inside the lumen yet: the aspiration line sits on the tip
    assert_eq!(snapshot.aspiration.range(), Some(PIPETTE));
}

#[test]
fn test_partial_aspiration_tracks_average_edge() {
    let script = Script::default();
    let mut manager = aspirating(&script);

    // edges found at 117 and 121, closer than the full aspiration distance
    let snapshot = manager.update(frame_with_body(120..170).view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::Aspirating);
    assert_eq!(
        snapshot.aspiration.range(),
        Some(BoundingRange::new(119.0, 100.0, 0.0, 40.0))
    );
    assert_eq!(snapshot.aspiration_to_pipette_px(), Some(31.0));
}

#[test]
fn test_full_aspiration_then_body_lost() {
    let script = Script::default();
    let mut manager = aspirating(&script);

    // edges at 57 and 111 span the whole body
    let snapshot = manager.update(frame_with_body(60..110).view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::FullyAspirated);
    assert_eq!(
        snapshot.aspiration.range(),
        Some(BoundingRange::from_tlbr(47.0, 100.0, 121.0, 140.0))
    );
    manager.clear_frame_flags();

    script.move_to(None);
    let snapshot = manager.update(frame_with_body(60..110).view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::NotAspirating);
    assert!(!snapshot.aspiration.is_active());
    assert!(snapshot.aspiration.was_lost());
    assert!(!snapshot.cell.is_active());

    manager.clear_frame_flags();
    assert!(!manager.snapshot().aspiration.was_lost());
}

#[test]
fn test_body_leaving_frame_ends_aspiration() {
    let script = Script::default();
    let mut manager = aspirating(&script);
    manager.update(frame_with_body(60..110).view(), SENSITIVITY);
    assert_eq!(manager.phase(), AspirationPhase::FullyAspirated);

    script.move_to(Some(BoundingRange::new(-20.0, 100.0, 40.0, 40.0)));
    let snapshot = manager.update(frame_with_body(0..20).view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::NotAspirating);
    assert!(!snapshot.aspiration.is_active());
    assert!(!snapshot.aspiration.was_lost());
}

#[test]
fn test_losing_pipette_abandons_aspiration() {
    let script = Script::default();
    let mut manager = aspirating(&script);

    manager.kill_pipette_track();
    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert_eq!(snapshot.phase, AspirationPhase::NotAspirating);
    assert!(!snapshot.pipette.is_active());

    // the pipette is detected again once free
    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert_eq!(snapshot.pipette.range(), Some(PIPETTE));
}

#[test]
fn test_selecting_a_cell_abandons_aspiration() {
    let script = Script::default();
    let mut manager = aspirating(&script);

    let range = manager
        .initialize_cell_track(BoundingRange::new(200.0, 60.0, 20.0, 20.0))
        .unwrap();
    assert_eq!(range, BoundingRange::new(200.0, 60.0, 20.0, 20.0));
    assert_eq!(manager.phase(), AspirationPhase::NotAspirating);
    assert!(manager.snapshot().cell.is_active());
}

#[test]
fn test_degenerate_selection_is_rejected() {
    let script = Script::default();
    let mut manager = manager(&script);
    manager.update(pipette_frame().view(), SENSITIVITY);

    let err = manager
        .initialize_cell_track(BoundingRange::new(10.0, 10.0, 0.0, 15.0))
        .unwrap_err();
    assert_eq!(
        err,
        TrackError::DegenerateRegion {
            width: 0.0,
            height: 15.0
        }
    );
    assert!(!manager.snapshot().cell.is_active());
}

#[test]
fn test_kill_cell_then_update() {
    let script = Script::default();
    let mut manager = with_cell(&script, BoundingRange::new(200.0, 110.0, 20.0, 20.0));
    manager.kill_cell_track();

    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert!(!snapshot.cell.is_active());
    assert!(!snapshot.cell.was_lost());
    assert_eq!(snapshot.cell_to_pipette_px(), None);
}

#[test]
fn test_moving_flag_follows_stationary_count() {
    let script = Script::default();
    let mut manager = with_cell(&script, BoundingRange::new(200.0, 110.0, 20.0, 20.0));
    let threshold = manager.config().stationary_threshold;

    for _ in 0..threshold + 5 {
        let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
        for state in [&snapshot.pipette, &snapshot.cell] {
            assert_eq!(state.is_moving(), state.stationary_frames < threshold);
        }
        manager.clear_frame_flags();
    }
    let snapshot = manager.snapshot();
    assert!(!snapshot.cell.is_moving());
    assert!(!snapshot.pipette.is_moving());
}

#[test]
fn test_cell_loss_is_flagged_once() {
    let script = Script::default();
    let mut manager = with_cell(&script, BoundingRange::new(200.0, 110.0, 20.0, 20.0));

    script.move_to(None);
    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert!(snapshot.cell.was_lost());
    manager.clear_frame_flags();

    let snapshot = manager.update(pipette_frame().view(), SENSITIVITY);
    assert!(!snapshot.cell.was_lost());
}
