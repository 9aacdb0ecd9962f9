#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use ndarray::{Array2, ArrayView2};
use pipette_track::{BoundingRange, CorrelationFilter, LineSegment, SegmentDetector};

/// Always reports the two pipette walls at rows 100 and 140.
#[derive(Debug, Clone)]
pub struct MockDetector;

impl SegmentDetector for MockDetector {
    fn detect(&mut self, _frame: ArrayView2<'_, u8>) -> Vec<LineSegment> {
        vec![
            LineSegment::new(0, 100, 150, 100),
            LineSegment::new(0, 140, 150, 140),
        ]
    }
}

/// Where every scripted filter says its target is. Shared by all filters of one factory.
#[derive(Debug, Clone, Default)]
pub struct Script(Arc<Mutex<Option<BoundingRange>>>);

impl Script {
    pub fn move_to(&self, range: Option<BoundingRange>) {
        *self.0.lock().unwrap() = range;
    }

    pub fn factory(&self) -> impl Fn() -> ScriptedFilter + Send + 'static {
        let script = self.clone();
        move || ScriptedFilter {
            script: script.clone(),
        }
    }
}

pub struct ScriptedFilter {
    script: Script,
}

impl CorrelationFilter for ScriptedFilter {
    fn init(&mut self, _frame: ArrayView2<'_, u8>, region: BoundingRange) -> bool {
        self.script.move_to(Some(region));
        true
    }

    fn update(&mut self, _frame: ArrayView2<'_, u8>) -> Option<BoundingRange> {
        *self.script.0.lock().unwrap()
    }
}

/// Dark lumen between rows 100 and 140 ending at column 153; the tip is found at 150.
pub fn pipette_frame() -> Array2<u8> {
    frame_with_body(0..0)
}

/// Pipette frame with a bright cell body filling `columns` of the lumen.
pub fn frame_with_body(columns: std::ops::Range<usize>) -> Array2<u8> {
    Array2::from_shape_fn((200, 240), |(y, x)| {
        if !(100..=140).contains(&y) || x >= 153 {
            200
        } else if columns.contains(&x) {
            150
        } else {
            50
        }
    })
}

pub const PIPETTE: BoundingRange = BoundingRange::new(150.0, 100.0, 0.0, 40.0);
pub const SENSITIVITY: f32 = 20.0;
