//! Track rectangles drawn over a frame for display.

use ndarray::{Array3, ArrayView2};

use crate::tracker::{BoundingRange, TrackState};

pub const PIPETTE_COLOR: (u8, u8, u8) = (255, 128, 128);
pub const CELL_COLOR: (u8, u8, u8) = (128, 128, 255);
pub const ASPIRATION_COLOR: (u8, u8, u8) = (128, 255, 128);

/// Outline thickness in pixels.
const THICKNESS: i64 = 3;

/// RGB copy of a grayscale frame (`H x W x 3`).
pub fn to_rgb(frame: ArrayView2<'_, u8>) -> Array3<u8> {
    let (height, width) = frame.dim();
    Array3::from_shape_fn((height, width, 3), |(y, x, _)| frame[[y, x]])
}

/// Draw the outline of `range` into an RGB image, clipped to the image.
///
/// Zero-width or zero-height ranges come out as a line `THICKNESS` pixels wide.
pub fn draw_box(image: &mut Array3<u8>, range: &BoundingRange, color: (u8, u8, u8)) {
    let (height, width, _) = image.dim();
    let half = THICKNESS / 2;
    let x0 = range.x.floor() as i64;
    let y0 = range.y.floor() as i64;
    let x1 = (range.x + range.width.max(0.0)).floor() as i64;
    let y1 = (range.y + range.height.max(0.0)).floor() as i64;

    let (r, g, b) = color;
    for py in (y0 - half).max(0)..=(y1 + half).min(height as i64 - 1) {
        for px in (x0 - half).max(0)..=(x1 + half).min(width as i64 - 1) {
            let on_border =
                px <= x0 + half || px >= x1 - half || py <= y0 + half || py >= y1 - half;
            if on_border {
                let (px, py) = (px as usize, py as usize);
                image[[py, px, 0]] = r;
                image[[py, px, 1]] = g;
                image[[py, px, 2]] = b;
            }
        }
    }
}

/// Annotated copy of `frame` with every active track outlined in its color.
pub fn annotate(
    frame: ArrayView2<'_, u8>,
    pipette: &TrackState,
    cell: &TrackState,
    aspiration: &TrackState,
) -> Array3<u8> {
    let mut image = to_rgb(frame);
    for (state, color) in [
        (pipette, PIPETTE_COLOR),
        (cell, CELL_COLOR),
        (aspiration, ASPIRATION_COLOR),
    ] {
        if let Some(range) = state.range() {
            draw_box(&mut image, &range, color);
        }
    }
    image
}
