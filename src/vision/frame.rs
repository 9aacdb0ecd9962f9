//! Frame conversion helpers.

use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// Convert an `H x W x 3` BGR frame to 8-bit luma (ITU-R BT.601 weights).
///
/// Frames with a single channel are copied through; extra channels beyond the
/// third (e.g. alpha) are ignored. A frame without channels comes out black.
pub fn to_grayscale(frame: ArrayView3<'_, u8>) -> Array2<u8> {
    let (height, width, channels) = frame.dim();
    if channels == 0 {
        return Array2::zeros((height, width));
    }
    if channels < 3 {
        return frame.index_axis(Axis(2), 0).to_owned();
    }
    Array2::from_shape_fn((height, width), |(y, x)| {
        let b = f32::from(frame[[y, x, 0]]);
        let g = f32::from(frame[[y, x, 1]]);
        let r = f32::from(frame[[y, x, 2]]);
        (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
    })
}

/// Pixel at integer coordinates, `None` when outside the frame.
#[inline]
pub fn pixel(frame: &ArrayView2<'_, u8>, x: i64, y: i64) -> Option<u8> {
    let (height, width) = frame.dim();
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return None;
    }
    Some(frame[[y as usize, x as usize]])
}
