//! Straight line segment detection.
//!
//! The tracking core only needs the [`SegmentDetector`] trait. [`HoughSegmentDetector`]
//! is the bundled implementation: a Canny style edge map followed by a Hough
//! transform whose peak lines are walked to cut out finite segments.

use std::f32::consts::PI;

use ndarray::{Array2, ArrayView2};
use tracing::trace;

use crate::config::SegmentConfig;

/// A finite line segment in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Slope `dy/dx`, `None` for vertical segments.
    pub fn gradient(&self) -> Option<f32> {
        let dx = self.x2 - self.x1;
        if dx == 0 {
            return None;
        }
        Some((self.y2 - self.y1) as f32 / dx as f32)
    }

    pub fn mid_y(&self) -> f32 {
        (self.y1 + self.y2) as f32 / 2.0
    }

    pub fn length(&self) -> f32 {
        ((self.x2 - self.x1) as f32).hypot((self.y2 - self.y1) as f32)
    }
}

/// Source of straight line segments for a grayscale frame.
///
/// Implement this to plug an external vision library into the pipette detector.
pub trait SegmentDetector {
    fn detect(&mut self, frame: ArrayView2<'_, u8>) -> Vec<LineSegment>;
}

impl<F> SegmentDetector for F
where
    F: FnMut(ArrayView2<'_, u8>) -> Vec<LineSegment>,
{
    fn detect(&mut self, frame: ArrayView2<'_, u8>) -> Vec<LineSegment> {
        self(frame)
    }
}

/// Edge map + Hough transform segment detector.
#[derive(Debug, Clone)]
pub struct HoughSegmentDetector {
    config: SegmentConfig,
    /// (cos, sin) of every accumulator angle
    trig: Vec<(f32, f32)>,
}

impl Default for HoughSegmentDetector {
    fn default() -> Self {
        Self::new(SegmentConfig::default())
    }
}

impl HoughSegmentDetector {
    pub fn new(config: SegmentConfig) -> Self {
        let step = if config.theta_step_deg > 0.0 { config.theta_step_deg } else { 1.0 };
        // at most a tenth of a degree per bin
        let bins = (180.0 / step).round().clamp(1.0, 1800.0) as usize;
        let trig = (0..bins)
            .map(|i| {
                let theta = i as f32 * PI / bins as f32;
                (theta.cos(), theta.sin())
            })
            .collect();
        Self { config, trig }
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    fn segments(&self, edges: &Array2<bool>) -> Vec<LineSegment> {
        let (height, width) = edges.dim();
        let diag = ((width * width + height * height) as f32).sqrt().ceil() as i32;
        let rho_bins = (2 * diag + 1) as usize;

        let points: Vec<(usize, usize)> = edges
            .indexed_iter()
            .filter_map(|((y, x), &e)| e.then_some((x, y)))
            .collect();
        if points.is_empty() {
            return Vec::new();
        }

        let mut acc = Array2::<u32>::zeros((self.trig.len(), rho_bins));
        for &(x, y) in &points {
            for (t, &(c, s)) in self.trig.iter().enumerate() {
                let rho = (x as f32 * c + y as f32 * s).round() as i32 + diag;
                acc[[t, rho as usize]] += 1;
            }
        }

        let mut peaks = local_maxima(&acc, self.config.vote_threshold);
        peaks.sort_by(|a, b| b.2.cmp(&a.2));

        let mut consumed = Array2::<bool>::from_elem(edges.dim(), false);
        let mut segments = Vec::new();
        for (t, r, votes) in peaks {
            let (c, s) = self.trig[t];
            let rho = r as f32 - diag as f32;
            let found = self.walk_line(edges, &mut consumed, c, s, rho);
            trace!(theta_bin = t, rho, votes, segments = found.len(), "hough peak");
            segments.extend(found);
        }
        segments
    }

    /// Cut the infinite line `x cos + y sin = rho` into runs of unclaimed edge pixels.
    fn walk_line(
        &self,
        edges: &Array2<bool>,
        consumed: &mut Array2<bool>,
        c: f32,
        s: f32,
        rho: f32,
    ) -> Vec<LineSegment> {
        let (height, width) = edges.dim();
        let along_x = s.abs() >= c.abs();
        let steps = if along_x { width } else { height };

        let mut segments = Vec::new();
        let mut run: Vec<(i64, i64)> = Vec::new();
        let mut gap = 0u32;

        for i in 0..steps {
            let (x, y) = if along_x {
                (i as f32, (rho - i as f32 * c) / s)
            } else {
                ((rho - i as f32 * s) / c, i as f32)
            };
            let (xi, yi) = (x.round() as i64, y.round() as i64);
            // tolerate one pixel of jitter across the line
            let candidates = if along_x {
                [(xi, yi), (xi, yi - 1), (xi, yi + 1)]
            } else {
                [(xi, yi), (xi - 1, yi), (xi + 1, yi)]
            };

            let hit = candidates
                .into_iter()
                .find(|&(cx, cy)| is_free(edges, consumed, cx, cy));
            match hit {
                Some(hit) => {
                    run.push(hit);
                    gap = 0;
                }
                None if !run.is_empty() => {
                    gap += 1;
                    if gap > self.config.max_line_gap {
                        self.close_run(&mut run, consumed, &mut segments);
                        gap = 0;
                    }
                }
                None => {}
            }
        }
        self.close_run(&mut run, consumed, &mut segments);
        segments
    }

    fn close_run(
        &self,
        run: &mut Vec<(i64, i64)>,
        consumed: &mut Array2<bool>,
        segments: &mut Vec<LineSegment>,
    ) {
        if let (Some(&(x1, y1)), Some(&(x2, y2))) = (run.first(), run.last()) {
            let segment = LineSegment::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32);
            if segment.length() >= self.config.min_line_length {
                for &(x, y) in run.iter() {
                    consumed[[y as usize, x as usize]] = true;
                }
                segments.push(segment);
            }
        }
        run.clear();
    }
}

impl SegmentDetector for HoughSegmentDetector {
    fn detect(&mut self, frame: ArrayView2<'_, u8>) -> Vec<LineSegment> {
        let edges = edge_map(frame, self.config.canny_low, self.config.canny_high);
        self.segments(&edges)
    }
}

fn is_free(edges: &Array2<bool>, consumed: &Array2<bool>, x: i64, y: i64) -> bool {
    let (height, width) = edges.dim();
    x >= 0
        && y >= 0
        && (x as usize) < width
        && (y as usize) < height
        && edges[[y as usize, x as usize]]
        && !consumed[[y as usize, x as usize]]
}

/// Accumulator cells at or above `threshold` that dominate their 3x3 neighbourhood.
///
/// Plateaus resolve to the first cell in scan order.
fn local_maxima(acc: &Array2<u32>, threshold: u32) -> Vec<(usize, usize, u32)> {
    let (rows, cols) = acc.dim();
    let mut peaks = Vec::new();
    for t in 0..rows {
        for r in 0..cols {
            let votes = acc[[t, r]];
            if votes < threshold.max(1) {
                continue;
            }
            let mut is_peak = true;
            'neighbours: for dt in -1i64..=1 {
                for dr in -1i64..=1 {
                    if dt == 0 && dr == 0 {
                        continue;
                    }
                    let (nt, nr) = (t as i64 + dt, r as i64 + dr);
                    if nt < 0 || nr < 0 || nt >= rows as i64 || nr >= cols as i64 {
                        continue;
                    }
                    let other = acc[[nt as usize, nr as usize]];
                    let earlier = dt < 0 || (dt == 0 && dr < 0);
                    if other > votes || (earlier && other == votes) {
                        is_peak = false;
                        break 'neighbours;
                    }
                }
            }
            if is_peak {
                peaks.push((t, r, votes));
            }
        }
    }
    peaks
}

/// Thin edge map: Sobel gradient (L1 magnitude), non-maximum suppression and
/// hysteresis between `low` and `high`.
pub fn edge_map(frame: ArrayView2<'_, u8>, low: f32, high: f32) -> Array2<bool> {
    let (height, width) = frame.dim();
    let mut edges = Array2::from_elem((height, width), false);
    if height < 3 || width < 3 {
        return edges;
    }

    let mut gx = Array2::<f32>::zeros((height, width));
    let mut gy = Array2::<f32>::zeros((height, width));
    let mut magnitude = Array2::<f32>::zeros((height, width));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let p = |dy: usize, dx: usize| f32::from(frame[[y + dy - 1, x + dx - 1]]);
            let sx = (p(0, 2) + 2.0 * p(1, 2) + p(2, 2)) - (p(0, 0) + 2.0 * p(1, 0) + p(2, 0));
            let sy = (p(2, 0) + 2.0 * p(2, 1) + p(2, 2)) - (p(0, 0) + 2.0 * p(0, 1) + p(0, 2));
            gx[[y, x]] = sx;
            gy[[y, x]] = sy;
            magnitude[[y, x]] = sx.abs() + sy.abs();
        }
    }

    // tan(22.5°) and tan(67.5°)
    const TAN_LOW: f32 = 0.414_213_57;
    const TAN_HIGH: f32 = 2.414_213_6;

    let mut thin = Array2::<f32>::zeros((height, width));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let m = magnitude[[y, x]];
            if m <= low {
                continue;
            }
            let (sx, sy) = (gx[[y, x]], gy[[y, x]]);
            let (ax, ay) = (sx.abs(), sy.abs());
            let (before, after) = if ay <= ax * TAN_LOW {
                ((y, x - 1), (y, x + 1))
            } else if ay >= ax * TAN_HIGH {
                ((y - 1, x), (y + 1, x))
            } else if sx * sy > 0.0 {
                ((y - 1, x - 1), (y + 1, x + 1))
            } else {
                ((y - 1, x + 1), (y + 1, x - 1))
            };
            if m >= magnitude[before] && m > magnitude[after] {
                thin[[y, x]] = m;
            }
        }
    }

    let mut stack: Vec<(usize, usize)> = thin
        .indexed_iter()
        .filter_map(|(idx, &m)| (m > high).then_some(idx))
        .collect();
    for &idx in &stack {
        edges[idx] = true;
    }
    while let Some((y, x)) = stack.pop() {
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                if !edges[[ny, nx]] && thin[[ny, nx]] > low {
                    edges[[ny, nx]] = true;
                    stack.push((ny, nx));
                }
            }
        }
    }
    edges
}
