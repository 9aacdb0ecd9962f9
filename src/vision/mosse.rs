//! MOSSE correlation filter (Bolme et al., CVPR 2010).
//!
//! Patches are log-scaled, normalized to zero mean and unit variance, and
//! windowed with a Hanning window before entering the frequency domain. The
//! filter is trained against a Gaussian peak centred in the patch and updated
//! as a running average; an update whose peak-to-sidelobe ratio falls below the
//! configured threshold reports the target as lost.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use tracing::trace;

use crate::config::MosseConfig;
use crate::tracker::BoundingRange;
use crate::vision::filter::{CorrelationFilter, FilterFactory};

/// Training offsets (pixels) sampled around the initial region.
const TRAINING_SHIFTS: [(i64, i64); 5] = [(0, 0), (2, 0), (-2, 0), (0, 2), (0, -2)];

/// Half size of the square excluded around the peak when measuring the sidelobe.
const SIDELOBE_EXCLUSION: i64 = 5;

/// Row/column FFT plans for one patch size.
struct Fft2 {
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl Fft2 {
    fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            col_forward: planner.plan_fft_forward(height),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    fn forward(&self, data: &mut Array2<Complex32>) {
        transform(data, &self.row_forward, &self.col_forward);
    }

    fn inverse(&self, data: &mut Array2<Complex32>) {
        transform(data, &self.row_inverse, &self.col_inverse);
        let scale = 1.0 / data.len() as f32;
        data.mapv_inplace(|v| v * scale);
    }
}

fn transform(data: &mut Array2<Complex32>, rows: &Arc<dyn Fft<f32>>, cols: &Arc<dyn Fft<f32>>) {
    let mut buffer = vec![Complex32::default(); data.ncols()];
    for mut row in data.rows_mut() {
        buffer.iter_mut().zip(row.iter()).for_each(|(b, &v)| *b = v);
        rows.process(&mut buffer);
        row.iter_mut().zip(&buffer).for_each(|(v, &b)| *v = b);
    }

    let mut buffer = vec![Complex32::default(); data.nrows()];
    for mut col in data.columns_mut() {
        buffer.iter_mut().zip(col.iter()).for_each(|(b, &v)| *b = v);
        cols.process(&mut buffer);
        col.iter_mut().zip(&buffer).for_each(|(v, &b)| *v = b);
    }
}

/// Learned state for one tracked region.
struct Model {
    /// Top-left corner of the tracked window
    origin: (i64, i64),
    width: usize,
    height: usize,
    window: Array2<f32>,
    /// Spectrum of the centred Gaussian target
    target: Array2<Complex32>,
    numerator: Array2<Complex32>,
    denominator: Array2<Complex32>,
    fft: Fft2,
}

/// Minimum Output Sum of Squared Error tracker.
pub struct MosseFilter {
    config: MosseConfig,
    model: Option<Model>,
}

impl std::fmt::Debug for MosseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MosseFilter")
            .field("config", &self.config)
            .field("region", &self.region())
            .finish()
    }
}

impl MosseFilter {
    pub fn new(config: MosseConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Region currently tracked, if trained.
    pub fn region(&self) -> Option<BoundingRange> {
        self.model.as_ref().map(Model::range)
    }
}

impl Model {
    fn range(&self) -> BoundingRange {
        BoundingRange::new(
            self.origin.0 as f32,
            self.origin.1 as f32,
            self.width as f32,
            self.height as f32,
        )
    }

    fn center(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }

    /// Log-scaled, normalized, windowed patch at `origin` (edges replicate).
    ///
    /// Also returns the standard deviation of the log patch before normalization.
    fn patch(&self, frame: &ArrayView2<'_, u8>, origin: (i64, i64), epsilon: f32) -> (Array2<f32>, f32) {
        let (frame_h, frame_w) = frame.dim();
        let mut patch = Array2::from_shape_fn((self.height, self.width), |(y, x)| {
            let px = (origin.0 + x as i64).clamp(0, frame_w as i64 - 1) as usize;
            let py = (origin.1 + y as i64).clamp(0, frame_h as i64 - 1) as usize;
            (f32::from(frame[[py, px]]) + 1.0).ln()
        });
        let mean = patch.mean().unwrap_or(0.0);
        let std = patch.std(0.0);
        patch.mapv_inplace(|v| (v - mean) / (std + epsilon));
        patch *= &self.window;
        (patch, std)
    }

    fn spectrum(&self, patch: &Array2<f32>) -> Array2<Complex32> {
        let mut data = patch.mapv(|v| Complex32::new(v, 0.0));
        self.fft.forward(&mut data);
        data
    }

    fn gaussian_spectrum(&self, cx: f32, cy: f32, sigma: f32) -> Array2<Complex32> {
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut data = Array2::from_shape_fn((self.height, self.width), |(y, x)| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            Complex32::new((-(dx * dx + dy * dy) / two_sigma_sq).exp(), 0.0)
        });
        self.fft.forward(&mut data);
        data
    }
}

fn hanning(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (n - 1) as f32).cos())
        .collect()
}

/// Peak location and peak-to-sidelobe ratio of a real response map.
fn peak_and_psr(response: &Array2<f32>) -> ((usize, usize), f32) {
    let mut peak = (0, 0);
    let mut peak_value = f32::MIN;
    for ((y, x), &v) in response.indexed_iter() {
        if v > peak_value {
            peak_value = v;
            peak = (x, y);
        }
    }

    let (mut sum, mut sum_sq, mut count) = (0.0f64, 0.0f64, 0usize);
    for ((y, x), &v) in response.indexed_iter() {
        let near = (x as i64 - peak.0 as i64).abs() <= SIDELOBE_EXCLUSION
            && (y as i64 - peak.1 as i64).abs() <= SIDELOBE_EXCLUSION;
        if !near {
            sum += f64::from(v);
            sum_sq += f64::from(v) * f64::from(v);
            count += 1;
        }
    }
    if count == 0 {
        return (peak, 0.0);
    }
    let mean = sum / count as f64;
    let std = (sum_sq / count as f64 - mean * mean).max(0.0).sqrt();
    let psr = (f64::from(peak_value) - mean) / std.max(1e-6);
    (peak, psr as f32)
}

impl CorrelationFilter for MosseFilter {
    fn init(&mut self, frame: ArrayView2<'_, u8>, region: BoundingRange) -> bool {
        self.model = None;
        if frame.is_empty() {
            return false;
        }
        let width = region.width.round().max(0.0) as usize;
        let height = region.height.round().max(0.0) as usize;
        if width < self.config.min_patch_size || height < self.config.min_patch_size {
            trace!(width, height, "region too small for a correlation filter");
            return false;
        }

        let window_x = hanning(width);
        let window_y = hanning(height);
        let fft = Fft2::new(width, height);
        let mut model = Model {
            origin: (region.x.round() as i64, region.y.round() as i64),
            width,
            height,
            window: Array2::from_shape_fn((height, width), |(y, x)| window_y[y] * window_x[x]),
            target: Array2::zeros((height, width)),
            numerator: Array2::zeros((height, width)),
            denominator: Array2::zeros((height, width)),
            fft,
        };

        let (cx, cy) = model.center();
        model.target = model.gaussian_spectrum(cx as f32, cy as f32, self.config.sigma);

        let eps = self.config.epsilon;
        for (dx, dy) in TRAINING_SHIFTS {
            let origin = (model.origin.0 + dx, model.origin.1 + dy);
            let (patch, std) = model.patch(&frame, origin, eps);
            if dx == 0 && dy == 0 && std < 1e-3 {
                trace!("flat region, nothing to correlate against");
                return false;
            }
            let spectrum = model.spectrum(&patch);
            // the object sits at -d inside a patch taken at +d
            let target = model.gaussian_spectrum(cx as f32 - dx as f32, cy as f32 - dy as f32, self.config.sigma);
            Zip::from(&mut model.numerator)
                .and(&mut model.denominator)
                .and(&target)
                .and(&spectrum)
                .for_each(|num, den, &g, &f| {
                    *num += g * f.conj();
                    *den += f * f.conj();
                });
        }

        self.model = Some(model);
        true
    }

    fn update(&mut self, frame: ArrayView2<'_, u8>) -> Option<BoundingRange> {
        let config = &self.config;
        let model = self.model.as_mut()?;
        if frame.is_empty() {
            return None;
        }

        let (patch, _) = model.patch(&frame, model.origin, config.epsilon);
        let spectrum = model.spectrum(&patch);
        let mut response = Array2::<Complex32>::zeros(spectrum.dim());
        Zip::from(&mut response)
            .and(&spectrum)
            .and(&model.numerator)
            .and(&model.denominator)
            .for_each(|r, &f, &num, &den| {
                *r = f * num / (den + config.epsilon);
            });
        model.fft.inverse(&mut response);
        let response = response.mapv(|c| c.re);

        let ((px, py), psr) = peak_and_psr(&response);
        if !(psr >= config.psr_threshold) {
            trace!(psr, "correlation peak too weak");
            return None;
        }

        let (cx, cy) = model.center();
        model.origin.0 += px as i64 - cx as i64;
        model.origin.1 += py as i64 - cy as i64;

        let (patch, _) = model.patch(&frame, model.origin, config.epsilon);
        let spectrum = model.spectrum(&patch);
        let rate = config.learning_rate;
        Zip::from(&mut model.numerator)
            .and(&mut model.denominator)
            .and(&model.target)
            .and(&spectrum)
            .for_each(|num, den, &g, &f| {
                *num = g * f.conj() * rate + *num * (1.0 - rate);
                *den = f * f.conj() * rate + *den * (1.0 - rate);
            });

        Some(model.range())
    }
}

/// Creates untrained [`MosseFilter`]s sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct MosseFactory {
    config: MosseConfig,
}

impl MosseFactory {
    pub fn new(config: MosseConfig) -> Self {
        Self { config }
    }
}

impl FilterFactory for MosseFactory {
    type Filter = MosseFilter;

    fn create(&self) -> MosseFilter {
        MosseFilter::new(self.config.clone())
    }
}
