/// Image preprocessing: grayscale conversion, Gaussian blur, local contrast
/// enhancement, unsharp masking and adaptive thresholding.
///
/// Every step is a total function of its input producing a fresh field; the
/// intermediate float buffers live in a per-call bump arena and are released
/// together when the call returns.
use bumpalo::Bump;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::raster::RasterImage;

/// A single-channel intensity image, same dimensions as the input raster.
#[derive(Debug, Clone)]
pub struct IntensityField {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl IntensityField {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Clamp-to-border sample, usable at fractional coordinates via nearest
    /// pixel.
    pub fn sample_clamped(&self, x: f64, y: f64) -> u8 {
        let xi = (x.round() as i64).clamp(0, self.width as i64 - 1) as usize;
        let yi = (y.round() as i64).clamp(0, self.height as i64 - 1) as usize;
        self.at(xi, yi)
    }

    /// Bilinear sample with clamp-to-border, for sub-pixel line scans.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> f64 {
        let max_x = self.width as f64 - 1.0;
        let max_y = self.height as f64 - 1.0;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let top = self.at(x0, y0) as f64 * (1.0 - fx) + self.at(x1, y0) as f64 * fx;
        let bottom = self.at(x0, y1) as f64 * (1.0 - fx) + self.at(x1, y1) as f64 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

/// Result of the preprocessing chain. The continuous `enhanced` field feeds
/// the radial-scan detector; the `binary` field feeds edge detection.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub enhanced: IntensityField,
    pub binary: IntensityField,
    pub threshold: u8,
}

/// Run the full preprocessing chain.
pub fn preprocess(image: &RasterImage, config: &AnalysisConfig) -> PreprocessedImage {
    let gray = grayscale(image, &config.grayscale_weights);
    let blurred = gaussian_blur(&gray, config.gaussian_sigma);
    let contrasted = local_contrast(&blurred, config.contrast_window, config.contrast_gain);
    let rebl = gaussian_blur(&contrasted, config.gaussian_sigma);
    let enhanced = unsharp_mask(&contrasted, &rebl, config.unsharp_amount);
    let (binary, threshold) = adaptive_threshold(
        &enhanced,
        config.threshold_percentile,
        config.threshold_mean_weight,
    );

    debug!(
        "preprocess: {}x{}, adaptive threshold {}",
        image.width(),
        image.height(),
        threshold
    );

    PreprocessedImage {
        enhanced,
        binary,
        threshold,
    }
}

/// Grayscale conversion with asymmetric channel weights. The weights are a
/// tuning knob for which channel the diffraction spikes are brightest in.
pub fn grayscale(image: &RasterImage, weights: &[f64; 3]) -> IntensityField {
    let (width, height) = (image.width(), image.height());
    let mut data = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = image.rgb_at(x, y);
            let v = r as f64 * weights[0] + g as f64 * weights[1] + b as f64 * weights[2];
            data[y * width + x] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    IntensityField::new(width, height, data)
}

/// Kernel size derived from sigma, always odd and at least 3.
fn kernel_size_for_sigma(sigma: f64) -> usize {
    ((sigma * 3.0).ceil() as usize * 2 + 1).max(3)
}

/// Normalized 1-D Gaussian kernel.
pub(crate) fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let size = kernel_size_for_sigma(sigma);
    let center = (size / 2) as f64;
    let mut kernel = vec![0.0; size];
    let mut sum = 0.0;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f64 - center;
        *k = (-x * x / (2.0 * sigma * sigma)).exp();
        sum += *k;
    }
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian blur: one horizontal and one vertical 1-D convolution
/// instead of a full 2-D kernel. Border pixels sample clamp-to-border, so a
/// constant image passes through unchanged.
pub fn gaussian_blur(field: &IntensityField, sigma: f64) -> IntensityField {
    let kernel = gaussian_kernel(sigma);
    let (width, height) = (field.width, field.height);
    let half = (kernel.len() / 2) as i64;

    let arena = Bump::new();
    let mut temp = bumpalo::vec![in &arena; 0.0f64; width * height];

    // Horizontal pass
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            for (i, &k) in kernel.iter().enumerate() {
                let sx = (x as i64 + i as i64 - half).clamp(0, width as i64 - 1) as usize;
                sum += field.at(sx, y) as f64 * k;
            }
            temp[y * width + x] = sum;
        }
    }

    // Vertical pass
    let mut data = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            for (i, &k) in kernel.iter().enumerate() {
                let sy = (y as i64 + i as i64 - half).clamp(0, height as i64 - 1) as usize;
                sum += temp[sy * width + x] * k;
            }
            data[y * width + x] = sum.round().clamp(0.0, 255.0) as u8;
        }
    }

    IntensityField::new(width, height, data)
}

/// Local contrast enhancement: push each pixel away from its window mean by a
/// fixed gain, using summed-area tables for the window statistics.
pub fn local_contrast(field: &IntensityField, window: usize, gain: f64) -> IntensityField {
    let (width, height) = (field.width, field.height);
    let half = (window / 2) as i64;

    // Summed-area tables over value and value squared, one extra row/column
    // of zeros at the top-left.
    let arena = Bump::new();
    let stride = width + 1;
    let mut sat = bumpalo::vec![in &arena; 0.0f64; stride * (height + 1)];
    let mut sat_sq = bumpalo::vec![in &arena; 0.0f64; stride * (height + 1)];
    for y in 0..height {
        let mut row = 0.0;
        let mut row_sq = 0.0;
        for x in 0..width {
            let v = field.at(x, y) as f64;
            row += v;
            row_sq += v * v;
            let i = (y + 1) * stride + x + 1;
            sat[i] = sat[i - stride] + row;
            sat_sq[i] = sat_sq[i - stride] + row_sq;
        }
    }

    let window_sum = |table: &[f64], x0: usize, y0: usize, x1: usize, y1: usize| -> f64 {
        // Inclusive pixel range [x0, x1] x [y0, y1].
        table[(y1 + 1) * stride + x1 + 1] + table[y0 * stride + x0]
            - table[y0 * stride + x1 + 1]
            - table[(y1 + 1) * stride + x0]
    };

    let mut data = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let x0 = (x as i64 - half).max(0) as usize;
            let y0 = (y as i64 - half).max(0) as usize;
            let x1 = ((x as i64 + half) as usize).min(width - 1);
            let y1 = ((y as i64 + half) as usize).min(height - 1);
            let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;

            let mean = window_sum(&sat, x0, y0, x1, y1) / count;
            let variance = (window_sum(&sat_sq, x0, y0, x1, y1) / count - mean * mean).max(0.0);

            let v = field.at(x, y) as f64;
            // Zero-variance window: nothing to enhance, pass through.
            let out = if variance > 1e-9 {
                mean + gain * (v - mean)
            } else {
                v
            };
            data[y * width + x] = out.round().clamp(0.0, 255.0) as u8;
        }
    }

    IntensityField::new(width, height, data)
}

/// Unsharp mask: `clamp(original + amount * (original - blurred))`.
pub fn unsharp_mask(original: &IntensityField, blurred: &IntensityField, amount: f64) -> IntensityField {
    debug_assert_eq!(original.data.len(), blurred.data.len());
    let data = original
        .data
        .iter()
        .zip(blurred.data.iter())
        .map(|(&o, &b)| {
            let v = o as f64 + amount * (o as f64 - b as f64);
            v.round().clamp(0.0, 255.0) as u8
        })
        .collect();
    IntensityField::new(original.width, original.height, data)
}

/// Histogram-derived adaptive threshold: a blend of the global mean intensity
/// and the intensity at a high percentile, then binarize.
pub fn adaptive_threshold(
    field: &IntensityField,
    percentile: f64,
    mean_weight: f64,
) -> (IntensityField, u8) {
    let mut histogram = [0usize; 256];
    let mut sum = 0u64;
    for &v in &field.data {
        histogram[v as usize] += 1;
        sum += v as u64;
    }
    let total = field.data.len();
    let mean = sum as f64 / total as f64;

    // Intensity at the requested percentile of the histogram.
    let target = (percentile * total as f64) as usize;
    let mut cumulative = 0usize;
    let mut percentile_value = 255u8;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            percentile_value = value as u8;
            break;
        }
    }

    let threshold = (mean_weight * mean + (1.0 - mean_weight) * percentile_value as f64)
        .round()
        .clamp(0.0, 255.0) as u8;

    let data = field
        .data
        .iter()
        .map(|&v| if v > threshold { 255 } else { 0 })
        .collect();
    (IntensityField::new(field.width, field.height, data), threshold)
}
