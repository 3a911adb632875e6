/// Spike line detection.
///
/// Two interchangeable strategies behind one trait: a radial intensity-profile
/// scan around the star center, and a Canny + Hough transform over the
/// thresholded field. Both reduce the image to angle/strength candidates on
/// the bidirectional 0-180 degree circle; triplet selection happens later.
use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::edge_detection::EdgeDetector;
use crate::geometry::normalize_angle_180;
use crate::preprocess::PreprocessedImage;
use crate::star_locator::StarCenter;

/// A candidate spike direction. Angles are bidirectional (0-180), strengths
/// normalized to [0, 1] within one detection pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpikeCandidate {
    pub angle_degrees: f64,
    pub strength: f64,
    pub prominence: f64,
}

/// Strategy seam between preprocessing and spike selection.
pub trait LineDetector {
    fn detect(&self, pre: &PreprocessedImage, center: &StarCenter) -> Vec<SpikeCandidate>;
}

/// Build the configured detector.
pub fn detector_from_config(config: &AnalysisConfig) -> Box<dyn LineDetector> {
    match config.detector {
        crate::config::DetectorKind::Radial => Box::new(RadialScanDetector::from_config(config)),
        crate::config::DetectorKind::Hough => Box::new(HoughDetector::from_config(config)),
    }
}

/// Radial intensity-profile scan.
///
/// Samples the enhanced field along rays from the star center, skipping an
/// inner exclusion radius so the bloated stellar core does not drown the
/// spikes, with sample weights increasing with distance for the same reason.
/// The resulting angular profile is folded onto 0-180 (a spike and its
/// opposite ray are one line), smoothed circularly, contrast-boosted, and
/// peak-searched with a minimum angular separation.
pub struct RadialScanDetector {
    samples: usize,
    inner_radius_fraction: f64,
    smoothing_window: usize,
    gamma: f64,
    min_peak_separation_degrees: f64,
}

impl RadialScanDetector {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            samples: config.radial_samples,
            inner_radius_fraction: config.inner_radius_fraction,
            smoothing_window: config.profile_smoothing_window,
            gamma: config.profile_gamma,
            min_peak_separation_degrees: config.min_peak_separation_degrees,
        }
    }

    /// Distance-weighted mean intensity along one ray.
    fn scan_ray(&self, pre: &PreprocessedImage, center: &StarCenter, angle_radians: f64) -> f64 {
        let field = &pre.enhanced;
        let max_radius = (field.width.min(field.height) as f64) / 2.0 - 1.0;
        let inner_radius = (self.inner_radius_fraction * field.width.min(field.height) as f64)
            .max(3.0);
        if max_radius <= inner_radius {
            return 0.0;
        }

        let (sin_a, cos_a) = angle_radians.sin_cos();
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut r = inner_radius;
        while r < max_radius {
            let x = center.x + cos_a * r;
            let y = center.y + sin_a * r;
            if x < 0.0 || y < 0.0 || x >= field.width as f64 || y >= field.height as f64 {
                break;
            }
            let weight = r / max_radius;
            weighted_sum += field.sample_clamped(x, y) as f64 * weight;
            weight_sum += weight;
            r += 1.0;
        }

        if weight_sum > 0.0 {
            weighted_sum / weight_sum
        } else {
            0.0
        }
    }
}

impl LineDetector for RadialScanDetector {
    fn detect(&self, pre: &PreprocessedImage, center: &StarCenter) -> Vec<SpikeCandidate> {
        // Full-circle profile, then fold opposite rays together.
        let n = self.samples & !1; // force even for the fold
        let mut profile = vec![0.0f64; n];
        for (i, value) in profile.iter_mut().enumerate() {
            let angle = i as f64 / n as f64 * std::f64::consts::TAU;
            *value = self.scan_ray(pre, center, angle);
        }

        let half = n / 2;
        let mut folded: Vec<f64> = (0..half)
            .map(|i| (profile[i] + profile[i + half]) / 2.0)
            .collect();

        folded = circular_moving_average(&folded, self.smoothing_window);

        let max = folded.iter().cloned().fold(0.0f64, f64::max);
        if max <= 0.0 {
            debug!("radial scan found no signal above zero");
            return Vec::new();
        }

        // Normalize and sharpen peaks with a sub-linear gamma.
        for v in &mut folded {
            *v = (*v / max).powf(self.gamma);
        }
        let mean = folded.iter().sum::<f64>() / folded.len() as f64;

        let degrees_per_sample = 180.0 / half as f64;
        let separation =
            ((self.min_peak_separation_degrees / degrees_per_sample).round() as usize).max(1);

        let peaks = find_circular_peaks(&folded, separation);
        let candidates: Vec<SpikeCandidate> = peaks
            .into_iter()
            .map(|i| SpikeCandidate {
                angle_degrees: i as f64 * degrees_per_sample,
                strength: folded[i],
                prominence: (folded[i] - mean).max(0.0),
            })
            .collect();

        debug!(
            "radial scan: {} candidates from {} angular samples",
            candidates.len(),
            n
        );
        candidates
    }
}

/// Circular moving average over a wraparound 1-D profile.
fn circular_moving_average(profile: &[f64], window: usize) -> Vec<f64> {
    let n = profile.len();
    if n == 0 || window <= 1 {
        return profile.to_vec();
    }
    let half = (window / 2) as i64;
    (0..n)
        .map(|i| {
            let mut sum = 0.0;
            for d in -half..=half {
                let j = (i as i64 + d).rem_euclid(n as i64) as usize;
                sum += profile[j];
            }
            sum / (2 * half + 1) as f64
        })
        .collect()
}

/// Local maxima over a circular neighborhood of `separation` samples. When
/// two candidate peaks fall within the separation, only the stronger
/// survives.
fn find_circular_peaks(profile: &[f64], separation: usize) -> Vec<usize> {
    let n = profile.len();
    let mut peaks: Vec<usize> = (0..n)
        .filter(|&i| {
            let v = profile[i];
            if v <= 0.0 {
                return false;
            }
            (1..=separation as i64).all(|d| {
                let before = profile[(i as i64 - d).rem_euclid(n as i64) as usize];
                let after = profile[(i as i64 + d).rem_euclid(n as i64) as usize];
                // Strict on one side so a flat-topped peak yields one index.
                v >= before && v > after
            })
        })
        .collect();

    // Enforce separation across the survivors, strongest first.
    peaks.sort_by(|&a, &b| profile[b].partial_cmp(&profile[a]).unwrap());
    let mut kept: Vec<usize> = Vec::new();
    for p in peaks {
        let min_gap = kept
            .iter()
            .map(|&k| {
                let d = (p as i64 - k as i64).unsigned_abs() as usize;
                d.min(n - d)
            })
            .min();
        if min_gap.map_or(true, |g| g > separation) {
            kept.push(p);
        }
    }
    kept
}

/// Hough transform over the Canny edge map.
///
/// Edge pixels within a bounded radius of the star center vote into a
/// (rho, theta) accumulator with theta in 1-degree steps and rho in 1-pixel
/// steps, measured relative to the star center so spike lines cluster near
/// rho = 0. Accumulator maxima above a vote threshold become candidates.
pub struct HoughDetector {
    canny_low: f64,
    canny_high: f64,
    max_radius_fraction: f64,
    min_votes: usize,
    top_k: usize,
}

impl HoughDetector {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            canny_low: config.canny_low_threshold,
            canny_high: config.canny_high_threshold,
            max_radius_fraction: config.hough_max_radius_fraction,
            min_votes: config.hough_min_votes,
            top_k: config.hough_top_k,
        }
    }
}

impl LineDetector for HoughDetector {
    fn detect(&self, pre: &PreprocessedImage, center: &StarCenter) -> Vec<SpikeCandidate> {
        let edges = EdgeDetector::new(self.canny_low, self.canny_high).detect(&pre.binary);
        let (width, height) = (edges.width, edges.height);

        let max_radius = (self.max_radius_fraction * width.min(height) as f64).max(8.0);
        let rho_bins = (2.0 * max_radius).ceil() as usize + 1;
        let theta_bins = 180usize;
        let mut accumulator = vec![0u32; rho_bins * theta_bins];

        // Precomputed sin/cos per theta bin.
        let trig: Vec<(f64, f64)> = (0..theta_bins)
            .map(|t| (t as f64).to_radians().sin_cos())
            .collect();

        let max_r2 = max_radius * max_radius;
        for y in 0..height {
            for x in 0..width {
                if !edges.at(x, y) {
                    continue;
                }
                let dx = x as f64 - center.x;
                let dy = y as f64 - center.y;
                if dx * dx + dy * dy > max_r2 {
                    continue;
                }
                for (t, &(sin_t, cos_t)) in trig.iter().enumerate() {
                    let rho = dx * cos_t + dy * sin_t;
                    let bin = (rho + max_radius).round();
                    if bin >= 0.0 && (bin as usize) < rho_bins {
                        accumulator[bin as usize * theta_bins + t] += 1;
                    }
                }
            }
        }

        let max_votes = accumulator.iter().cloned().max().unwrap_or(0);
        if max_votes == 0 {
            debug!("hough: empty accumulator, no edge pixels near center");
            return Vec::new();
        }
        let mean_votes =
            accumulator.iter().map(|&v| v as f64).sum::<f64>() / accumulator.len() as f64;

        // Non-maximum suppression over a small rho x theta window, then keep
        // the top-K by votes.
        let nms_rho = 2i64;
        let nms_theta = 2i64;
        let mut maxima: Vec<(usize, usize, u32)> = Vec::new();
        for r in 0..rho_bins {
            for t in 0..theta_bins {
                let votes = accumulator[r * theta_bins + t];
                if (votes as usize) < self.min_votes {
                    continue;
                }
                let mut is_max = true;
                'window: for dr in -nms_rho..=nms_rho {
                    for dt in -nms_theta..=nms_theta {
                        if dr == 0 && dt == 0 {
                            continue;
                        }
                        let nr = r as i64 + dr;
                        if nr < 0 || nr >= rho_bins as i64 {
                            continue;
                        }
                        // Theta wraps at 180 with rho mirrored about center.
                        let mut nt = t as i64 + dt;
                        let mut nr = nr as usize;
                        if nt < 0 || nt >= theta_bins as i64 {
                            nt = nt.rem_euclid(theta_bins as i64);
                            nr = rho_bins - 1 - nr;
                        }
                        if accumulator[nr * theta_bins + nt as usize] > votes {
                            is_max = false;
                            break 'window;
                        }
                    }
                }
                if is_max {
                    maxima.push((r, t, votes));
                }
            }
        }

        maxima.sort_by(|a, b| b.2.cmp(&a.2));
        maxima.truncate(self.top_k);

        let candidates: Vec<SpikeCandidate> = maxima
            .into_iter()
            .map(|(_r, t, votes)| SpikeCandidate {
                // The line direction is perpendicular to the (rho, theta)
                // normal.
                angle_degrees: normalize_angle_180(t as f64 + 90.0),
                strength: votes as f64 / max_votes as f64,
                prominence: ((votes as f64 - mean_votes) / max_votes as f64).max(0.0),
            })
            .collect();

        debug!(
            "hough: {} candidates, max votes {}, {} edge pixels",
            candidates.len(),
            max_votes,
            edges.edge_count()
        );
        candidates
    }
}
