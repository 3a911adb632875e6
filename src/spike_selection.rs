/// Spike triplet selection.
///
/// Groups angle candidates on the bidirectional circle, scores every
/// 3-combination of the strongest groups against the expected Bathinov
/// geometry (two gaps of one mask angle each), and orders the winner into
/// central/left/right. When the signal is insufficient a canonical fallback
/// triplet is synthesized and flagged so downstream consumers can tell a
/// measured result from a degraded one.
use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::geometry::{angular_difference_180, normalize_angle_180, Line, Point2D};
use crate::line_detection::SpikeCandidate;
use crate::preprocess::IntensityField;

/// Where a triplet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Selected from detected spike candidates.
    Measured,
    /// Synthesized at canonical angles because the signal was insufficient.
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct Spike {
    pub line: Line,
    pub strength: f64,
}

/// The terminal geometric artifact: central spike plus the two outer spikes.
#[derive(Debug, Clone, Serialize)]
pub struct SpikeTriplet {
    pub central: Spike,
    pub left: Spike,
    pub right: Spike,
    pub provenance: Provenance,
}

impl SpikeTriplet {
    pub fn average_strength(&self) -> f64 {
        (self.central.strength + self.left.strength + self.right.strength) / 3.0
    }

    pub fn is_measured(&self) -> bool {
        self.provenance == Provenance::Measured
    }
}

/// Select the best triplet from the detected candidates, or fall back.
pub fn select(
    candidates: &[SpikeCandidate],
    center: Point2D,
    chord_radius: f64,
    config: &AnalysisConfig,
) -> SpikeTriplet {
    let groups = group_candidates(candidates, config.grouping_threshold_degrees);
    let usable: Vec<&SpikeCandidate> = groups
        .iter()
        .take(config.max_candidate_groups)
        .filter(|c| c.strength >= config.min_strength_floor)
        .collect();

    if usable.len() < 3 {
        debug!(
            "only {} usable candidate groups, synthesizing fallback triplet",
            usable.len()
        );
        return fallback_triplet(center, chord_radius, config.mask_angle_degrees);
    }

    let mut best: Option<(f64, [&SpikeCandidate; 3])> = None;
    for i in 0..usable.len() {
        for j in i + 1..usable.len() {
            for k in j + 1..usable.len() {
                let trio = [usable[i], usable[j], usable[k]];
                let score = score_triplet(&trio, config.mask_angle_degrees);
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, trio));
                }
            }
        }
    }

    match best {
        Some((score, trio)) if score >= config.min_triplet_score => {
            debug!(
                "selected triplet at angles ({:.1}, {:.1}, {:.1}) with score {:.3}",
                trio[0].angle_degrees, trio[1].angle_degrees, trio[2].angle_degrees, score
            );
            assign_roles(&trio, center, chord_radius, config.gap_symmetry_degrees)
        }
        Some((score, _)) => {
            debug!(
                "best triplet score {:.3} below minimum {:.3}, synthesizing fallback",
                score, config.min_triplet_score
            );
            fallback_triplet(center, chord_radius, config.mask_angle_degrees)
        }
        None => fallback_triplet(center, chord_radius, config.mask_angle_degrees),
    }
}

/// Merge candidates within the grouping threshold on the 0-180 circle,
/// keeping the strongest representative per group. Returns groups sorted by
/// strength, strongest first.
fn group_candidates(candidates: &[SpikeCandidate], threshold_degrees: f64) -> Vec<SpikeCandidate> {
    let mut sorted: Vec<SpikeCandidate> = candidates.to_vec();
    sorted.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap());

    let mut groups: Vec<SpikeCandidate> = Vec::new();
    for candidate in sorted {
        let merged = groups
            .iter()
            .any(|g| angular_difference_180(g.angle_degrees, candidate.angle_degrees) < threshold_degrees);
        if !merged {
            groups.push(candidate);
        }
    }
    groups
}

/// Circular arrangement of three bidirectional angles: the arc not containing
/// the largest gap, as (ordered angles, inner gaps).
fn circular_arc(angles: [f64; 3]) -> ([f64; 3], [f64; 2]) {
    let mut sorted = angles.map(normalize_angle_180);
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let [a0, a1, a2] = sorted;

    let gaps = [a1 - a0, a2 - a1, 180.0 - (a2 - a0)];
    // Start the arc just past the largest gap.
    let start = if gaps[2] >= gaps[0] && gaps[2] >= gaps[1] {
        0 // no wraparound
    } else if gaps[0] >= gaps[1] {
        1 // arc is a1, a2, a0+180
    } else {
        2 // arc is a2, a0+180, a1+180
    };

    let ordered = match start {
        0 => [a0, a1, a2],
        1 => [a1, a2, a0 + 180.0],
        _ => [a2, a0 + 180.0, a1 + 180.0],
    };
    let inner_gaps = [ordered[1] - ordered[0], ordered[2] - ordered[1]];
    (ordered, inner_gaps)
}

/// Score a candidate triplet: geometry fit against the expected two gaps of
/// one mask angle each, blended with combined strength.
fn score_triplet(trio: &[&SpikeCandidate; 3], mask_angle_degrees: f64) -> f64 {
    let (_, gaps) = circular_arc([
        trio[0].angle_degrees,
        trio[1].angle_degrees,
        trio[2].angle_degrees,
    ]);

    let gap_error = (gaps[0] - mask_angle_degrees).abs() + (gaps[1] - mask_angle_degrees).abs();
    let geometry = (1.0 - gap_error / (2.0 * mask_angle_degrees)).max(0.0);
    let strength = (trio[0].strength + trio[1].strength + trio[2].strength) / 3.0;

    0.6 * geometry + 0.4 * strength
}

/// Order the winning triplet into roles. The member roughly equidistant from
/// the other two is central; if the gaps are too lopsided for that, the
/// strongest member is central and the rest order by angle.
fn assign_roles(
    trio: &[&SpikeCandidate; 3],
    center: Point2D,
    chord_radius: f64,
    gap_symmetry_degrees: f64,
) -> SpikeTriplet {
    let (ordered, gaps) = circular_arc([
        trio[0].angle_degrees,
        trio[1].angle_degrees,
        trio[2].angle_degrees,
    ]);

    // Map arc positions back to the original candidates by angle.
    let by_angle = |target: f64| -> &SpikeCandidate {
        trio.iter()
            .copied()
            .min_by(|a, b| {
                angular_difference_180(a.angle_degrees, target)
                    .partial_cmp(&angular_difference_180(b.angle_degrees, target))
                    .unwrap()
            })
            .unwrap()
    };

    let (central_c, left_c, right_c) = if (gaps[0] - gaps[1]).abs() <= gap_symmetry_degrees {
        (by_angle(ordered[1]), by_angle(ordered[0]), by_angle(ordered[2]))
    } else {
        // Ambiguous geometry: strongest is central, outer two by arc order.
        let strongest = trio
            .iter()
            .copied()
            .max_by(|a, b| a.strength.partial_cmp(&b.strength).unwrap())
            .unwrap();
        let mut outer: Vec<&SpikeCandidate> = ordered
            .iter()
            .map(|&a| by_angle(a))
            .filter(|c| {
                angular_difference_180(c.angle_degrees, strongest.angle_degrees) > 1e-9
            })
            .collect();
        outer.truncate(2);
        (strongest, outer[0], outer[1])
    };

    let spike = |c: &SpikeCandidate| Spike {
        line: Line::through_center(center, c.angle_degrees, chord_radius),
        strength: c.strength,
    };

    SpikeTriplet {
        central: spike(central_c),
        left: spike(left_c),
        right: spike(right_c),
        provenance: Provenance::Measured,
    }
}

/// Canonical deterministic fallback: central at 90 degrees with the outer
/// spikes one mask angle either side, zero strength so the metric stage
/// reports low confidence instead of a misleadingly precise number.
pub fn fallback_triplet(center: Point2D, chord_radius: f64, mask_angle_degrees: f64) -> SpikeTriplet {
    let spike = |angle: f64| Spike {
        line: Line::through_center(center, angle, chord_radius),
        strength: 0.0,
    };
    SpikeTriplet {
        central: spike(90.0),
        left: spike(90.0 - mask_angle_degrees),
        right: spike(90.0 + mask_angle_degrees),
        provenance: Provenance::Fallback,
    }
}

/// Refine each measured spike's perpendicular offset against the intensity
/// field. Detection yields angles only, and the chords are first synthesized
/// through the star center — but the central spike shifts laterally with
/// defocus, and that lateral offset IS the measurement. Scan offsets for the
/// strongest line response and interpolate the peak to sub-pixel.
pub fn refine_offsets(
    triplet: &mut SpikeTriplet,
    field: &IntensityField,
    center: Point2D,
    config: &AnalysisConfig,
) {
    if !triplet.is_measured() {
        return;
    }
    for spike in [
        &mut triplet.central,
        &mut triplet.left,
        &mut triplet.right,
    ] {
        refine_spike(spike, field, center, config.offset_search_range_pixels);
    }
}

const OFFSET_SCAN_STEP: f64 = 0.5;

fn refine_spike(spike: &mut Spike, field: &IntensityField, center: Point2D, range: f64) {
    let angle = spike.line.angle_degrees;
    let steps = (2.0 * range / OFFSET_SCAN_STEP).round() as usize;
    if steps < 2 {
        return;
    }

    let responses: Vec<f64> = (0..=steps)
        .map(|i| line_response(field, center, angle, -range + i as f64 * OFFSET_SCAN_STEP))
        .collect();

    let best = responses
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(steps / 2);
    if responses[best] <= 0.0 {
        return;
    }

    // Parabolic sub-step interpolation around the peak.
    let mut offset = -range + best as f64 * OFFSET_SCAN_STEP;
    if best > 0 && best < steps {
        let (r0, r1, r2) = (responses[best - 1], responses[best], responses[best + 1]);
        let denom = r0 - 2.0 * r1 + r2;
        if denom.abs() > 1e-12 {
            let delta = (0.5 * (r0 - r2) / denom).clamp(-1.0, 1.0);
            offset += delta * OFFSET_SCAN_STEP;
        }
    }

    let half_chord = spike.line.p1.distance_to(&spike.line.p2) / 2.0;
    spike.line = Line::through_center(center, angle, half_chord).offset_perpendicular(offset);
}

/// Mean intensity sampled along a line at `angle` through the point `offset`
/// pixels perpendicular from `center`, skipping the star core.
fn line_response(field: &IntensityField, center: Point2D, angle: f64, offset: f64) -> f64 {
    let theta = angle.to_radians();
    let (dx, dy) = (theta.cos(), theta.sin());
    let (nx, ny) = (-theta.sin(), theta.cos());
    let base_x = center.x + nx * offset;
    let base_y = center.y + ny * offset;

    let r_max = (field.width.min(field.height) as f64) / 2.0 - 1.0;
    let inner = 4.0;

    let mut sum = 0.0;
    let mut count = 0usize;
    let mut t = -r_max;
    while t <= r_max {
        if t.abs() >= inner {
            let x = base_x + dx * t;
            let y = base_y + dy * t;
            if x >= 0.0 && y >= 0.0 && x < field.width as f64 && y < field.height as f64 {
                sum += field.sample_bilinear(x, y);
                count += 1;
            }
        }
        t += 1.0;
    }

    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;

    fn candidate(angle: f64, strength: f64) -> SpikeCandidate {
        SpikeCandidate {
            angle_degrees: angle,
            strength,
            prominence: strength,
        }
    }

    fn center() -> Point2D {
        Point2D::new(100.0, 100.0)
    }

    #[test]
    fn test_selects_bathinov_geometry() {
        let config = AnalysisConfig::default(); // mask angle 34
        let candidates = vec![
            candidate(90.0, 1.0),
            candidate(56.0, 0.8),
            candidate(124.0, 0.8),
            candidate(10.0, 0.9), // strong distractor with bad geometry
        ];
        let triplet = select(&candidates, center(), 200.0, &config);

        assert!(triplet.is_measured());
        assert!((triplet.central.line.angle_degrees - 90.0).abs() < 1e-9);
        assert!((triplet.left.line.angle_degrees - 56.0).abs() < 1e-9);
        assert!((triplet.right.line.angle_degrees - 124.0).abs() < 1e-9);
    }

    #[test]
    fn test_grouping_merges_close_angles() {
        let candidates = vec![
            candidate(89.0, 0.5),
            candidate(90.0, 1.0),
            candidate(93.0, 0.4),
            candidate(120.0, 0.7),
        ];
        let groups = group_candidates(&candidates, 10.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].angle_degrees, 90.0); // strongest representative
    }

    #[test]
    fn test_grouping_wraps_at_180() {
        let candidates = vec![candidate(2.0, 1.0), candidate(178.0, 0.5)];
        let groups = group_candidates(&candidates, 10.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].angle_degrees, 2.0);
    }

    #[test]
    fn test_fallback_on_too_few_candidates() {
        let config = AnalysisConfig::default();
        let triplet = select(&[candidate(90.0, 1.0)], center(), 200.0, &config);
        assert_eq!(triplet.provenance, Provenance::Fallback);
        assert_eq!(triplet.central.line.angle_degrees, 90.0);
        assert_eq!(triplet.left.line.angle_degrees, 56.0);
        assert_eq!(triplet.right.line.angle_degrees, 124.0);
        assert_eq!(triplet.average_strength(), 0.0);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let config = AnalysisConfig::default();
        let a = select(&[], center(), 200.0, &config);
        let b = select(&[], center(), 200.0, &config);
        assert_eq!(a.provenance, Provenance::Fallback);
        assert_eq!(a.central.line.angle_degrees, b.central.line.angle_degrees);
        assert_eq!(a.left.line.p1.x, b.left.line.p1.x);
    }

    #[test]
    fn test_fallback_on_weak_candidates() {
        let mut config = AnalysisConfig::default();
        config.min_strength_floor = 0.2;
        let candidates = vec![
            candidate(90.0, 0.1),
            candidate(56.0, 0.1),
            candidate(124.0, 0.1),
        ];
        let triplet = select(&candidates, center(), 200.0, &config);
        assert_eq!(triplet.provenance, Provenance::Fallback);
    }

    #[test]
    fn test_roles_across_180_wraparound() {
        // Pattern centered at 173 degrees: outer spikes at 139 and 27 (207
        // folded). Role assignment must see through the wrap.
        let config = AnalysisConfig::default();
        let candidates = vec![
            candidate(173.0, 1.0),
            candidate(139.0, 0.8),
            candidate(27.0, 0.8),
        ];
        let triplet = select(&candidates, center(), 200.0, &config);

        assert!(triplet.is_measured());
        assert!((triplet.central.line.angle_degrees - 173.0).abs() < 1e-9);
        assert!((triplet.left.line.angle_degrees - 139.0).abs() < 1e-9);
        assert!((triplet.right.line.angle_degrees - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_refine_recovers_lateral_offset() {
        // A horizontal bright line 2.3 px below the nominal center with a
        // Gaussian cross-section; refinement should shift the chord onto it.
        let size = 101usize;
        let c = Point2D::new(50.0, 50.0);
        let line_y = 52.3;
        let mut data = vec![0u8; size * size];
        for y in 0..size {
            for x in 0..size {
                let d = y as f64 - line_y;
                data[y * size + x] = (220.0 * (-d * d / (2.0 * 0.9 * 0.9)).exp()) as u8;
            }
        }
        let field = IntensityField::new(size, size, data);

        let mut triplet = SpikeTriplet {
            central: Spike {
                line: Line::through_center(c, 0.0, 60.0),
                strength: 0.8,
            },
            left: Spike {
                line: Line::through_center(c, 0.0, 60.0),
                strength: 0.8,
            },
            right: Spike {
                line: Line::through_center(c, 0.0, 60.0),
                strength: 0.8,
            },
            provenance: Provenance::Measured,
        };
        refine_offsets(&mut triplet, &field, c, &AnalysisConfig::default());

        let d = triplet.central.line.distance_to_point(&c);
        assert!((d - 2.3).abs() < 0.3, "refined offset {} not near 2.3", d);
    }

    #[test]
    fn test_refine_skips_fallback() {
        let size = 51usize;
        let field = IntensityField::new(size, size, vec![0; size * size]);
        let c = Point2D::new(25.0, 25.0);
        let mut triplet = fallback_triplet(c, 40.0, 34.0);
        let before = triplet.central.line.p1;
        refine_offsets(&mut triplet, &field, c, &AnalysisConfig::default());
        assert_eq!(triplet.central.line.p1.x, before.x);
        assert_eq!(triplet.central.line.p1.y, before.y);
    }

    #[test]
    fn test_asymmetric_gaps_pick_strongest_as_central() {
        let mut config = AnalysisConfig::default();
        // Loosen geometry scoring so the lopsided trio still wins.
        config.min_triplet_score = 0.1;
        let candidates = vec![
            candidate(50.0, 0.5),
            candidate(90.0, 1.0),
            candidate(105.0, 0.5),
        ];
        let triplet = select(&candidates, center(), 200.0, &config);
        assert!(triplet.is_measured());
        assert!((triplet.central.line.angle_degrees - 90.0).abs() < 1e-9);
    }
}
