//! Intensity thresholds: the coarse initial estimate used to seed the
//! chromatin segmentation and the Otsu threshold used for the refined masks.

use log::debug;

use crate::image::resample::{downscale_mask, downscale_volume};
use crate::image::volume::{BinaryMask, Volume};

/// Result of the coarse threshold estimate.
#[derive(Debug, Clone, Copy)]
pub struct InitialThreshold {
    pub value: f64,
    pub dynamic_range: f64,
    pub min: f64,
    pub max: f64,
}

/// Estimates a seed threshold as `min + factor * (max - min)` on a coarse
/// resampling of the channel. The coarse grid suppresses hot pixels that
/// would otherwise dominate the maximum. When a cell mask is given, only
/// voxels inside it contribute.
pub fn estimate_initial_threshold(
    channel: &Volume,
    factor: f64,
    coarse_voxel_size: f64,
    cell_mask: Option<&BinaryMask>,
) -> InitialThreshold {
    let coarse = downscale_volume(channel, coarse_voxel_size);
    let coarse_mask = cell_mask.map(|m| downscale_mask(m, coarse_voxel_size));

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in coarse.positions() {
        if let Some(mask) = &coarse_mask {
            if !mask.get_zero(p) {
                continue;
            }
        }
        let v = coarse.get(p);
        min = min.min(v);
        max = max.max(v);
    }

    if !min.is_finite() || !max.is_finite() {
        // mask excluded everything; fall back to the full coarse image
        min = coarse.data().iter().cloned().fold(f64::INFINITY, f64::min);
        max = coarse
            .data()
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
    }

    let threshold = InitialThreshold {
        value: min + factor * (max - min),
        dynamic_range: max - min,
        min,
        max,
    };
    debug!(
        "initial threshold {:.2} (min {:.2}, max {:.2})",
        threshold.value, min, max
    );
    threshold
}

const OTSU_BINS: usize = 256;

/// Otsu's threshold over 256 equal-width bins spanning `[min, max]` of the
/// sample. Returns NaN for an empty or constant sample; callers decide
/// whether that is fatal.
pub fn otsu(values: &[f64]) -> f64 {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() || max <= min {
        return f64::NAN;
    }

    let width = (max - min) / OTSU_BINS as f64;
    let mut histogram = [0usize; OTSU_BINS];
    for &v in values {
        let bin = (((v - min) / width) as usize).min(OTSU_BINS - 1);
        histogram[bin] += 1;
    }

    let total = values.len() as f64;
    let total_mean: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum::<f64>()
        / total;

    let mut best_bin = 0;
    let mut best_variance = f64::NEG_INFINITY;
    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64 / total;
        sum_bg += i as f64 * count as f64 / total;
        let weight_fg = 1.0 - weight_bg;
        if weight_bg == 0.0 || weight_fg == 0.0 {
            continue;
        }
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (total_mean - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best_variance {
            best_variance = between;
            best_bin = i;
        }
    }

    min + (best_bin as f64 + 0.5) * width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::volume::ChannelStack;
    use crate::image::resample::resample_isotropic;

    fn gradient_volume() -> Volume {
        let dims = [12, 12, 12];
        let mut data = vec![0.0; dims[0] * dims[1] * dims[2]];
        for (i, v) in data.iter_mut().enumerate() {
            *v = (i % dims[0]) as f64 * 10.0;
        }
        resample_isotropic(&ChannelStack::new(dims, [1.0, 1.0, 1.0], data), 1.0)
    }

    #[test]
    fn threshold_is_monotonic_in_factor() {
        let v = gradient_volume();
        let low = estimate_initial_threshold(&v, 0.25, 3.0, None);
        let high = estimate_initial_threshold(&v, 0.75, 3.0, None);
        assert!(low.value < high.value);
        assert_eq!(low.dynamic_range, high.dynamic_range);
    }

    #[test]
    fn mask_restricts_the_intensity_range() {
        let v = gradient_volume();
        let mut mask = BinaryMask::empty(v.dims(), v.min(), v.voxel_size());
        // only the dim left half of the gradient
        for p in mask.positions().collect::<Vec<_>>() {
            if p[0] < v.dims()[0] as i64 / 2 {
                mask.set(p, true);
            }
        }
        let unmasked = estimate_initial_threshold(&v, 0.5, 3.0, None);
        let masked = estimate_initial_threshold(&v, 0.5, 3.0, Some(&mask));
        assert!(masked.max < unmasked.max);
    }

    #[test]
    fn otsu_separates_two_populations() {
        let mut values = vec![10.0; 500];
        values.extend(std::iter::repeat(200.0).take(500));
        let t = otsu(&values);
        assert!(t > 10.0 && t < 200.0);
    }

    #[test]
    fn otsu_of_constant_sample_is_nan() {
        assert!(otsu(&[5.0; 100]).is_nan());
        assert!(otsu(&[]).is_nan());
    }
}
