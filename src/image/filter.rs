//! Separable Gaussian filtering, the blur primitive behind anti-aliased
//! resampling and pole refinement.

use rayon::prelude::*;

use crate::image::volume::Volume;

fn kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i64;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// One border-extended convolution pass along `axis`.
fn blur_axis(data: &[f64], dims: [usize; 3], axis: usize, sigma: f64) -> Vec<f64> {
    let weights = kernel(sigma);
    let radius = (weights.len() / 2) as i64;
    let len = dims[axis] as i64;
    let plane = dims[0] * dims[1];

    let mut out = vec![0.0; data.len()];
    out.par_chunks_mut(plane).enumerate().for_each(|(z, slab)| {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                let pos = [x as i64, y as i64, z as i64];
                let mut acc = 0.0;
                for (k, w) in weights.iter().enumerate() {
                    let mut q = pos;
                    q[axis] = (pos[axis] + k as i64 - radius).clamp(0, len - 1);
                    acc += w * data[(q[2] as usize * dims[1] + q[1] as usize) * dims[0]
                        + q[0] as usize];
                }
                slab[y * dims[0] + x] = acc;
            }
        }
    });
    out
}

/// Gaussian blur of a raw array with per-axis sigmas in voxel units.
/// A non-positive sigma skips that axis.
pub fn gaussian_blur_3d(data: &[f64], dims: [usize; 3], sigmas: [f64; 3]) -> Vec<f64> {
    let mut current = data.to_vec();
    for axis in 0..3 {
        if sigmas[axis] > 0.0 && dims[axis] > 1 {
            current = blur_axis(&current, dims, axis, sigmas[axis]);
        }
    }
    current
}

/// Blurred copy of a volume, sigma given in micrometers and converted to
/// voxel units internally.
pub fn blurred_volume(volume: &Volume, sigma_um: f64) -> Volume {
    let sigma = sigma_um / volume.voxel_size();
    let data = gaussian_blur_3d(volume.data(), volume.dims(), [sigma; 3]);
    Volume::from_data(volume.dims(), volume.min(), volume.voxel_size(), data)
}
