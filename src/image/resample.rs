//! Isotropic resampling of raw input stacks and working volumes.
//!
//! Downscaling is anti-aliased with a Gaussian of sigma 0.5 / scale per
//! axis (matched to the decimation factor), then sampled on the target
//! grid: output index i maps to input position i / scale. Masks are
//! resampled nearest-neighbor so they never interpolate to non-boolean
//! values.

use rayon::prelude::*;

use crate::image::filter::gaussian_blur_3d;
use crate::image::volume::{BinaryMask, ChannelStack, MaskStack, Volume};

fn scaled_extent(len: usize, scale: f64) -> usize {
    (((len - 1) as f64 * scale) as i64 + 1).max(1) as usize
}

/// Resamples a raw anisotropic channel onto an isotropic grid of the given
/// voxel size.
pub fn resample_isotropic(stack: &ChannelStack, target_voxel_size: f64) -> Volume {
    let scale = [
        stack.voxel_size[0] / target_voxel_size,
        stack.voxel_size[1] / target_voxel_size,
        stack.voxel_size[2] / target_voxel_size,
    ];
    let sigmas = [0.5 / scale[0], 0.5 / scale[1], 0.5 / scale[2]];
    let blurred = gaussian_blur_3d(&stack.data, stack.dims, sigmas);
    let source = Volume::from_data(stack.dims, [0, 0, 0], target_voxel_size, blurred);

    let out_dims = [
        scaled_extent(stack.dims[0], scale[0]),
        scaled_extent(stack.dims[1], scale[1]),
        scaled_extent(stack.dims[2], scale[2]),
    ];
    let mut data = vec![0.0; out_dims[0] * out_dims[1] * out_dims[2]];
    data.par_chunks_mut(out_dims[0] * out_dims[1])
        .enumerate()
        .for_each(|(z, slab)| {
            for y in 0..out_dims[1] {
                for x in 0..out_dims[0] {
                    slab[y * out_dims[0] + x] = source.sample_trilinear([
                        x as f64 / scale[0],
                        y as f64 / scale[1],
                        z as f64 / scale[2],
                    ]);
                }
            }
        });
    Volume::from_data(out_dims, [0, 0, 0], target_voxel_size, data)
}

/// Nearest-neighbor variant for raw binary masks.
pub fn resample_mask_isotropic(stack: &MaskStack, target_voxel_size: f64) -> BinaryMask {
    let scale = [
        stack.voxel_size[0] / target_voxel_size,
        stack.voxel_size[1] / target_voxel_size,
        stack.voxel_size[2] / target_voxel_size,
    ];
    let out_dims = [
        scaled_extent(stack.dims[0], scale[0]),
        scaled_extent(stack.dims[1], scale[1]),
        scaled_extent(stack.dims[2], scale[2]),
    ];
    let mut mask = BinaryMask::empty(out_dims, [0, 0, 0], target_voxel_size);
    for z in 0..out_dims[2] as i64 {
        for y in 0..out_dims[1] as i64 {
            for x in 0..out_dims[0] as i64 {
                let src = [
                    ((x as f64 / scale[0]).round() as i64).clamp(0, stack.dims[0] as i64 - 1),
                    ((y as f64 / scale[1]).round() as i64).clamp(0, stack.dims[1] as i64 - 1),
                    ((z as f64 / scale[2]).round() as i64).clamp(0, stack.dims[2] as i64 - 1),
                ];
                let value = stack.data[(src[2] as usize * stack.dims[1] + src[1] as usize)
                    * stack.dims[0]
                    + src[0] as usize];
                mask.set([x, y, z], value);
            }
        }
    }
    mask
}

/// Downscales an already-isotropic volume to a coarser voxel size, used
/// only for dynamic-range estimation.
pub fn downscale_volume(volume: &Volume, target_voxel_size: f64) -> Volume {
    let stack = ChannelStack::new(
        volume.dims(),
        [volume.voxel_size(); 3],
        volume.data().to_vec(),
    );
    resample_isotropic(&stack, target_voxel_size)
}

/// Nearest-neighbor downscale of an isotropic mask to a coarser voxel size.
pub fn downscale_mask(mask: &BinaryMask, target_voxel_size: f64) -> BinaryMask {
    let stack = MaskStack {
        dims: mask.dims(),
        voxel_size: [mask.voxel_size(); 3],
        data: mask.data().to_vec(),
    };
    resample_mask_isotropic(&stack, target_voxel_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn anisotropic_stack_becomes_isotropic() {
        // 0.5 x 0.5 x 2.0 um voxels, resampled at 0.5 um
        let stack = ChannelStack::new([8, 8, 4], [0.5, 0.5, 2.0], vec![1.0; 8 * 8 * 4]);
        let volume = resample_isotropic(&stack, 0.5);
        assert_eq!(volume.dims(), [8, 8, 13]);
        assert_relative_eq!(volume.voxel_size(), 0.5);
    }

    #[test]
    fn constant_volume_resamples_to_constant() {
        let stack = ChannelStack::new([6, 6, 6], [1.0, 1.0, 1.0], vec![3.0; 216]);
        let volume = resample_isotropic(&stack, 0.5);
        for &v in volume.data() {
            assert_relative_eq!(v, 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn mask_resampling_stays_boolean_and_covers_same_region() {
        let mut data = vec![false; 6 * 6 * 6];
        // solid 2x2x2 block in a corner
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    data[(z * 6 + y) * 6 + x] = true;
                }
            }
        }
        let stack = MaskStack {
            dims: [6, 6, 6],
            voxel_size: [1.0, 1.0, 1.0],
            data,
        };
        let mask = resample_mask_isotropic(&stack, 0.5);
        assert_eq!(mask.dims(), [11, 11, 11]);
        // block roughly doubles along each axis
        let count = mask.count_foreground();
        assert!((16..=64).contains(&count), "count = {count}");
    }

    #[test]
    fn downscale_halves_extent() {
        let volume = Volume::filled([9, 9, 9], [0, 0, 0], 1.0, 1.0);
        let coarse = downscale_volume(&volume, 2.0);
        assert_eq!(coarse.dims(), [5, 5, 5]);
    }
}
