//! Synthetic volumes shared by the unit tests: ellipsoidal masks, a
//! two-channel metaphase cell with a chromatin plate and two tubulin poles.

use crate::image::volume::{BinaryMask, ChannelStack};

/// Solid ellipsoid mask at voxel size 1, origin at the grid corner.
/// Center and semi-axes are in voxel units.
pub fn ellipsoid_mask(dims: [usize; 3], center: [i64; 3], semi_axes: [f64; 3]) -> BinaryMask {
    let mut mask = BinaryMask::empty(dims, [0, 0, 0], 1.0);
    for p in mask.positions().collect::<Vec<_>>() {
        let r = ((p[0] - center[0]) as f64 / semi_axes[0]).powi(2)
            + ((p[1] - center[1]) as f64 / semi_axes[1]).powi(2)
            + ((p[2] - center[2]) as f64 / semi_axes[2]).powi(2);
        if r <= 1.0 {
            mask.set(p, true);
        }
    }
    mask
}

/// A synthetic two-channel metaphase cell on an isotropic grid.
///
/// The chromatin plate is an oblate ellipsoid flattened along `plate_axis`
/// (0 = x, 2 = z); the tubulin channel carries a spindle-shaped bright body
/// spanning the plate along the same axis with two brighter pole foci. The
/// geometry is meant for end-to-end runs, not subvoxel accuracy.
pub struct SyntheticCell {
    pub dna: ChannelStack,
    pub tubulin: ChannelStack,
    /// Distance between the two pole foci in calibrated units.
    pub pole_distance: f64,
}

pub fn synthetic_cell(voxel_size: f64, plate_axis: usize) -> SyntheticCell {
    let extent_um = 16.0;
    let n = (extent_um / voxel_size) as usize | 1;
    let dims = [n, n, n];
    let center = (n / 2) as f64;

    let plate_radius_um = 4.0;
    let plate_half_width_um = 1.0;
    let spindle_radius_um = 2.5;
    let pole_offset_um = 4.0;

    let mut dna = vec![10.0; n * n * n];
    let mut tubulin = vec![10.0; n * n * n];

    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let d = [
                    (x as f64 - center) * voxel_size,
                    (y as f64 - center) * voxel_size,
                    (z as f64 - center) * voxel_size,
                ];
                let axial = d[plate_axis];
                let lateral = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2] - axial * axial).sqrt();
                let i = (z * n + y) * n + x;

                // oblate chromatin plate
                let plate = (lateral / plate_radius_um).powi(2)
                    + (axial / plate_half_width_um).powi(2);
                if plate <= 1.0 {
                    dna[i] = 200.0;
                }

                // spindle body between the poles
                let body = (lateral / spindle_radius_um).powi(2)
                    + (axial / pole_offset_um).powi(2);
                if body <= 1.0 {
                    tubulin[i] = 150.0;
                }

                // pole foci
                for sign in [-1.0, 1.0] {
                    let focus_axial = axial - sign * pole_offset_um * 0.85;
                    let focus = (lateral * lateral + focus_axial * focus_axial).sqrt();
                    if focus <= 0.8 {
                        tubulin[i] = 300.0;
                    }
                }
            }
        }
    }

    SyntheticCell {
        dna: ChannelStack::new(dims, [voxel_size; 3], dna),
        tubulin: ChannelStack::new(dims, [voxel_size; 3], tubulin),
        pole_distance: 2.0 * pole_offset_um * 0.85,
    }
}

/// Uniform single-value channel, below any dynamic-range requirement.
pub fn flat_channel(dims: [usize; 3], voxel_size: f64, value: f64) -> ChannelStack {
    ChannelStack::new(dims, [voxel_size; 3], vec![value; dims[0] * dims[1] * dims[2]])
}
