//! Locating the two spindle poles on a pole-axis-aligned volume and
//! refining them to the local tubulin intensity maxima.

use log::debug;
use nalgebra::Point3;

use crate::analysis::profile::{derivative, maximum_along_z};
use crate::analysis::PipelineError;
use crate::image::filter::blurred_volume;
use crate::image::volume::{BinaryMask, Volume};

const POLE_EDGE_DERIVATIVE_DELTA: usize = 2;
const POLE_REFINEMENT_BLUR_SIGMA_UM: f64 = 0.75;

/// The two pole positions, in calibrated units relative to the volume
/// origin.
#[derive(Debug, Clone, Copy)]
pub struct PolePair {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
}

impl PolePair {
    pub fn axial_distance(&self) -> f64 {
        (self.a - self.b).norm()
    }
}

/// Initial pole estimate from the binary spindle mask: the z positions
/// where the per-slice mask occupancy rises and falls, taken on the axis
/// itself. The occupancy only counts voxels within `lateral_radius`
/// (calibrated units) of the axis, so mask fragments far off axis cannot
/// drag a pole outward.
pub fn locate_poles(spindle_mask: &BinaryMask, lateral_radius: f64) -> PolePair {
    let lateral_radius_voxels = lateral_radius / spindle_mask.voxel_size();
    let occupancy = maximum_along_z(spindle_mask, lateral_radius_voxels);
    let edges = derivative(&occupancy, POLE_EDGE_DERIVATIVE_DELTA);

    // the rising edge lies below the plate center, the falling edge above
    let rising = edges
        .maximum_left_of_center()
        .or_else(|| edges.maximum())
        .map(|p| p.coordinate)
        .unwrap_or(0.0);
    let falling = edges
        .minimum_right_of_center()
        .or_else(|| edges.minimum())
        .map(|p| p.coordinate)
        .unwrap_or(0.0);

    debug!("initial poles at z = {:.2} and {:.2}", rising, falling);
    PolePair {
        a: Point3::new(0.0, 0.0, rising),
        b: Point3::new(0.0, 0.0, falling),
    }
}

/// Moves each pole to the brightest tubulin voxel near it. The search box
/// extends `lateral_radius` in x and y and `axial_radius` in z (calibrated
/// units) around the initial pole, and only mask-foreground voxels are
/// candidates. A box without any foreground is a fault, not a silent
/// fallback.
pub fn refine_poles(
    tubulin: &Volume,
    spindle_mask: &BinaryMask,
    initial: &PolePair,
    lateral_radius: f64,
    axial_radius: f64,
) -> Result<PolePair, PipelineError> {
    let blurred = blurred_volume(tubulin, POLE_REFINEMENT_BLUR_SIGMA_UM);
    let a = refine_pole(&blurred, spindle_mask, initial.a, lateral_radius, axial_radius)?;
    let b = refine_pole(&blurred, spindle_mask, initial.b, lateral_radius, axial_radius)?;
    debug!(
        "refined poles moved by {:.2} and {:.2} um",
        (a - initial.a).norm(),
        (b - initial.b).norm()
    );
    Ok(PolePair { a, b })
}

fn refine_pole(
    tubulin: &Volume,
    spindle_mask: &BinaryMask,
    pole: Point3<f64>,
    lateral_radius: f64,
    axial_radius: f64,
) -> Result<Point3<f64>, PipelineError> {
    let voxel_size = tubulin.voxel_size();
    let center = [
        (pole.x / voxel_size) as i64,
        (pole.y / voxel_size) as i64,
        (pole.z / voxel_size) as i64,
    ];
    let lateral = (lateral_radius / voxel_size) as i64;
    let axial = (axial_radius / voxel_size) as i64;

    let mut best: Option<([i64; 3], f64)> = None;
    for dz in -axial..=axial {
        for dy in -lateral..=lateral {
            for dx in -lateral..=lateral {
                let p = [center[0] + dx, center[1] + dy, center[2] + dz];
                if !tubulin.contains(p) || !spindle_mask.get_zero(p) {
                    continue;
                }
                let v = tubulin.get(p);
                if best.map_or(true, |(_, b)| v > b) {
                    best = Some((p, v));
                }
            }
        }
    }

    let (p, _) = best.ok_or(PipelineError::NoMaximumInsideMask)?;
    Ok(Point3::new(
        p[0] as f64 * voxel_size,
        p[1] as f64 * voxel_size,
        p[2] as f64 * voxel_size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spindle_mask_between(z_lo: i64, z_hi: i64) -> BinaryMask {
        let mut mask = BinaryMask::empty([15, 15, 31], [-7, -7, -15], 0.5);
        for z in z_lo..=z_hi {
            for y in -2..=2 {
                for x in -2..=2 {
                    mask.set([x, y, z], true);
                }
            }
        }
        mask
    }

    #[test]
    fn poles_sit_at_the_mask_extent() {
        let mask = spindle_mask_between(-10, 10);
        let poles = locate_poles(&mask, 3.0);
        // occupancy edges read at the outer end of each derivative run
        assert_relative_eq!(poles.axial_distance(), 11.0);
        assert!(poles.a.z < 0.0 && poles.b.z > 0.0);
    }

    #[test]
    fn off_axis_fragment_does_not_drag_a_pole() {
        let mut mask = spindle_mask_between(-8, 8);
        // mask blob 3.5 um off axis, reaching well past the upper pole
        for z in 9..=14 {
            mask.set([7, 0, z], true);
        }
        let poles = locate_poles(&mask, 3.0);
        assert_relative_eq!(poles.b.z, 4.5);
        assert_relative_eq!(poles.a.z, -4.5);
    }

    #[test]
    fn refinement_snaps_to_the_brightest_masked_voxel() {
        let mask = spindle_mask_between(-10, 10);
        let mut tubulin = Volume::filled([15, 15, 31], [-7, -7, -15], 0.5, 10.0);
        // bright focus one voxel off axis near the lower pole
        tubulin.set([1, 0, -9], 500.0);
        let initial = locate_poles(&mask, 3.0);
        let refined = refine_poles(&tubulin, &mask, &initial, 2.0, 1.5).unwrap();
        assert_relative_eq!(refined.a.x, 0.5);
        assert_relative_eq!(refined.a.z, -4.5);
    }

    #[test]
    fn foci_ten_micrometers_apart_are_recovered() {
        let mask = spindle_mask_between(-10, 10);
        let mut tubulin = Volume::filled([15, 15, 31], [-7, -7, -15], 0.5, 10.0);
        tubulin.set([0, 0, -10], 500.0);
        tubulin.set([0, 0, 10], 500.0);
        let initial = locate_poles(&mask, 3.0);
        let refined = refine_poles(&tubulin, &mask, &initial, 2.0, 1.0).unwrap();
        assert_relative_eq!(refined.axial_distance(), 10.0, epsilon = 0.5);
        assert!((refined.a - initial.a).norm() < 1.0);
        assert!((refined.b - initial.b).norm() < 1.0);
    }

    #[test]
    fn empty_search_box_is_a_fault() {
        let mask = spindle_mask_between(-10, 10);
        let tubulin = Volume::filled([15, 15, 31], [-7, -7, -15], 0.5, 10.0);
        let far = PolePair {
            a: Point3::new(0.0, 0.0, -7.0),
            b: Point3::new(0.0, 0.0, 7.0),
        };
        let result = refine_poles(&tubulin, &mask, &far, 0.5, 0.5);
        assert!(matches!(result, Err(PipelineError::NoMaximumInsideMask)));
    }
}
