//! Moment-based ellipsoid fit of a binary mask and the rigid transform that
//! aligns its shortest axis with z.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};

use crate::analysis::PipelineError;
use crate::image::transform::{rotation_onto, RigidTransform3};
use crate::image::volume::BinaryMask;

/// Principal axes of a voxel region, in voxel units. Axes and radii are
/// sorted by ascending radius, so index 0 is the shortest axis.
#[derive(Debug, Clone)]
pub struct EllipsoidFit {
    pub center: Point3<f64>,
    pub axes: [Vector3<f64>; 3],
    pub radii: [f64; 3],
}

/// Fits an ellipsoid to the mask foreground from its second central
/// moments. Semi-axis lengths follow the uniform-density solid ellipsoid
/// relation, radius = sqrt(5 lambda).
pub fn fit_ellipsoid(mask: &BinaryMask) -> Result<EllipsoidFit, PipelineError> {
    let mut count = 0usize;
    let mut sum = Vector3::zeros();
    for p in mask.foreground() {
        sum += Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        count += 1;
    }
    if count == 0 {
        return Err(PipelineError::DegenerateMask);
    }
    let center = Point3::from(sum / count as f64);

    let mut covariance = Matrix3::zeros();
    for p in mask.foreground() {
        let d = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - center.coords;
        covariance += d * d.transpose();
    }
    covariance /= count as f64;

    let eigen = SymmetricEigen::new(covariance);

    // ascending by radius; ties keep the eigensolver's column order
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap()
            .then(a.cmp(&b))
    });

    let mut axes = [Vector3::zeros(); 3];
    let mut radii = [0.0; 3];
    for (rank, &i) in order.iter().enumerate() {
        axes[rank] = eigen.eigenvectors.column(i).into_owned().normalize();
        radii[rank] = (5.0 * eigen.eigenvalues[i].max(0.0)).sqrt();
    }

    Ok(EllipsoidFit {
        center,
        axes,
        radii,
    })
}

/// Transform moving the fit center to the origin and rotating the shortest
/// axis onto z. Applied to the chromatin channel this puts the metaphase
/// plate flat in xy with the spindle axis along z.
pub fn shortest_axis_alignment(fit: &EllipsoidFit) -> RigidTransform3 {
    let rotation = rotation_onto(Vector3::z(), fit.axes[0]);
    RigidTransform3::centered_rotation(rotation, fit.center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::test_volumes::ellipsoid_mask;

    #[test]
    fn empty_mask_is_degenerate() {
        let mask = BinaryMask::empty([5, 5, 5], [0, 0, 0], 1.0);
        assert!(matches!(
            fit_ellipsoid(&mask),
            Err(PipelineError::DegenerateMask)
        ));
    }

    #[test]
    fn axes_are_sorted_ascending() {
        // semi-axes 10 x 4 x 4 along x, so x is the longest direction
        let mask = ellipsoid_mask([25, 13, 13], [12, 6, 6], [10.0, 4.0, 4.0]);
        let fit = fit_ellipsoid(&mask).unwrap();
        assert!(fit.radii[0] <= fit.radii[1] && fit.radii[1] <= fit.radii[2]);
        assert_relative_eq!(fit.radii[2], 10.0, epsilon = 0.6);
        assert_relative_eq!(fit.axes[2].x.abs(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn centroid_matches_the_placed_center() {
        let mask = ellipsoid_mask([25, 13, 13], [12, 6, 6], [10.0, 4.0, 4.0]);
        let fit = fit_ellipsoid(&mask).unwrap();
        assert_relative_eq!(fit.center, Point3::new(12.0, 6.0, 6.0), epsilon = 0.5);
    }

    #[test]
    fn alignment_sends_the_shortest_axis_to_z() {
        // flat along z already is the trivial case; make it flat along x
        let mask = ellipsoid_mask([13, 25, 25], [6, 12, 12], [3.0, 9.0, 9.0]);
        let fit = fit_ellipsoid(&mask).unwrap();
        let t = shortest_axis_alignment(&fit);

        assert_relative_eq!(t.apply(fit.center), Point3::origin(), epsilon = 1e-9);
        let mapped = t.rotation * fit.axes[0];
        // within one degree of the z axis
        assert!(mapped.dot(&Vector3::z()).abs() > (1.0_f64).to_radians().cos());
    }
}
