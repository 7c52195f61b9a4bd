//! 1D intensity profiles extracted from aligned volumes, and the discrete
//! derivative analysis used to locate structure boundaries along them.

use crate::image::volume::{BinaryMask, Plane, Volume};

/// A sampled 1D profile. Coordinates are in calibrated units (micrometer)
/// and strictly increasing.
#[derive(Debug, Clone)]
pub struct Profile {
    pub coordinates: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfilePoint {
    pub coordinate: f64,
    pub value: f64,
}

impl Profile {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn maximum(&self) -> Option<ProfilePoint> {
        self.points()
            .max_by(|a, b| a.value.partial_cmp(&b.value).unwrap())
    }

    pub fn minimum(&self) -> Option<ProfilePoint> {
        self.points()
            .min_by(|a, b| a.value.partial_cmp(&b.value).unwrap())
    }

    /// Largest value among points with coordinate strictly below zero.
    /// Ties resolve to the smallest coordinate, the point furthest from
    /// the center.
    pub fn maximum_left_of_center(&self) -> Option<ProfilePoint> {
        self.points()
            .filter(|p| p.coordinate < 0.0)
            .fold(None, |best: Option<ProfilePoint>, p| match best {
                Some(b) if p.value <= b.value => Some(b),
                _ => Some(p),
            })
    }

    /// Smallest value among points with coordinate at or above zero.
    /// Ties resolve to the largest coordinate, the point furthest from
    /// the center.
    pub fn minimum_right_of_center(&self) -> Option<ProfilePoint> {
        self.points()
            .filter(|p| p.coordinate >= 0.0)
            .fold(None, |best: Option<ProfilePoint>, p| match best {
                Some(b) if p.value > b.value => Some(b),
                _ => Some(p),
            })
    }

    fn points(&self) -> impl Iterator<Item = ProfilePoint> + '_ {
        self.coordinates
            .iter()
            .zip(&self.values)
            .map(|(&coordinate, &value)| ProfilePoint { coordinate, value })
    }
}

/// Central difference `v[i + di] - v[i]` reported at the midpoint
/// coordinate. `di` must be positive and even so the midpoint lands on the
/// original sampling grid; the output has `len() - di` points.
pub fn derivative(profile: &Profile, di: usize) -> Profile {
    assert!(di > 0 && di % 2 == 0, "derivative delta must be positive and even");
    assert!(profile.len() > di);

    let n = profile.len() - di;
    let mut coordinates = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        coordinates.push(profile.coordinates[i + di / 2]);
        values.push(profile.values[i + di] - profile.values[i]);
    }
    Profile {
        coordinates,
        values,
    }
}

/// Average intensity per z slice over the lateral voxels within
/// `lateral_radius` voxels of the z axis, restricted to slices whose
/// calibrated |z| does not exceed `z_limit`.
pub fn average_along_z(volume: &Volume, lateral_radius: f64, z_limit: f64) -> Profile {
    let min = volume.min();
    let max = volume.max();
    let voxel_size = volume.voxel_size();
    let radius_squared = lateral_radius * lateral_radius;

    let mut coordinates = Vec::new();
    let mut values = Vec::new();
    for z in min[2]..=max[2] {
        let z_um = z as f64 * voxel_size;
        if z_um.abs() > z_limit {
            continue;
        }
        let mut sum = 0.0;
        let mut count = 0usize;
        for y in min[1]..=max[1] {
            for x in min[0]..=max[0] {
                if (x * x + y * y) as f64 <= radius_squared {
                    sum += volume.get([x, y, z]);
                    count += 1;
                }
            }
        }
        if count > 0 {
            coordinates.push(z_um);
            values.push(sum / count as f64);
        }
    }
    Profile {
        coordinates,
        values,
    }
}

/// Per-slice maximum of a binary mask, 1.0 where the slice has foreground
/// within `lateral_radius` voxels of the z axis. Foreground further out,
/// such as detached spindle fragments, does not register.
pub fn maximum_along_z(mask: &BinaryMask, lateral_radius: f64) -> Profile {
    let min = mask.min();
    let max = mask.max();
    let voxel_size = mask.voxel_size();
    let radius_squared = lateral_radius * lateral_radius;

    let mut coordinates = Vec::with_capacity(mask.dims()[2]);
    let mut values = Vec::with_capacity(mask.dims()[2]);
    for z in min[2]..=max[2] {
        let mut any = false;
        'slice: for y in min[1]..=max[1] {
            for x in min[0]..=max[0] {
                if ((x * x + y * y) as f64) <= radius_squared && mask.get([x, y, z]) {
                    any = true;
                    break 'slice;
                }
            }
        }
        coordinates.push(z as f64 * voxel_size);
        values.push(if any { 1.0 } else { 0.0 });
    }
    Profile {
        coordinates,
        values,
    }
}

/// Mean intensity per integer radius ring around the plane origin, out to
/// `max_radius` in calibrated units.
pub fn radial_average(plane: &Plane, max_radius: f64) -> Profile {
    let voxel_size = plane.voxel_size();
    let bins = (max_radius / voxel_size) as usize + 1;
    let mut sums = vec![0.0; bins];
    let mut counts = vec![0usize; bins];

    for p in plane.positions() {
        let r = ((p[0] * p[0] + p[1] * p[1]) as f64).sqrt();
        let bin = r.round() as usize;
        if bin < bins {
            sums[bin] += plane.get(p);
            counts[bin] += 1;
        }
    }

    let mut coordinates = Vec::new();
    let mut values = Vec::new();
    for (bin, (&sum, &count)) in sums.iter().zip(&counts).enumerate() {
        if count > 0 {
            coordinates.push(bin as f64 * voxel_size);
            values.push(sum / count as f64);
        }
    }
    Profile {
        coordinates,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_profile() -> Profile {
        // unit step crossing zero between coordinate -1 and 0
        let coordinates: Vec<f64> = (-5..=5).map(|i| i as f64).collect();
        let values = coordinates
            .iter()
            .map(|&c| if c < 0.0 { 0.0 } else { 1.0 })
            .collect();
        Profile {
            coordinates,
            values,
        }
    }

    #[test]
    fn derivative_length_shrinks_by_delta() {
        let p = step_profile();
        assert_eq!(derivative(&p, 2).len(), p.len() - 2);
        assert_eq!(derivative(&p, 4).len(), p.len() - 4);
    }

    #[test]
    #[should_panic]
    fn odd_derivative_delta_is_rejected() {
        derivative(&step_profile(), 3);
    }

    #[test]
    fn step_edge_appears_at_the_midpoint() {
        let d = derivative(&step_profile(), 2);
        let peak = d.maximum().unwrap();
        // step sits between -1 and 0; midpoint coordinates put it at -1 or 0
        assert!(peak.coordinate.abs() <= 1.0);
        assert_relative_eq!(peak.value, 1.0);
    }

    #[test]
    fn left_max_and_right_min_bracket_a_plateau() {
        // ramp up before center, ramp down after: the derivative has a
        // unique positive peak left of zero and negative peak right of it
        let coordinates: Vec<f64> = (-6..=6).map(|i| i as f64).collect();
        let values = coordinates
            .iter()
            .map(|&c| match c.abs() {
                a if a <= 2.0 => 10.0,
                a if a <= 3.0 => 5.0,
                _ => 0.0,
            })
            .collect();
        let d = derivative(
            &Profile {
                coordinates,
                values,
            },
            2,
        );
        let left = d.maximum_left_of_center().unwrap();
        let right = d.minimum_right_of_center().unwrap();
        assert_relative_eq!(left.coordinate, -3.0);
        assert_relative_eq!(right.coordinate, 3.0);
        assert_relative_eq!(right.coordinate - left.coordinate, 6.0);
    }

    #[test]
    fn tied_edge_extrema_resolve_away_from_center() {
        // a linear ramp across a wide plateau yields runs of equal
        // derivative values on both flanks; the edge must be read at the
        // outer end of each run or the bracketed extent shrinks
        let coordinates: Vec<f64> = (-6..=6).map(|i| i as f64).collect();
        let values = coordinates
            .iter()
            .map(|&c| (4.0 - c.abs()).clamp(0.0, 3.0))
            .collect();
        let d = derivative(
            &Profile {
                coordinates,
                values,
            },
            2,
        );
        let left = d.maximum_left_of_center().unwrap();
        let right = d.minimum_right_of_center().unwrap();
        assert_relative_eq!(left.coordinate, -3.0);
        assert_relative_eq!(right.coordinate, 3.0);
    }

    #[test]
    fn average_profile_of_centered_bar() {
        let mut v = Volume::filled([7, 7, 9], [-3, -3, -4], 0.5, 0.0);
        for z in -1..=1 {
            v.set([0, 0, z], 8.0);
        }
        let p = average_along_z(&v, 0.5, 10.0);
        assert_eq!(p.len(), 9);
        let peak = p.maximum().unwrap();
        assert_relative_eq!(peak.value, 8.0);
        assert!(peak.coordinate.abs() <= 0.5);
    }

    #[test]
    fn radial_average_of_disk_decays_with_radius() {
        let mut plane = Plane::filled([21, 21], [-10, -10], 1.0, 0.0);
        for p in plane.positions().collect::<Vec<_>>() {
            if p[0] * p[0] + p[1] * p[1] <= 9 {
                plane.set(p, 5.0);
            }
        }
        let profile = radial_average(&plane, 8.0);
        assert_relative_eq!(profile.values[0], 5.0);
        assert!(profile.values.last().unwrap() < &1.0);
    }
}
