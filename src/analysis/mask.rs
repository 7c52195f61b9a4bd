//! Binary morphology on 3D masks and projected 2D planes: thresholding,
//! hole filling, connected components, border rejection, dilation and the
//! composite mask builder used for the chromatin segmentation.

use std::collections::VecDeque;

use log::debug;

use crate::analysis::PipelineError;
use crate::image::volume::{BinaryMask, BinaryPlane, Plane, Volume};

/// Neighborhood used for connected-component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Face neighbors only.
    Six,
    /// Faces, edges and corners.
    TwentySix,
}

/// Which borders disqualify a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderCheck {
    /// x and y borders only; structures may touch the first or last slice
    /// because axial coverage of a cell is often incomplete.
    LateralOnly,
    /// All six faces.
    AllAxes,
}

const OFFSETS_6: [[i64; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

fn offsets_26() -> Vec<[i64; 3]> {
    let mut offsets = Vec::with_capacity(26);
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 || dz != 0 {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

fn neighbor_offsets(connectivity: Connectivity) -> Vec<[i64; 3]> {
    match connectivity {
        Connectivity::Six => OFFSETS_6.to_vec(),
        Connectivity::TwentySix => offsets_26(),
    }
}

pub fn threshold_to_mask(volume: &Volume, threshold: f64) -> BinaryMask {
    let mut mask = BinaryMask::empty(volume.dims(), volume.min(), volume.voxel_size());
    for (out, &v) in mask.data_mut().iter_mut().zip(volume.data()) {
        *out = v > threshold;
    }
    mask
}

/// A labeled connected region.
#[derive(Debug, Clone)]
pub struct Region {
    pub voxels: Vec<[i64; 3]>,
}

impl Region {
    pub fn touches_border(&self, mask: &BinaryMask, check: BorderCheck) -> bool {
        let min = mask.min();
        let max = mask.max();
        let axes: &[usize] = match check {
            BorderCheck::LateralOnly => &[0, 1],
            BorderCheck::AllAxes => &[0, 1, 2],
        };
        self.voxels
            .iter()
            .any(|p| axes.iter().any(|&d| p[d] == min[d] || p[d] == max[d]))
    }
}

/// BFS connected components over the foreground.
pub fn label_components(mask: &BinaryMask, connectivity: Connectivity) -> Vec<Region> {
    let offsets = neighbor_offsets(connectivity);
    let mut visited = vec![false; mask.data().len()];
    let mut regions = Vec::new();

    for seed in mask.positions() {
        let seed_index = mask.index_of(seed);
        if visited[seed_index] || !mask.get(seed) {
            continue;
        }
        let mut voxels = Vec::new();
        let mut queue = VecDeque::from([seed]);
        visited[seed_index] = true;
        while let Some(p) = queue.pop_front() {
            voxels.push(p);
            for o in &offsets {
                let q = [p[0] + o[0], p[1] + o[1], p[2] + o[2]];
                if !mask.get_zero(q) {
                    continue;
                }
                let qi = mask.index_of(q);
                if !visited[qi] {
                    visited[qi] = true;
                    queue.push_back(q);
                }
            }
        }
        regions.push(Region { voxels });
    }
    regions
}

/// Fills background cavities that are not 6-connected to the mask border.
pub fn fill_holes(mask: &BinaryMask) -> BinaryMask {
    let min = mask.min();
    let max = mask.max();

    // flood the outside background from every border voxel
    let mut outside = vec![false; mask.data().len()];
    let mut queue = VecDeque::new();
    for p in mask.positions() {
        let on_border = (0..3).any(|d| p[d] == min[d] || p[d] == max[d]);
        if on_border && !mask.get(p) {
            let i = mask.index_of(p);
            if !outside[i] {
                outside[i] = true;
                queue.push_back(p);
            }
        }
    }
    while let Some(p) = queue.pop_front() {
        for o in &OFFSETS_6 {
            let q = [p[0] + o[0], p[1] + o[1], p[2] + o[2]];
            if !mask.contains(q) || mask.get(q) {
                continue;
            }
            let qi = mask.index_of(q);
            if !outside[qi] {
                outside[qi] = true;
                queue.push_back(q);
            }
        }
    }

    let mut filled = mask.clone();
    for p in mask.positions() {
        if !outside[mask.index_of(p)] {
            filled.set(p, true);
        }
    }
    filled
}

/// Removes 26-connected regions touching the checked borders; returns the
/// cleaned mask and the number of surviving regions.
pub fn remove_border_regions(mask: &BinaryMask, check: BorderCheck) -> (BinaryMask, usize) {
    let regions = label_components(mask, Connectivity::TwentySix);
    let mut cleaned = BinaryMask::empty(mask.dims(), mask.min(), mask.voxel_size());
    let mut remaining = 0;
    for region in &regions {
        if region.touches_border(mask, check) {
            continue;
        }
        remaining += 1;
        for &p in &region.voxels {
            cleaned.set(p, true);
        }
    }
    debug!(
        "border rejection kept {} of {} regions",
        remaining,
        regions.len()
    );
    (cleaned, remaining)
}

/// Keeps only the largest 26-connected region.
pub fn keep_largest_region(mask: &BinaryMask) -> BinaryMask {
    let regions = label_components(mask, Connectivity::TwentySix);
    let mut out = BinaryMask::empty(mask.dims(), mask.min(), mask.voxel_size());
    if let Some(largest) = regions.iter().max_by_key(|r| r.voxels.len()) {
        for &p in &largest.voxels {
            out.set(p, true);
        }
    }
    out
}

/// Keeps 6-connected regions whose closest voxel lies within
/// `inclusion_radius_voxels` of the origin. Used to discard stray spindle
/// fragments far from the structure center.
pub fn keep_central_regions(mask: &BinaryMask, inclusion_radius_voxels: f64) -> BinaryMask {
    let regions = label_components(mask, Connectivity::Six);
    let limit_squared = inclusion_radius_voxels * inclusion_radius_voxels;
    let mut out = BinaryMask::empty(mask.dims(), mask.min(), mask.voxel_size());
    for region in &regions {
        let closest = region
            .voxels
            .iter()
            .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]) as f64)
            .fold(f64::INFINITY, f64::min);
        if closest <= limit_squared {
            for &p in &region.voxels {
                out.set(p, true);
            }
        }
    }
    out
}

/// Spherical dilation by `radius` voxels.
pub fn dilate(mask: &BinaryMask, radius: i64) -> BinaryMask {
    let mut ball = Vec::new();
    for dz in -radius..=radius {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy + dz * dz <= radius * radius {
                    ball.push([dx, dy, dz]);
                }
            }
        }
    }

    let mut out = BinaryMask::empty(mask.dims(), mask.min(), mask.voxel_size());
    for p in mask.foreground() {
        for o in &ball {
            let q = [p[0] + o[0], p[1] + o[1], p[2] + o[2]];
            if out.contains(q) {
                out.set(q, true);
            }
        }
    }
    out
}

/// Threshold, fill holes, drop border-touching regions, keep the largest.
/// The result is a single connected region by construction. Fails when the
/// border rejection removes every region.
pub fn build_mask(
    volume: &Volume,
    threshold: f64,
    check: BorderCheck,
    label: &'static str,
) -> Result<BinaryMask, PipelineError> {
    let thresholded = threshold_to_mask(volume, threshold);
    let filled = fill_holes(&thresholded);
    let (cleaned, remaining) = remove_border_regions(&filled, check);
    if remaining == 0 {
        return Err(PipelineError::AllRegionsTouchBorder { label });
    }
    Ok(keep_largest_region(&cleaned))
}

const DISK_OPEN_RADIUS: i64 = 2;

fn disk(radius: i64) -> Vec<[i64; 2]> {
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                offsets.push([dx, dy]);
            }
        }
    }
    offsets
}

/// Morphological opening (erosion then dilation) with a radius-2 disk,
/// removing thin protrusions from projected masks before width scanning.
pub fn open_plane(plane: &BinaryPlane) -> BinaryPlane {
    let structuring = disk(DISK_OPEN_RADIUS);

    let mut eroded = BinaryPlane::empty(plane.dims(), plane.min(), plane.voxel_size());
    for p in plane.positions() {
        if plane.get(p)
            && structuring
                .iter()
                .all(|o| plane.get_zero([p[0] + o[0], p[1] + o[1]]))
        {
            eroded.set(p, true);
        }
    }

    let mut opened = BinaryPlane::empty(plane.dims(), plane.min(), plane.voxel_size());
    for p in eroded.positions() {
        if eroded.get(p) {
            for o in &structuring {
                let q = [p[0] + o[0], p[1] + o[1]];
                if opened.contains(q) {
                    opened.set(q, true);
                }
            }
        }
    }
    opened
}

/// Maximum projection of an intensity volume along z, restricted to the
/// slices within `z_range` (inclusive, global coordinates).
pub fn max_project_z(volume: &Volume, z_range: [i64; 2]) -> Plane {
    let min = volume.min();
    let max = volume.max();
    let lo = z_range[0].max(min[2]);
    let hi = z_range[1].min(max[2]);

    let mut plane = Plane::filled(
        [volume.dims()[0], volume.dims()[1]],
        [min[0], min[1]],
        volume.voxel_size(),
        f64::NEG_INFINITY,
    );
    for z in lo..=hi {
        for y in min[1]..=max[1] {
            for x in min[0]..=max[0] {
                let v = volume.get([x, y, z]);
                if v > plane.get([x, y]) {
                    plane.set([x, y], v);
                }
            }
        }
    }
    plane
}

/// Maximum projection of a mask along its full z extent.
pub fn max_project_mask_z(mask: &BinaryMask) -> BinaryPlane {
    let min = mask.min();
    let mut plane = BinaryPlane::empty(
        [mask.dims()[0], mask.dims()[1]],
        [min[0], min[1]],
        mask.voxel_size(),
    );
    for p in mask.foreground() {
        plane.set([p[0], p[1]], true);
    }
    plane
}
