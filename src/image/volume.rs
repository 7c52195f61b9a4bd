//! Dense 3D containers used throughout the pipeline.
//!
//! All containers address voxels by *global* coordinates: the voxel grid has
//! an integer offset (origin), so after the alignment stages the coordinate
//! (0, 0, 0) is the structure center and coordinates are negative on one
//! side. Data is stored x-fastest.

/// Raw anisotropic input channel as delivered by the (excluded) I/O layer.
/// The grid origin is always zero; calibration is per axis.
#[derive(Debug, Clone)]
pub struct ChannelStack {
    pub dims: [usize; 3],
    pub voxel_size: [f64; 3],
    pub data: Vec<f64>,
}

impl ChannelStack {
    pub fn new(dims: [usize; 3], voxel_size: [f64; 3], data: Vec<f64>) -> Self {
        assert_eq!(data.len(), dims[0] * dims[1] * dims[2]);
        Self {
            dims,
            voxel_size,
            data,
        }
    }
}

/// Raw binary mask sharing the physical space of the input channels.
#[derive(Debug, Clone)]
pub struct MaskStack {
    pub dims: [usize; 3],
    pub voxel_size: [f64; 3],
    pub data: Vec<bool>,
}

/// Isotropic working volume. Immutable once produced by a stage.
#[derive(Debug, Clone)]
pub struct Volume {
    dims: [usize; 3],
    offset: [i64; 3],
    voxel_size: f64,
    data: Vec<f64>,
}

impl Volume {
    pub fn filled(dims: [usize; 3], offset: [i64; 3], voxel_size: f64, value: f64) -> Self {
        Self {
            dims,
            offset,
            voxel_size,
            data: vec![value; dims[0] * dims[1] * dims[2]],
        }
    }

    pub fn from_data(
        dims: [usize; 3],
        offset: [i64; 3],
        voxel_size: f64,
        data: Vec<f64>,
    ) -> Self {
        assert_eq!(data.len(), dims[0] * dims[1] * dims[2]);
        Self {
            dims,
            offset,
            voxel_size,
            data,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Inclusive minimum of the global coordinate range.
    pub fn min(&self) -> [i64; 3] {
        self.offset
    }

    /// Inclusive maximum of the global coordinate range.
    pub fn max(&self) -> [i64; 3] {
        [
            self.offset[0] + self.dims[0] as i64 - 1,
            self.offset[1] + self.dims[1] as i64 - 1,
            self.offset[2] + self.dims[2] as i64 - 1,
        ]
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn contains(&self, p: [i64; 3]) -> bool {
        (0..3).all(|d| p[d] >= self.offset[d] && p[d] < self.offset[d] + self.dims[d] as i64)
    }

    #[inline]
    pub fn index_of(&self, p: [i64; 3]) -> usize {
        let x = (p[0] - self.offset[0]) as usize;
        let y = (p[1] - self.offset[1]) as usize;
        let z = (p[2] - self.offset[2]) as usize;
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    #[inline]
    pub fn get(&self, p: [i64; 3]) -> f64 {
        self.data[self.index_of(p)]
    }

    #[inline]
    pub fn set(&mut self, p: [i64; 3], value: f64) {
        let i = self.index_of(p);
        self.data[i] = value;
    }

    /// Value at `p`, clamping out-of-range coordinates to the border voxel
    /// (the "extend border" boundary rule).
    pub fn get_clamped(&self, p: [i64; 3]) -> f64 {
        let mut q = p;
        for d in 0..3 {
            q[d] = q[d].clamp(self.offset[d], self.offset[d] + self.dims[d] as i64 - 1);
        }
        self.get(q)
    }

    /// Trilinear interpolation at a real-valued global position, border
    /// extended beyond the volume.
    pub fn sample_trilinear(&self, pos: [f64; 3]) -> f64 {
        let base = [
            pos[0].floor() as i64,
            pos[1].floor() as i64,
            pos[2].floor() as i64,
        ];
        let frac = [
            pos[0] - base[0] as f64,
            pos[1] - base[1] as f64,
            pos[2] - base[2] as f64,
        ];

        let mut value = 0.0;
        for corner in 0..8 {
            let dx = corner & 1;
            let dy = (corner >> 1) & 1;
            let dz = (corner >> 2) & 1;
            let weight = (if dx == 1 { frac[0] } else { 1.0 - frac[0] })
                * (if dy == 1 { frac[1] } else { 1.0 - frac[1] })
                * (if dz == 1 { frac[2] } else { 1.0 - frac[2] });
            if weight == 0.0 {
                continue;
            }
            value += weight
                * self.get_clamped([base[0] + dx as i64, base[1] + dy as i64, base[2] + dz as i64]);
        }
        value
    }

    /// Nearest-neighbor sample at a real-valued global position, border
    /// extended.
    pub fn sample_nearest(&self, pos: [f64; 3]) -> f64 {
        self.get_clamped([
            pos[0].round() as i64,
            pos[1].round() as i64,
            pos[2].round() as i64,
        ])
    }

    /// Iterates all global voxel coordinates, x fastest.
    pub fn positions(&self) -> impl Iterator<Item = [i64; 3]> + '_ {
        let min = self.min();
        let dims = self.dims;
        (0..dims[2] as i64).flat_map(move |z| {
            (0..dims[1] as i64).flat_map(move |y| {
                (0..dims[0] as i64).map(move |x| [min[0] + x, min[1] + y, min[2] + z])
            })
        })
    }
}

/// Binary mask with the same extent/offset semantics as [`Volume`].
#[derive(Debug, Clone)]
pub struct BinaryMask {
    dims: [usize; 3],
    offset: [i64; 3],
    voxel_size: f64,
    data: Vec<bool>,
}

impl BinaryMask {
    pub fn empty(dims: [usize; 3], offset: [i64; 3], voxel_size: f64) -> Self {
        Self {
            dims,
            offset,
            voxel_size,
            data: vec![false; dims[0] * dims[1] * dims[2]],
        }
    }

    pub fn from_data(
        dims: [usize; 3],
        offset: [i64; 3],
        voxel_size: f64,
        data: Vec<bool>,
    ) -> Self {
        assert_eq!(data.len(), dims[0] * dims[1] * dims[2]);
        Self {
            dims,
            offset,
            voxel_size,
            data,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn min(&self) -> [i64; 3] {
        self.offset
    }

    pub fn max(&self) -> [i64; 3] {
        [
            self.offset[0] + self.dims[0] as i64 - 1,
            self.offset[1] + self.dims[1] as i64 - 1,
            self.offset[2] + self.dims[2] as i64 - 1,
        ]
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [bool] {
        &mut self.data
    }

    pub fn contains(&self, p: [i64; 3]) -> bool {
        (0..3).all(|d| p[d] >= self.offset[d] && p[d] < self.offset[d] + self.dims[d] as i64)
    }

    #[inline]
    pub fn index_of(&self, p: [i64; 3]) -> usize {
        let x = (p[0] - self.offset[0]) as usize;
        let y = (p[1] - self.offset[1]) as usize;
        let z = (p[2] - self.offset[2]) as usize;
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    #[inline]
    pub fn get(&self, p: [i64; 3]) -> bool {
        self.data[self.index_of(p)]
    }

    /// Out-of-range coordinates read as background.
    #[inline]
    pub fn get_zero(&self, p: [i64; 3]) -> bool {
        self.contains(p) && self.get(p)
    }

    #[inline]
    pub fn set(&mut self, p: [i64; 3], value: bool) {
        let i = self.index_of(p);
        self.data[i] = value;
    }

    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn positions(&self) -> impl Iterator<Item = [i64; 3]> + '_ {
        let min = self.min();
        let dims = self.dims;
        (0..dims[2] as i64).flat_map(move |z| {
            (0..dims[1] as i64).flat_map(move |y| {
                (0..dims[0] as i64).map(move |x| [min[0] + x, min[1] + y, min[2] + z])
            })
        })
    }

    /// Foreground voxel coordinates.
    pub fn foreground(&self) -> impl Iterator<Item = [i64; 3]> + '_ {
        self.positions().filter(|&p| self.get(p))
    }
}

/// 2D scalar plane produced by axial projection.
#[derive(Debug, Clone)]
pub struct Plane {
    dims: [usize; 2],
    offset: [i64; 2],
    voxel_size: f64,
    data: Vec<f64>,
}

impl Plane {
    pub fn filled(dims: [usize; 2], offset: [i64; 2], voxel_size: f64, value: f64) -> Self {
        Self {
            dims,
            offset,
            voxel_size,
            data: vec![value; dims[0] * dims[1]],
        }
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn min(&self) -> [i64; 2] {
        self.offset
    }

    pub fn max(&self) -> [i64; 2] {
        [
            self.offset[0] + self.dims[0] as i64 - 1,
            self.offset[1] + self.dims[1] as i64 - 1,
        ]
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    #[inline]
    pub fn index_of(&self, p: [i64; 2]) -> usize {
        let x = (p[0] - self.offset[0]) as usize;
        let y = (p[1] - self.offset[1]) as usize;
        y * self.dims[0] + x
    }

    #[inline]
    pub fn get(&self, p: [i64; 2]) -> f64 {
        self.data[self.index_of(p)]
    }

    #[inline]
    pub fn set(&mut self, p: [i64; 2], value: f64) {
        let i = self.index_of(p);
        self.data[i] = value;
    }

    pub fn positions(&self) -> impl Iterator<Item = [i64; 2]> + '_ {
        let min = self.min();
        let dims = self.dims;
        (0..dims[1] as i64)
            .flat_map(move |y| (0..dims[0] as i64).map(move |x| [min[0] + x, min[1] + y]))
    }
}

/// 2D binary plane (projected mask).
#[derive(Debug, Clone)]
pub struct BinaryPlane {
    dims: [usize; 2],
    offset: [i64; 2],
    voxel_size: f64,
    data: Vec<bool>,
}

impl BinaryPlane {
    pub fn empty(dims: [usize; 2], offset: [i64; 2], voxel_size: f64) -> Self {
        Self {
            dims,
            offset,
            voxel_size,
            data: vec![false; dims[0] * dims[1]],
        }
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn min(&self) -> [i64; 2] {
        self.offset
    }

    pub fn max(&self) -> [i64; 2] {
        [
            self.offset[0] + self.dims[0] as i64 - 1,
            self.offset[1] + self.dims[1] as i64 - 1,
        ]
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    #[inline]
    pub fn index_of(&self, p: [i64; 2]) -> usize {
        let x = (p[0] - self.offset[0]) as usize;
        let y = (p[1] - self.offset[1]) as usize;
        y * self.dims[0] + x
    }

    #[inline]
    pub fn get(&self, p: [i64; 2]) -> bool {
        self.data[self.index_of(p)]
    }

    pub fn contains(&self, p: [i64; 2]) -> bool {
        (0..2).all(|d| p[d] >= self.offset[d] && p[d] < self.offset[d] + self.dims[d] as i64)
    }

    #[inline]
    pub fn get_zero(&self, p: [i64; 2]) -> bool {
        self.contains(p) && self.get(p)
    }

    #[inline]
    pub fn set(&mut self, p: [i64; 2], value: bool) {
        let i = self.index_of(p);
        self.data[i] = value;
    }

    pub fn positions(&self) -> impl Iterator<Item = [i64; 2]> + '_ {
        let min = self.min();
        let dims = self.dims;
        (0..dims[1] as i64)
            .flat_map(move |y| (0..dims[0] as i64).map(move |x| [min[0] + x, min[1] + y]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn offset_indexing_addresses_global_coordinates() {
        let mut v = Volume::filled([4, 4, 4], [-2, -2, -2], 1.0, 0.0);
        v.set([-2, -2, -2], 7.0);
        v.set([1, 1, 1], 3.0);
        assert_eq!(v.get([-2, -2, -2]), 7.0);
        assert_eq!(v.get([1, 1, 1]), 3.0);
        assert_eq!(v.min(), [-2, -2, -2]);
        assert_eq!(v.max(), [1, 1, 1]);
    }

    #[test]
    fn clamped_access_extends_border() {
        let mut v = Volume::filled([2, 2, 2], [0, 0, 0], 1.0, 1.0);
        v.set([1, 1, 1], 5.0);
        assert_eq!(v.get_clamped([10, 10, 10]), 5.0);
        assert_eq!(v.get_clamped([-5, 0, 0]), 1.0);
    }

    #[test]
    fn trilinear_interpolates_between_voxels() {
        let mut v = Volume::filled([2, 1, 1], [0, 0, 0], 1.0, 0.0);
        v.set([1, 0, 0], 10.0);
        assert_relative_eq!(v.sample_trilinear([0.5, 0.0, 0.0]), 5.0);
        assert_relative_eq!(v.sample_trilinear([0.25, 0.0, 0.0]), 2.5);
    }

    #[test]
    fn mask_zero_extension_reads_background() {
        let mut m = BinaryMask::empty([2, 2, 2], [0, 0, 0], 1.0);
        m.set([0, 0, 0], true);
        assert!(m.get_zero([0, 0, 0]));
        assert!(!m.get_zero([-1, 0, 0]));
        assert_eq!(m.count_foreground(), 1);
    }

    #[test]
    fn foreground_yields_set_positions() {
        let mut m = BinaryMask::empty([3, 3, 3], [-1, -1, -1], 1.0);
        m.set([0, 0, 0], true);
        m.set([1, 1, 1], true);
        let fg: Vec<_> = m.foreground().collect();
        assert_eq!(fg, vec![[0, 0, 0], [1, 1, 1]]);
    }
}
