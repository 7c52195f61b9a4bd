use serde::Deserialize;

/// Immutable configuration snapshot supplied once at pipeline start.
///
/// All spatial quantities are micrometers, all voxel sizes are isotropic
/// target sizes. Every stage reads the same snapshot; nothing is mutated
/// during a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Isotropic voxel size of the analysis grid.
    pub voxel_size_for_analysis: f64,
    /// Coarser isotropic voxel size used only for dynamic-range estimation.
    pub voxel_size_for_initial_threshold: f64,
    /// Fraction of the dynamic range used for the initial DNA threshold.
    pub initial_threshold_factor: f64,
    /// Minimal dynamic range (gray values) for a channel to count as signal.
    pub minimal_dynamic_range: f64,
    /// Upper bound for the lateral extent of the metaphase plate.
    pub max_metaphase_plate_length: f64,
    /// Upper bound for the axial extent of the metaphase plate.
    pub max_metaphase_plate_width: f64,
    /// Half-window of the derivative used for the plate width profile.
    pub plate_width_derivative_delta: f64,
    /// Half-window of the derivative used for the plate length profile.
    pub plate_length_derivative_delta: f64,
    /// Pole refinement search radius along the spindle axis.
    pub axial_pole_refinement_radius: f64,
    /// Pole refinement search radius perpendicular to the spindle axis.
    pub lateral_pole_refinement_radius: f64,
    /// Spindle fragments with a voxel closer than this to the plate center
    /// are kept as part of the spindle mask.
    pub spindle_fragment_inclusion_zone: f64,
    /// Keep the spindle-aligned volumes and masks in the analysis report.
    pub keep_aligned_volumes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voxel_size_for_analysis: 0.25,
            voxel_size_for_initial_threshold: 1.5,
            initial_threshold_factor: 0.5,
            minimal_dynamic_range: 7.0,
            max_metaphase_plate_length: 12.0,
            max_metaphase_plate_width: 6.0,
            plate_width_derivative_delta: 1.0,
            plate_length_derivative_delta: 3.0,
            axial_pole_refinement_radius: 1.0,
            lateral_pole_refinement_radius: 2.0,
            spindle_fragment_inclusion_zone: 3.0,
            keep_aligned_volumes: false,
        }
    }
}

impl Settings {
    /// Parses settings from a TOML snippet; unset keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Converts a calibrated length into a whole number of analysis voxels,
    /// truncating like the voxel grid does.
    pub fn to_voxels(&self, micrometer: f64) -> i64 {
        (micrometer / self.voxel_size_for_analysis) as i64
    }

    /// Derivative half-window in voxels, rounded up to the next even count
    /// so the symmetric difference stays centered.
    pub fn derivative_delta_voxels(&self, delta: f64) -> usize {
        let di = (delta / self.voxel_size_for_analysis).ceil() as usize;
        di + di % 2
    }
}
