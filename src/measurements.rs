use std::collections::BTreeMap;

use serde::Serialize;

pub const ANALYSIS_FINISHED: &str = "Analysis finished.";
pub const ANALYSIS_INTERRUPTED_LOW_DYNAMIC_DNA: &str =
    "Analysis interrupted: Too low dynamic range in DNA image";
pub const ANALYSIS_INTERRUPTED_LOW_DYNAMIC_TUBULIN: &str =
    "Analysis interrupted: Too low dynamic range in tubulin image";

// Key vocabulary of the exported record. Kept as constants so downstream
// table code and the tests agree on the exact spelling.
pub const SPINDLE_LENGTH: &str = "Spindle_Length_um";
pub const SPINDLE_WIDTH_AVG: &str = "Spindle_Width_Avg_um";
pub const SPINDLE_ANGLE_DEGREES: &str = "Spindle_Angle_Degrees";
pub const COMMENT: &str = "Comment";

/// A single exported value: every measurement is a scalar except the
/// version tag and the free-text comment.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    Number(f64),
    Text(String),
}

/// Append-only record of named scalar results, built up across the stages
/// of one pipeline run. Fields stay NaN until the stage that computes them
/// has run, so an aborted run exports exactly what was measured.
#[derive(Debug, Clone, Serialize)]
pub struct Measurements {
    pub version: String,
    pub dna_initial_threshold: f64,
    pub dna_volume_threshold: f64,
    pub metaphase_plate_width: f64,
    pub metaphase_plate_length: f64,
    pub chromatin_volume: f64,
    pub chromatin_dilation: f64,
    pub spindle_pole_a_refinement_distance: f64,
    pub spindle_pole_b_refinement_distance: f64,
    pub spindle_threshold: f64,
    pub spindle_snr: f64,
    pub spindle_intensity_variation: f64,
    pub spindle_sum_intensity_raw: f64,
    pub spindle_sum_intensity_corrected: f64,
    pub cell_tubulin_sum_intensity: f64,
    pub spindle_volume: f64,
    pub spindle_length: f64,
    pub spindle_width_min: f64,
    pub spindle_width_max: f64,
    pub spindle_width_avg: f64,
    pub spindle_aspect_ratio: f64,
    pub spindle_center_to_plate_center_distance: f64,
    pub spindle_angle: f64,
    pub cell_volume: f64,
    pub comment: String,
}

impl Measurements {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            dna_initial_threshold: f64::NAN,
            dna_volume_threshold: f64::NAN,
            metaphase_plate_width: f64::NAN,
            metaphase_plate_length: f64::NAN,
            chromatin_volume: f64::NAN,
            chromatin_dilation: f64::NAN,
            spindle_pole_a_refinement_distance: f64::NAN,
            spindle_pole_b_refinement_distance: f64::NAN,
            spindle_threshold: f64::NAN,
            spindle_snr: f64::NAN,
            spindle_intensity_variation: f64::NAN,
            spindle_sum_intensity_raw: f64::NAN,
            spindle_sum_intensity_corrected: f64::NAN,
            cell_tubulin_sum_intensity: f64::NAN,
            spindle_volume: f64::NAN,
            spindle_length: f64::NAN,
            spindle_width_min: f64::NAN,
            spindle_width_max: f64::NAN,
            spindle_width_avg: f64::NAN,
            spindle_aspect_ratio: f64::NAN,
            spindle_center_to_plate_center_distance: f64::NAN,
            spindle_angle: f64::NAN,
            cell_volume: f64::NAN,
            comment: String::new(),
        }
    }

    /// Flat name -> value map with the versioned key vocabulary, for the
    /// excluded reporting layer.
    pub fn to_map(&self) -> BTreeMap<String, MeasurementValue> {
        use MeasurementValue::{Number, Text};

        let mut map = BTreeMap::new();
        let mut num = |name: &str, value: f64| {
            map.insert(name.to_string(), Number(value));
        };

        num("DNA_Initial_Threshold", self.dna_initial_threshold);
        num("DNA_Volume_Threshold", self.dna_volume_threshold);
        num("MetaphasePlate_Width_um", self.metaphase_plate_width);
        num("MetaphasePlate_Length_um", self.metaphase_plate_length);
        num("Chromatin_Volume_um3", self.chromatin_volume);
        num("Chromatin_Dilation", self.chromatin_dilation);
        num(
            "Spindle_Pole_Refinement_Distance_PoleA_um",
            self.spindle_pole_a_refinement_distance,
        );
        num(
            "Spindle_Pole_Refinement_Distance_PoleB_um",
            self.spindle_pole_b_refinement_distance,
        );
        num("Tubulin_Spindle_Intensity_Threshold", self.spindle_threshold);
        num(
            "Tubulin_Spindle_Intensity_Variation",
            self.spindle_intensity_variation,
        );
        num("Tubulin_Spindle_Sum_Intensity_Raw", self.spindle_sum_intensity_raw);
        num(
            "Tubulin_Spindle_Sum_Intensity_Corrected",
            self.spindle_sum_intensity_corrected,
        );
        num("Tubulin_Cellular_Sum_Intensity", self.cell_tubulin_sum_intensity);
        num("Spindle_SNR", self.spindle_snr);
        num("Spindle_Volume_um3", self.spindle_volume);
        num(SPINDLE_LENGTH, self.spindle_length);
        num("Spindle_Width_Min_um", self.spindle_width_min);
        num("Spindle_Width_Max_um", self.spindle_width_max);
        num(SPINDLE_WIDTH_AVG, self.spindle_width_avg);
        num("Spindle_Aspect_Ratio", self.spindle_aspect_ratio);
        num(
            "Spindle_Center_To_MetaphasePlate_Center_Distance_um",
            self.spindle_center_to_plate_center_distance,
        );
        num(SPINDLE_ANGLE_DEGREES, self.spindle_angle);
        num("Cell_Volume_um3", self.cell_volume);
        map.insert("Version".to_string(), Text(self.version.clone()));
        map.insert(COMMENT.to_string(), Text(self.comment.clone()));
        map
    }

    pub fn to_json(&self) -> String {
        // NaN fields serialize as null, which is what the reporting layer
        // expects for measurements a failed run never reached.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_all_nan() {
        let m = Measurements::new("test");
        assert!(m.spindle_length.is_nan());
        assert!(m.chromatin_volume.is_nan());
        assert!(m.comment.is_empty());
    }

    #[test]
    fn map_contains_versioned_keys() {
        let mut m = Measurements::new("test");
        m.spindle_length = 11.5;
        let map = m.to_map();
        assert_eq!(
            map.get(SPINDLE_LENGTH),
            Some(&MeasurementValue::Number(11.5))
        );
        assert!(map.contains_key(SPINDLE_ANGLE_DEGREES));
        assert!(map.contains_key("Chromatin_Volume_um3"));
        assert_eq!(
            map.get("Version"),
            Some(&MeasurementValue::Text("test".to_string()))
        );
    }

    #[test]
    fn json_round_trips_through_serde() {
        let m = Measurements::new("test");
        let json = m.to_json();
        assert!(json.contains("spindle_length"));
    }
}
