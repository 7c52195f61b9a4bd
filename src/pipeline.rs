//! The measurement pipeline: strictly sequential stages from two raw
//! channels to a populated measurement record, with a typed outcome for
//! expected aborts and error propagation for faults.

use anyhow::Context;
use log::{debug, info};
use nalgebra::{Point3, Vector3};

use crate::analysis::ellipsoid::{fit_ellipsoid, shortest_axis_alignment};
use crate::analysis::mask::{
    build_mask, keep_central_regions, threshold_to_mask, BorderCheck,
};
use crate::analysis::measure::{
    center_to_center_distance, coefficient_of_variation, masked_sum, masked_values,
    measure_plate_length, measure_plate_width, measure_spindle_threshold,
    measure_spindle_widths, measure_volume, spindle_axis_angle, PlateMeasurement,
};
use crate::analysis::poles::{locate_poles, refine_poles};
use crate::analysis::threshold::{estimate_initial_threshold, otsu};
use crate::analysis::PipelineError;
use crate::image::resample::{resample_isotropic, resample_mask_isotropic};
use crate::image::transform::{
    rotation_onto, transform_mask, transform_volume, Interpolation, RigidTransform3,
};
use crate::image::volume::{BinaryMask, ChannelStack, MaskStack, Volume};
use crate::measurements::{
    Measurements, ANALYSIS_FINISHED, ANALYSIS_INTERRUPTED_LOW_DYNAMIC_DNA,
    ANALYSIS_INTERRUPTED_LOW_DYNAMIC_TUBULIN,
};
use crate::settings::Settings;

const VERSION: &str = concat!("spindlemetry-", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Dna,
    Tubulin,
}

/// Expected terminal states of a run. Faults are not outcomes; they travel
/// the error channel and surface as the report's status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    LowDynamicRange(Channel),
}

/// Raw input handed over by the excluded I/O layer: two co-registered
/// channels and an optional cell mask sharing their physical space.
pub struct AnalysisInput {
    pub dna: ChannelStack,
    pub tubulin: ChannelStack,
    pub cell_mask: Option<MaskStack>,
}

/// Pole-frame volumes and masks, kept only when requested in the settings.
pub struct AlignedVolumes {
    pub dna: Volume,
    pub tubulin: Volume,
    pub chromatin_mask: BinaryMask,
    pub spindle_mask: BinaryMask,
}

pub struct AnalysisReport {
    pub measurements: Measurements,
    pub status: String,
    pub outcome: Option<Outcome>,
    pub aligned: Option<AlignedVolumes>,
}

pub struct SpindleAnalysis {
    settings: Settings,
}

impl SpindleAnalysis {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Runs the full pipeline. Never returns an error: faults are caught,
    /// their message is appended to the record's comment, and the message
    /// doubles as the status string. Partial measurements stay in the
    /// record.
    pub fn run(&self, input: &AnalysisInput) -> AnalysisReport {
        let mut measurements = Measurements::new(VERSION);
        match self.measure(input, &mut measurements) {
            Ok((outcome, aligned)) => {
                let status = match outcome {
                    Outcome::Finished => ANALYSIS_FINISHED,
                    Outcome::LowDynamicRange(Channel::Dna) => {
                        ANALYSIS_INTERRUPTED_LOW_DYNAMIC_DNA
                    }
                    Outcome::LowDynamicRange(Channel::Tubulin) => {
                        ANALYSIS_INTERRUPTED_LOW_DYNAMIC_TUBULIN
                    }
                };
                info!("{status}");
                AnalysisReport {
                    measurements,
                    status: status.to_string(),
                    outcome: Some(outcome),
                    aligned,
                }
            }
            Err(error) => {
                let message = format!("{error:#}");
                info!("analysis failed: {message}");
                if !measurements.comment.is_empty() {
                    measurements.comment.push(' ');
                }
                measurements.comment.push_str(&message);
                AnalysisReport {
                    measurements,
                    status: message,
                    outcome: None,
                    aligned: None,
                }
            }
        }
    }

    fn measure(
        &self,
        input: &AnalysisInput,
        record: &mut Measurements,
    ) -> anyhow::Result<(Outcome, Option<AlignedVolumes>)> {
        let s = &self.settings;
        let voxel = s.voxel_size_for_analysis;

        info!("resampling channels to {voxel} um isotropic");
        let dna = resample_isotropic(&input.dna, voxel);
        let tubulin = resample_isotropic(&input.tubulin, voxel);
        let cell_mask = input
            .cell_mask
            .as_ref()
            .map(|m| resample_mask_isotropic(m, voxel));

        if let Some(mask) = &cell_mask {
            record.cell_volume = measure_volume(mask);
            record.cell_tubulin_sum_intensity = masked_sum(&tubulin, mask, 0.0);
        }

        let initial = estimate_initial_threshold(
            &dna,
            s.initial_threshold_factor,
            s.voxel_size_for_initial_threshold,
            cell_mask.as_ref(),
        );
        record.dna_initial_threshold = initial.value;
        if initial.dynamic_range < s.minimal_dynamic_range {
            debug!(
                "dna dynamic range {:.1} below the required {:.1}",
                initial.dynamic_range, s.minimal_dynamic_range
            );
            return Ok((Outcome::LowDynamicRange(Channel::Dna), None));
        }

        let initial_chromatin = build_mask(
            &dna,
            initial.value,
            BorderCheck::LateralOnly,
            "chromatin",
        )
        .context("initial chromatin segmentation")?;

        info!("aligning the chromatin plate");
        let fit = fit_ellipsoid(&initial_chromatin)?;
        let plate_alignment = shortest_axis_alignment(&fit);
        let dna = transform_volume(&dna, &plate_alignment, Interpolation::Nearest);
        let tubulin = transform_volume(&tubulin, &plate_alignment, Interpolation::Nearest);

        let plate_width = measure_plate_width(
            &dna,
            s.max_metaphase_plate_length,
            s.max_metaphase_plate_width,
            s.derivative_delta_voxels(s.plate_width_derivative_delta),
        );
        record.metaphase_plate_width = plate_width;

        let plate = measure_plate_length(
            &dna,
            plate_width,
            s.max_metaphase_plate_length,
            s.derivative_delta_voxels(s.plate_length_derivative_delta),
        );
        record.metaphase_plate_length = plate.length;
        record.chromatin_dilation = plate.dilation;
        info!(
            "metaphase plate {:.2} x {:.2} um",
            plate.length, plate_width
        );

        let dna_threshold = self.chromatin_volume_threshold(&dna, &plate)?;
        record.dna_volume_threshold = dna_threshold;

        let chromatin_mask = build_mask(&dna, dna_threshold, BorderCheck::AllAxes, "chromatin")
            .context("final chromatin segmentation")?;
        record.chromatin_volume = measure_volume(&chromatin_mask);

        let spindle_threshold =
            measure_spindle_threshold(&tubulin, &chromatin_mask, plate.length, plate_width)?;
        record.spindle_threshold = spindle_threshold.value;
        record.spindle_snr = spindle_threshold.snr;
        if spindle_threshold.value < s.minimal_dynamic_range {
            debug!(
                "tubulin threshold {:.1} below the required {:.1}",
                spindle_threshold.value, s.minimal_dynamic_range
            );
            return Ok((Outcome::LowDynamicRange(Channel::Tubulin), None));
        }

        info!("segmenting the spindle");
        let thresholded = threshold_to_mask(&tubulin, spindle_threshold.value);
        let spindle_mask =
            keep_central_regions(&thresholded, s.spindle_fragment_inclusion_zone / voxel);

        let provisional = locate_poles(&spindle_mask, plate.length / 2.0);
        let poles = refine_poles(
            &tubulin,
            &spindle_mask,
            &provisional,
            s.lateral_pole_refinement_radius,
            s.axial_pole_refinement_radius,
        )?;
        record.spindle_pole_a_refinement_distance = (poles.a - provisional.a).norm();
        record.spindle_pole_b_refinement_distance = (poles.b - provisional.b).norm();
        record.spindle_length = poles.axial_distance();
        info!("spindle length {:.2} um", record.spindle_length);

        // plate center sits at the origin after the first alignment
        let midpoint = Point3::from((poles.a.coords + poles.b.coords) / 2.0);
        record.spindle_center_to_plate_center_distance =
            center_to_center_distance(Point3::origin(), midpoint);
        record.spindle_angle = spindle_axis_angle(poles.a, poles.b, &plate_alignment, voxel);

        let pole_axis = (poles.b - poles.a).normalize();
        let pole_alignment = RigidTransform3::centered_rotation(
            rotation_onto(Vector3::z(), pole_axis),
            midpoint / voxel,
        );
        let tubulin = transform_volume(&tubulin, &pole_alignment, Interpolation::Trilinear);
        let spindle_mask = transform_mask(&spindle_mask, &pole_alignment);
        record.spindle_volume = measure_volume(&spindle_mask);

        let widths = measure_spindle_widths(&spindle_mask);
        record.spindle_width_min = widths.min;
        record.spindle_width_max = widths.max;
        record.spindle_width_avg = widths.avg;
        record.spindle_aspect_ratio = record.spindle_length / widths.avg;

        let spindle_intensities = masked_values(&tubulin, &spindle_mask);
        if !spindle_intensities.is_empty() {
            record.spindle_intensity_variation =
                coefficient_of_variation(&spindle_intensities, spindle_threshold.value);
            record.spindle_sum_intensity_raw = spindle_intensities.iter().sum();
            record.spindle_sum_intensity_corrected = masked_sum(
                &tubulin,
                &spindle_mask,
                spindle_threshold.value,
            );
        }

        let aligned = if s.keep_aligned_volumes {
            Some(AlignedVolumes {
                dna: transform_volume(&dna, &pole_alignment, Interpolation::Trilinear),
                tubulin,
                chromatin_mask: transform_mask(&chromatin_mask, &pole_alignment),
                spindle_mask,
            })
        } else {
            None
        };

        Ok((Outcome::Finished, aligned))
    }

    /// Otsu threshold of the chromatin channel inside a box sized from the
    /// measured plate: half the plate length laterally, the full plate
    /// width axially so the box reaches past both chromatin faces.
    fn chromatin_volume_threshold(
        &self,
        dna: &Volume,
        plate: &PlateMeasurement,
    ) -> Result<f64, PipelineError> {
        let s = &self.settings;
        let lateral_half = s.to_voxels(plate.length / 2.0);
        let axial_half = s.to_voxels(plate.width);

        let mut values = Vec::new();
        for p in dna.positions() {
            if p[0].abs() <= lateral_half && p[1].abs() <= lateral_half && p[2].abs() <= axial_half
            {
                values.push(dna.get(p));
            }
        }
        let threshold = otsu(&values);
        if threshold.is_nan() {
            return Err(PipelineError::ThresholdWasNan);
        }
        debug!("chromatin volume threshold {threshold:.2}");
        Ok(threshold)
    }
}
