//! Scalar measurements taken on aligned volumes and masks: compartment
//! volumes, width scans, the spindle intensity threshold with its
//! signal-to-noise ratio, intensity statistics and the axis angle.

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::analysis::mask::{dilate, max_project_mask_z, max_project_z, open_plane};
use crate::analysis::profile::{average_along_z, derivative, radial_average};
use crate::analysis::threshold::otsu;
use crate::analysis::PipelineError;
use crate::image::transform::RigidTransform3;
use crate::image::volume::{BinaryMask, BinaryPlane, Volume};

/// Foreground volume in calibrated units cubed.
pub fn measure_volume(mask: &BinaryMask) -> f64 {
    mask.count_foreground() as f64 * mask.voxel_size().powi(3)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn standard_deviation(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let m = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    median(&deviations)
}

/// Relative intensity variation above a baseline,
/// `sdev / (mean - offset)`.
pub fn coefficient_of_variation(values: &[f64], offset: f64) -> f64 {
    standard_deviation(values) / (mean(values) - offset)
}

/// Sum of masked intensities with `offset` subtracted per voxel.
pub fn masked_sum(volume: &Volume, mask: &BinaryMask, offset: f64) -> f64 {
    mask.foreground().map(|p| volume.get(p) - offset).sum()
}

pub fn masked_values(volume: &Volume, mask: &BinaryMask) -> Vec<f64> {
    mask.foreground().map(|p| volume.get(p)).collect()
}

/// Metaphase plate extents measured on the chromatin-aligned DNA channel,
/// together with the dilation of the radial intensity profile.
#[derive(Debug, Clone, Copy)]
pub struct PlateMeasurement {
    pub width: f64,
    pub length: f64,
    pub dilation: f64,
}

/// Axial plate width: the distance between the rising edge below the plate
/// center and the falling edge above it, on the derivative of the average
/// intensity profile along z.
pub fn measure_plate_width(
    dna: &Volume,
    max_plate_length: f64,
    max_plate_width: f64,
    derivative_delta: usize,
) -> f64 {
    let lateral_radius = max_plate_length / 2.0 / dna.voxel_size();
    let profile = average_along_z(dna, lateral_radius, max_plate_width / 2.0);
    let edges = derivative(&profile, derivative_delta);

    match (
        edges.maximum_left_of_center(),
        edges.minimum_right_of_center(),
    ) {
        (Some(left), Some(right)) => right.coordinate - left.coordinate,
        _ => f64::NAN,
    }
}

/// Lateral plate length and chromatin dilation from the radial intensity
/// profile of the z projection through the plate.
///
/// The length is twice the radius of the steepest intensity drop. The
/// dilation, `1 - center / max`, is zero for a solid plate and approaches
/// one for a ring of chromatin around a depleted center.
pub fn measure_plate_length(
    dna: &Volume,
    plate_width: f64,
    max_plate_length: f64,
    derivative_delta: usize,
) -> PlateMeasurement {
    let half_width_voxels = (plate_width / 2.0 / dna.voxel_size()) as i64;
    let projected = max_project_z(dna, [-half_width_voxels, half_width_voxels]);
    let radial = radial_average(&projected, max_plate_length / 2.0);

    let length = derivative(&radial, derivative_delta)
        .minimum()
        .map(|p| 2.0 * p.coordinate)
        .unwrap_or(f64::NAN);

    let peak = radial
        .values
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let dilation = if peak > 0.0 {
        1.0 - radial.values[0] / peak
    } else {
        f64::NAN
    };

    PlateMeasurement {
        width: plate_width,
        length,
        dilation,
    }
}

/// Width extrema of an axially projected structure.
#[derive(Debug, Clone, Copy)]
pub struct WidthScan {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

const WIDTH_SCAN_STEP_DEGREES: f64 = 10.0;

/// Measures the projected extent along lines through the origin at
/// 10-degree steps over a half turn, counting foreground pixels on each
/// line. Opposite directions measure the same chord, hence the half turn.
pub fn scan_widths(plane: &BinaryPlane) -> WidthScan {
    let voxel_size = plane.voxel_size();
    let dims = plane.dims();
    let reach = (dims[0].max(dims[1])) as i64;

    let mut widths = Vec::new();
    let mut angle: f64 = 0.0;
    while angle < 180.0 {
        let (sin, cos) = angle.to_radians().sin_cos();
        let mut count = 0usize;
        for t in -reach..=reach {
            let p = [
                (t as f64 * cos).round() as i64,
                (t as f64 * sin).round() as i64,
            ];
            if plane.get_zero(p) {
                count += 1;
            }
        }
        widths.push(count as f64 * voxel_size);
        angle += WIDTH_SCAN_STEP_DEGREES;
    }

    WidthScan {
        min: widths.iter().cloned().fold(f64::INFINITY, f64::min),
        max: widths.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        avg: mean(&widths),
    }
}

/// Spindle width scan: project the pole-aligned spindle mask along z, open
/// it to drop astral microtubule spurs, then scan.
pub fn measure_spindle_widths(spindle_mask: &BinaryMask) -> WidthScan {
    let projected = max_project_mask_z(spindle_mask);
    let opened = open_plane(&projected);
    let widths = scan_widths(&opened);
    debug!(
        "spindle widths min {:.2} max {:.2} avg {:.2} um",
        widths.min, widths.max, widths.avg
    );
    widths
}

#[derive(Debug, Clone, Copy)]
pub struct SpindleThreshold {
    pub value: f64,
    pub snr: f64,
}

const PERIPHERY_MARGIN_UM: f64 = 2.0;
const PERIPHERY_DILATION_VOXELS: i64 = 1;

/// Estimates the tubulin threshold from the chromatin periphery.
///
/// The one-voxel shell around the chromatin mask, clipped to a box sized by
/// the metaphase plate, contains both spindle (near the axis) and
/// cytoplasm (beyond the plate radius). Otsu over the shell separates the
/// two intensity populations; the split along the plate radius yields the
/// signal-to-noise ratio of that separation.
pub fn measure_spindle_threshold(
    tubulin: &Volume,
    chromatin_mask: &BinaryMask,
    plate_length: f64,
    plate_width: f64,
) -> Result<SpindleThreshold, PipelineError> {
    let voxel_size = tubulin.voxel_size();
    let lateral_half = ((plate_length / 2.0 + PERIPHERY_MARGIN_UM) / voxel_size) as i64;
    let axial_half = ((plate_width / 2.0 + PERIPHERY_MARGIN_UM) / voxel_size) as i64;

    let dilated = dilate(chromatin_mask, PERIPHERY_DILATION_VOXELS);
    let spindle_radius_squared =
        ((plate_length / 2.0 - PERIPHERY_MARGIN_UM) / voxel_size).powi(2);

    let mut shell = Vec::new();
    let mut spindle = Vec::new();
    let mut cytoplasm = Vec::new();
    for p in dilated.foreground() {
        if chromatin_mask.get_zero(p) {
            continue;
        }
        if p[0].abs() > lateral_half || p[1].abs() > lateral_half || p[2].abs() > axial_half {
            continue;
        }
        if !tubulin.contains(p) {
            continue;
        }
        let v = tubulin.get(p);
        shell.push(v);
        if ((p[0] * p[0] + p[1] * p[1]) as f64) < spindle_radius_squared {
            spindle.push(v);
        } else {
            cytoplasm.push(v);
        }
    }

    let value = otsu(&shell);
    if value.is_nan() {
        return Err(PipelineError::ThresholdWasNan);
    }

    let snr = if spindle.is_empty() || cytoplasm.is_empty() {
        f64::NAN
    } else {
        let separation = mean(&spindle) - mean(&cytoplasm);
        let noise = (standard_deviation(&spindle).powi(2)
            + standard_deviation(&cytoplasm).powi(2))
        .sqrt();
        separation / noise
    };

    if !cytoplasm.is_empty() {
        debug!(
            "cytoplasm intensity median {:.2}, mad {:.2}",
            median(&cytoplasm),
            median_absolute_deviation(&cytoplasm)
        );
    }
    debug!("spindle threshold {:.2}, snr {:.2}", value, snr);
    Ok(SpindleThreshold { value, snr })
}

/// Angle between the pole axis and the lateral image plane in the original
/// frame, in degrees. The poles live in the aligned frame; the inverse of
/// the alignment maps them back before measuring.
pub fn spindle_axis_angle(
    pole_a: Point3<f64>,
    pole_b: Point3<f64>,
    alignment: &RigidTransform3,
    voxel_size: f64,
) -> f64 {
    let inverse = alignment.inverse();
    let a = inverse.apply(pole_a / voxel_size);
    let b = inverse.apply(pole_b / voxel_size);
    let axis = (a - b).normalize();
    let tilt = axis.dot(&Vector3::z()).abs().clamp(0.0, 1.0).acos();
    90.0 - tilt.to_degrees()
}

/// Distance between the chromatin center and the midpoint of the poles,
/// both in calibrated units.
pub fn center_to_center_distance(chromatin_center: Point3<f64>, poles_midpoint: Point3<f64>) -> f64 {
    (chromatin_center - poles_midpoint).norm()
}
