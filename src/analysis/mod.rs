pub mod ellipsoid;
pub mod mask;
pub mod measure;
pub mod poles;
pub mod profile;
pub mod threshold;

use thiserror::Error;

/// Fatal measurement faults. These abort the analysis of the current cell;
/// they are distinct from the expected low-dynamic-range interruptions,
/// which are ordinary outcomes and not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("all {label} regions touch the image border")]
    AllRegionsTouchBorder { label: &'static str },

    #[error("intensity threshold estimation produced NaN")]
    ThresholdWasNan,

    #[error("no intensity maximum found inside the mask during pole refinement")]
    NoMaximumInsideMask,

    #[error("mask is empty or degenerate, cannot fit an ellipsoid")]
    DegenerateMask,
}
