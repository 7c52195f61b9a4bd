//! Morphometry of the mitotic spindle and the metaphase plate from a
//! two-channel (DNA + tubulin) 3D volume.
//!
//! The crate takes two co-registered calibrated intensity volumes plus an
//! optional cell mask, aligns them into a canonical pole-to-pole coordinate
//! frame and derives a fixed set of calibrated scalar measurements (lengths,
//! widths, volumes, intensity statistics, angles). File I/O, GUI layers and
//! table export live outside this crate; the entry point is
//! [`SpindleAnalysis::run`].

pub mod analysis;
pub mod image;
pub mod measurements;
pub mod pipeline;
pub mod settings;

pub use crate::analysis::PipelineError;
pub use crate::measurements::Measurements;
pub use crate::pipeline::{AnalysisInput, AnalysisReport, Channel, Outcome, SpindleAnalysis};
pub use crate::settings::Settings;

#[cfg(test)]
pub(crate) mod test_volumes;
