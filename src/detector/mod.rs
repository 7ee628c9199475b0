//! Matched-filter detection of the seven fiducial intercepts in one slice.
//!
//! Overview
//! - A fixed 11×11 disc template (the MR cross-section of a line fiducial)
//!   is transformed to the frequency domain once, conjugated and normalized.
//! - Each slice is transformed, multiplied pointwise with the stored mask
//!   and inverse-transformed; sharp peaks in the (quadrant-swapped) real
//!   plane mark high correlation with the template.
//! - The seven strongest peaks that pass an isolation test are refined to
//!   sub-pixel accuracy with a per-axis parabola fit.
//!
//! Modules
//! - `mask` – the disc kernel and frequency-domain mask construction.
//! - `options` – detector knobs.
//! - `pipeline` – the [`FiducialDetector`] with its reusable scratch planes.

pub mod mask;
pub mod options;
mod pipeline;

pub use mask::CorrelationMask;
pub use options::DetectorOptions;
pub use pipeline::{FiducialDetector, Peak};
