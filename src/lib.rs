#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod diagnostics;
pub mod registration;
pub mod types;

// Building blocks, public for tools and tests but considered unstable
// internals.
pub mod detector;
pub mod fft;
pub mod ordering;
pub mod solver;

// --- High-level re-exports -------------------------------------------------

// Main entry points: calibrator + results.
pub use crate::registration::{CalibrationParams, ZFrameCalibrator};
pub use crate::types::{RegistrationResult, VolumeShort};

// Structured per-slice diagnostics returned alongside the result.
pub use crate::diagnostics::{RegistrationReport, SliceTrace};

/// Small prelude for quick experiments.
pub mod prelude {
    pub use crate::detector::DetectorOptions;
    pub use crate::types::{MatrixF64, VolumeShort};
    pub use crate::{CalibrationParams, RegistrationResult, ZFrameCalibrator};
}
