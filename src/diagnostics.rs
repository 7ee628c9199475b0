//! Structured per-slice diagnostics for the registration pipeline.
//!
//! Everything here is advisory: the registration contract is carried by
//! [`RegistrationResult`](crate::types::RegistrationResult) alone. The
//! report serializes cleanly to JSON for offline inspection.

use crate::types::{Pose, RegistrationResult};
use serde::Serialize;

/// Outcome of one slice of the registration loop.
#[derive(Clone, Debug, Serialize)]
pub struct SliceTrace {
    pub slice_index: usize,
    /// Ordered fiducial ring in image pixel coordinates, when detection and
    /// ordering succeeded.
    pub peaks: Option<[[f32; 2]; 7]>,
    /// World-frame pose recovered from this slice.
    pub pose: Option<Pose>,
    /// Why the slice was skipped, if it was.
    pub failure: Option<&'static str>,
    pub elapsed_ms: f64,
}

impl SliceTrace {
    pub fn new(slice_index: usize) -> Self {
        Self {
            slice_index,
            peaks: None,
            pose: None,
            failure: None,
            elapsed_ms: 0.0,
        }
    }
}

/// Full registration report: the result plus one trace per attempted slice.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RegistrationReport {
    pub result: RegistrationResult,
    pub slices: Vec<SliceTrace>,
}
