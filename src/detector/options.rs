//! Parameter types for the matched-filter peak detector.
//!
//! Defaults reproduce the fielded configuration: 256×256 slices at roughly
//! 1 mm/pixel, a 10-pixel wrap-around guard band, and a 30% isolation drop
//! calibrated against the complex-max mask normalization.

use serde::Deserialize;

/// Knobs for the per-slice fiducial detector.
#[derive(Clone, Debug, Deserialize)]
pub struct DetectorOptions {
    /// Square slice size in pixels. Must be a power of two (radix-2 FFT
    /// and quadrant swap both require it).
    pub working_size: usize,
    /// Exclusion band around the image edge during peak search, guarding
    /// against k-space wrap-around artifacts.
    pub border_margin: usize,
    /// Half-size of the block inspected and cleared around each peak.
    pub block_radius: usize,
    /// Minimum relative drop `(peak - corner)/peak` required at all four
    /// block corners for a peak to count as isolated.
    pub isolation_drop: f32,
    /// Rejected candidates tolerated before detection gives up on a slice.
    pub max_rejects: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            working_size: 256,
            border_margin: 10,
            block_radius: 10,
            isolation_drop: 0.3,
            max_rejects: 10,
        }
    }
}
