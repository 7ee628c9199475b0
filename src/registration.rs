//! Multi-slice registration: drives detect → order → solve per slice and
//! fuses the per-slice poses into one result.
//!
//! Positions are fused by arithmetic mean. Orientations are fused as the
//! principal eigenvector of the quaternion moment matrix T = sum(q qᵀ),
//! the maximum-likelihood average when the samples scatter around a single
//! mean. The outer product is insensitive to the per-sample sign ambiguity
//! of unit quaternions.

use crate::detector::{DetectorOptions, FiducialDetector};
use crate::diagnostics::{RegistrationReport, SliceTrace};
use crate::ordering;
use crate::solver;
use crate::types::{MatrixF64, Pose, RegistrationResult, VolumeShort};
use log::{debug, warn};
use nalgebra::{
    Matrix3, Matrix4, Quaternion, Rotation3, SymmetricEigen, UnitQuaternion, Vector3,
};
use serde::Deserialize;
use std::ops::Range;
use std::time::Instant;

const MEPSILON: f32 = 1e-10;

/// Calibration-wide parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct CalibrationParams {
    pub detector: DetectorOptions,
    /// Base orientation of the mounted frame, (x, y, z, w); normalized
    /// before use.
    pub base_orientation: [f32; 4],
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            detector: DetectorOptions::default(),
            base_orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Z-frame calibrator: facade over the per-slice pipeline and the
/// multi-slice aggregation.
///
/// Owns the detector (and with it the FFT mask and scratch planes), so an
/// instance is not re-entrant; independent registrations need independent
/// instances.
pub struct ZFrameCalibrator {
    params: CalibrationParams,
    detector: FiducialDetector,
    slice_scratch: MatrixF64,
}

impl ZFrameCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        let detector = FiducialDetector::new(params.detector.clone());
        let n = params.detector.working_size;
        Self {
            params,
            detector,
            slice_scratch: MatrixF64::new(n, n),
        }
    }

    /// Replaces the base orientation applied to every per-slice result.
    pub fn set_base_orientation(&mut self, orientation: [f32; 4]) {
        self.params.base_orientation = orientation;
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Registers the frame over the half-open slice range, returning the
    /// fused pose. `found` is false when no slice in the range succeeded or
    /// the inputs are invalid.
    pub fn register(&mut self, volume: &VolumeShort<'_>, slices: Range<usize>) -> RegistrationResult {
        self.register_with_diagnostics(volume, slices).result
    }

    /// Like [`register`](Self::register), but also returns one trace per
    /// attempted slice.
    pub fn register_with_diagnostics(
        &mut self,
        volume: &VolumeShort<'_>,
        slices: Range<usize>,
    ) -> RegistrationReport {
        let total_start = Instant::now();
        let mut report = RegistrationReport::default();

        let Some(geometry) = SliceGeometry::decompose(volume, &slices, self.detector.working_size())
        else {
            report.result.latency_ms = total_start.elapsed().as_secs_f64() * 1000.0;
            return report;
        };

        let [bx, by, bz, bw] = self.params.base_orientation;
        let Some(base) = UnitQuaternion::try_new(Quaternion::new(bw, bx, by, bz), MEPSILON) else {
            warn!("register: base orientation is not normalizable");
            report.result.latency_ms = total_start.elapsed().as_secs_f64() * 1000.0;
            return report;
        };

        let mut position_sum = Vector3::zeros();
        let mut moment = Matrix4::<f32>::zeros();
        let mut successes = 0usize;

        for k in slices.clone() {
            debug!("register: slice {k}");
            let trace = self.register_slice(volume, &geometry, &base, k);
            if let Some(pose) = &trace.pose {
                debug!(
                    "register: slice {k} pose position=({:.2}, {:.2}, {:.2}) quaternion=({:.4}, {:.4}, {:.4}, {:.4})",
                    pose.position.x,
                    pose.position.y,
                    pose.position.z,
                    pose.orientation.i,
                    pose.orientation.j,
                    pose.orientation.k,
                    pose.orientation.w
                );
                position_sum += pose.position;
                let q = pose.orientation.quaternion().coords;
                moment += q * q.transpose();
                successes += 1;
            }
            report.slices.push(trace);
        }

        report.result.slices_attempted = slices.len();
        report.result.slices_used = successes;

        if successes == 0 {
            warn!("register: no slice in the range produced a frame lock");
        } else {
            let n = successes as f32;
            let position = position_sum / n;
            let orientation = principal_quaternion(&(moment / n));

            report.result.found = true;
            report.result.position = position;
            report.result.orientation = orientation;
            report.result.matrix = pose_matrix(&position, &orientation);
            debug!(
                "register: fused over {successes} slices: position=({:.2}, {:.2}, {:.2}) quaternion=({:.4}, {:.4}, {:.4}, {:.4})",
                position.x, position.y, position.z,
                orientation.i, orientation.j, orientation.k, orientation.w
            );
        }

        report.result.latency_ms = total_start.elapsed().as_secs_f64() * 1000.0;
        report
    }

    /// One turn of the registration loop: extract the slice, run
    /// detect → order → validate → localize, and compose the frame-relative
    /// pose with the slice's own pose in world coordinates.
    fn register_slice(
        &mut self,
        volume: &VolumeShort<'_>,
        geometry: &SliceGeometry,
        base: &UnitQuaternion<f32>,
        k: usize,
    ) -> SliceTrace {
        let start = Instant::now();
        let mut trace = SliceTrace::new(k);

        volume.slice_matrix_into(k, &mut self.slice_scratch);

        let Some(peaks) = self.detector.locate_fiducials(&self.slice_scratch) else {
            trace.failure = Some("fiducial detection failed");
            trace.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            return trace;
        };

        let mut points: [[f32; 2]; 7] = [[0.0; 2]; 7];
        for (dst, p) in points.iter_mut().zip(peaks.iter()) {
            *dst = [p.r, p.c];
        }
        if !ordering::order_fiducials(&mut points) {
            trace.failure = Some("fiducial ordering failed");
            trace.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            return trace;
        }
        trace.peaks = Some(points);

        if !ordering::check_fiducial_geometry(&points, geometry.dims[0], geometry.dims[1]) {
            trace.failure = Some("bad fiducial geometry");
            trace.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            return trace;
        }

        // Pixel coordinates to millimetres: re-origin at the image centre
        // (integer-truncated halving, deliberately not (dim-1)/2) and scale
        // by the pixel spacing.
        let half = [
            (geometry.dims[0] / 2) as f32,
            (geometry.dims[1] / 2) as f32,
        ];
        for p in &mut points {
            p[0] = (p[0] - half[0]) * geometry.spacing[0];
            p[1] = (p[1] - half[1]) * geometry.spacing[1];
        }

        let Some(frame) = solver::localize_frame(&points) else {
            trace.failure = Some("frame localization failed");
            trace.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            return trace;
        };

        // Frame pose in world coordinates, then relative to the base
        // orientation of the mount.
        let center = geometry.slice_center(k);
        let position = center + geometry.orientation * frame.position;
        let orientation = (geometry.orientation * frame.orientation) * base.inverse();

        trace.pose = Some(Pose {
            position,
            orientation,
        });
        trace.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        trace
    }
}

/// Image transform decomposed into pixel spacing, unit axis directions and
/// origin, with the derived per-slice helpers.
struct SliceGeometry {
    dims: [usize; 3],
    spacing: [f32; 3],
    axes: Matrix3<f32>,
    origin: Vector3<f32>,
    orientation: UnitQuaternion<f32>,
    half_fov: [f32; 2],
}

impl SliceGeometry {
    /// Validates the volume and slice range and splits the image transform
    /// into scales and directions. Logs and returns `None` on bad input.
    fn decompose(
        volume: &VolumeShort<'_>,
        slices: &Range<usize>,
        working_size: usize,
    ) -> Option<Self> {
        let dims = volume.dims;
        if dims.iter().any(|&d| d == 0) {
            warn!("register: empty volume");
            return None;
        }
        if dims[0] != working_size || dims[1] != working_size {
            warn!(
                "register: slice size {}x{} does not match the working size {working_size}",
                dims[0], dims[1]
            );
            return None;
        }
        if slices.start >= slices.end || slices.end > dims[2] {
            warn!(
                "register: invalid slice range {}..{} for {} slices",
                slices.start, slices.end, dims[2]
            );
            return None;
        }

        let t = volume.transform;
        let mut axes = Matrix3::zeros();
        let mut spacing = [0.0f32; 3];
        for col in 0..3 {
            let axis = Vector3::new(t[(0, col)], t[(1, col)], t[(2, col)]);
            let norm = axis.norm();
            if norm < MEPSILON {
                warn!("register: image transform column {col} has zero norm");
                return None;
            }
            spacing[col] = norm;
            axes.set_column(col, &(axis / norm));
        }
        let origin = Vector3::new(t[(0, 3)], t[(1, 3)], t[(2, 3)]);

        let orientation =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(axes));

        // Half field of view in-plane; the through-plane offset is per
        // slice. This re-centers the corner-origin convention of the buffer
        // to the center-origin convention the solver works in.
        let half_fov = [
            spacing[0] * (dims[0] - 1) as f32 / 2.0,
            spacing[1] * (dims[1] - 1) as f32 / 2.0,
        ];

        Some(Self {
            dims,
            spacing,
            axes,
            origin,
            orientation,
            half_fov,
        })
    }

    /// World position of the centre of slice `k`.
    fn slice_center(&self, k: usize) -> Vector3<f32> {
        let offset_k = self.spacing[2] * k as f32;
        self.origin
            + self.axes.column(0) * self.half_fov[0]
            + self.axes.column(1) * self.half_fov[1]
            + self.axes.column(2) * offset_k
    }
}

/// Eigenvector of the largest eigenvalue of the (symmetric) quaternion
/// moment matrix, as an (x, y, z, w) quaternion.
fn principal_quaternion(moment: &Matrix4<f32>) -> Quaternion<f32> {
    let eigen = SymmetricEigen::new(*moment);
    let mut maxi = 0;
    for i in 1..4 {
        if eigen.eigenvalues[i] > eigen.eigenvalues[maxi] {
            maxi = i;
        }
    }
    let v = eigen.eigenvectors.column(maxi);
    Quaternion::new(v[3], v[0], v[1], v[2])
}

/// Homogeneous pose matrix from a position and an (x, y, z, w) quaternion.
fn pose_matrix(position: &Vector3<f32>, orientation: &Quaternion<f32>) -> Matrix4<f32> {
    let unit = UnitQuaternion::new_normalize(*orientation);
    let mut m = unit.to_homogeneous();
    m[(0, 3)] = position.x;
    m[(1, 3)] = position.y;
    m[(2, 3)] = position.z;
    m
}
