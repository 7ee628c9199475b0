//! Closed-form single-slice pose recovery.
//!
//! Adaptation of the single-image registration method of Susil et al.
//! (MICCAI 1999) to the Z-frame: each of the three Z patterns pins its
//! diagonal intercept in frame coordinates through the ratio of segment
//! lengths along the scan line; the triangle those three points span is
//! then matched against its image-plane counterpart, giving the rotation as
//! a quaternion quotient and the translation by centroid alignment.
//!
//! Frame coordinates: origin at the cube centre, axes along the cube edges,
//! millimetres. The frame origin corner of each Z pattern is the end of the
//! diagonal fiducial attached to the pattern's third corner point.

use crate::types::Pose;
use log::{debug, warn};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

const MEPSILON: f32 = 1e-10;

/// Edge length of the fiducial cube (mm).
const FRAME_EDGE_MM: f32 = 60.0;

/// A recovered rotation larger than this is implausible for a mounted
/// frame and fails the solve (degrees).
const MAX_ROTATION_DEG: f32 = 15.0;

/// Through-plane displacement beyond this fails the solve (mm).
const MAX_DISPLACEMENT_MM: f32 = 20.0;

/// Anchor corner and diagonal direction of each Z pattern in frame
/// coordinates. Order matches the canonical fiducial ring: Side 1, Base,
/// Side 2.
const Z_PATTERNS: [([f32; 3], [f32; 3]); 3] = [
    ([30.0, 30.0, -30.0], [0.0, -1.0, 1.0]),
    ([-30.0, 30.0, -30.0], [1.0, 0.0, 1.0]),
    ([-30.0, -30.0, -30.0], [0.0, 1.0, 1.0]),
];

/// Locates the diagonal intercept of one Z pattern in frame coordinates.
///
/// `p1`, `p2`, `p3` are the image intercepts of the two parallel fiducials
/// bracketing the diagonal; the distance ratio along the scan line carries
/// over to the diagonal, whose full length is the face diagonal 60·√2.
pub fn solve_diagonal_intercept(
    p1: Vector3<f32>,
    p2: Vector3<f32>,
    p3: Vector3<f32>,
    origin: Vector3<f32>,
    diagonal: Vector3<f32>,
) -> Vector3<f32> {
    let vz = diagonal.normalize();
    let d12 = (p1 - p2).norm();
    let d23 = (p2 - p3).norm();
    let ld = FRAME_EDGE_MM * 2.0f32.sqrt();
    let lc = ld * d23 / (d12 + d23);
    origin + vz * lc
}

/// Right-handed orthonormal basis from two spanning vectors, columns
/// (vx, vy, vz). Gram-Schmidt via two cross products; `None` when the
/// spanning vectors are (near-)collinear.
fn orthonormal_basis(vx: Vector3<f32>, vy: Vector3<f32>) -> Option<Matrix3<f32>> {
    let vz = vx.cross(&vy);
    let vy = vz.cross(&vx);
    let vx = vx.try_normalize(MEPSILON)?;
    let vy = vy.try_normalize(MEPSILON)?;
    let vz = vz.try_normalize(MEPSILON)?;
    Some(Matrix3::from_columns(&[vx, vy, vz]))
}

/// Pose of the frame relative to the imaging plane.
///
/// `points` is the canonically ordered ring of seven intercepts, already
/// recentred to the image centre and scaled to millimetres. Returns `None`
/// when the triangle bases are degenerate or a sanity gate trips.
pub fn localize_frame(points: &[[f32; 2]; 7]) -> Option<Pose> {
    // Diagonal intercepts in frame coordinates, one per Z pattern; the
    // pattern's corner triple sits at ring positions (2i, 2i+1, 2i+2).
    let mut frame_pts = [Vector3::zeros(); 3];
    for (i, (origin, diagonal)) in Z_PATTERNS.iter().enumerate() {
        let p1 = image_point(points[2 * i]);
        let p2 = image_point(points[2 * i + 1]);
        let p3 = image_point(points[2 * i + 2]);
        frame_pts[i] = solve_diagonal_intercept(
            p1,
            p2,
            p3,
            Vector3::from(*origin),
            Vector3::from(*diagonal),
        );
    }
    let [p2f, p4f, p6f] = frame_pts;

    // Cross-section basis on the frame side ...
    let Some(frame_basis) = orthonormal_basis(p2f - p6f, p4f - p6f) else {
        warn!("localize_frame: degenerate frame triangle");
        return None;
    };
    let qft = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(frame_basis));

    // ... and on the image side, from the three diagonal intercepts.
    let d1 = image_point(points[1]);
    let d2 = image_point(points[3]);
    let d3 = image_point(points[5]);
    let Some(image_basis) = orthonormal_basis(d1 - d3, d2 - d3) else {
        warn!("localize_frame: degenerate image triangle");
        return None;
    };
    let qit = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(image_basis));

    // Rotation between frame and image: Qif = Qit / Qft.
    let orientation = qit * qft.inverse();

    let angle_deg = orientation.angle().to_degrees();
    if angle_deg.abs() > MAX_ROTATION_DEG {
        warn!("localize_frame: rotation angle too large ({angle_deg:.1} deg)");
        return None;
    }
    let axis = orientation
        .axis()
        .map(|a| a.into_inner())
        .unwrap_or_else(Vector3::x);
    debug!(
        "localize_frame: rotation {angle_deg:.2} deg about [{:.3}, {:.3}, {:.3}]",
        axis.x, axis.y, axis.z
    );

    // Translation: align the frame-triangle centroid (rotated into image
    // coordinates) with the image-triangle centroid.
    let cf = (p2f + p4f + p6f) / 3.0;
    let ci = (d1 + d2 + d3) / 3.0;
    let position = ci - orientation * cf;

    if position.z.abs() > MAX_DISPLACEMENT_MM {
        warn!(
            "localize_frame: displacement too large ({:.1} mm)",
            position.z
        );
        return None;
    }
    debug!(
        "localize_frame: displacement [{:.2}, {:.2}, {:.2}] mm",
        position.x, position.y, position.z
    );

    Some(Pose {
        position,
        orientation,
    })
}

#[inline]
fn image_point(p: [f32; 2]) -> Vector3<f32> {
    Vector3::new(p[0], p[1], 0.0)
}
