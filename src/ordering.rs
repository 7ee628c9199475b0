//! Canonical ordering and validation of the seven detected fiducials.
//!
//! The Z-frame projects onto a slice as four corner intercepts (the
//! parallel line fiducials) and three diagonal intercepts. Detection finds
//! them in arbitrary order; the functions here arrange them into the ring
//! the pose solver expects: corners at positions 0, 2, 4, 6 and the
//! diagonals of Side 1, Base and Side 2 at positions 1, 3, 5, walking the
//! pattern clockwise in matrix (row, col) space starting at the corner pair
//! that has no diagonal between it.

use log::warn;

const MEPSILON: f32 = 1e-10;

/// Opposite corner edges must stay within this angle of parallel.
const PARALLEL_TOL_DEG: f32 = 5.0;

/// On-segment slack when matching a diagonal point to its corner gap:
/// d(Ca, X) + d(Cb, X) may exceed d(Ca, Cb) by at most 5%.
const SEGMENT_RATIO_MAX: f32 = 1.05;

pub fn coord_distance(a: &[f32; 2], b: &[f32; 2]) -> f32 {
    let dr = a[0] - b[0];
    let dc = a[1] - b[1];
    (dr * dr + dc * dc).sqrt()
}

/// Midpoint of the axis-aligned bounding box of the seven points.
pub fn find_fiducial_centre(points: &[[f32; 2]; 7]) -> [f32; 2] {
    let mut minrow = points[0][0];
    let mut maxrow = points[0][0];
    let mut mincol = points[0][1];
    let mut maxcol = points[0][1];
    for p in points.iter().skip(1) {
        minrow = minrow.min(p[0]);
        maxrow = maxrow.max(p[0]);
        mincol = mincol.min(p[1]);
        maxcol = maxcol.max(p[1]);
    }
    [(minrow + maxrow) / 2.0, (mincol + maxcol) / 2.0]
}

/// Moves the four corner fiducials to the front of the list.
///
/// Corners lie furthest from the pattern centre, so a stable descending
/// sort by centre distance puts them first. The two follow-up swaps make
/// positions 0→1→2→3 walk the quadrilateral edge by edge instead of
/// jumping across a diagonal.
pub fn find_fiducial_corners(points: &mut [[f32; 2]; 7], centre: &[f32; 2]) {
    let mut order: Vec<usize> = (0..7).collect();
    let distances: Vec<f32> = points.iter().map(|p| coord_distance(centre, p)).collect();
    order.sort_by(|&a, &b| {
        distances[b]
            .partial_cmp(&distances[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let sorted: Vec<[f32; 2]> = order.iter().map(|&i| points[i]).collect();
    points.copy_from_slice(&sorted);

    // The nearest of the remaining corners must be adjacent.
    if coord_distance(&points[0], &points[1]) > coord_distance(&points[0], &points[2]) {
        points.swap(1, 2);
    }
    if coord_distance(&points[1], &points[2]) > coord_distance(&points[1], &points[3]) {
        points.swap(2, 3);
    }
}

/// Ring-orders the seven points: corners 0..3 (already walking the
/// quadrilateral) interleaved with the diagonal points that lie between
/// them, traversed clockwise starting at the seam.
///
/// Returns false if some diagonal point fits no corner gap; the pattern is
/// not a plausible frame cross-section and the slice should be skipped.
pub fn order_fiducial_points(points: &mut [[f32; 2]; 7], centre: &[f32; 2]) -> bool {
    // Prototype index ring: corners at the even slots, gaps between them;
    // the first corner appears at both ends so every gap has two
    // neighbours.
    let mut ring: [i32; 9] = [0, -1, 1, -1, 2, -1, 3, -1, 0];
    let mut others: [i32; 3] = [4, 5, 6];

    for slot in (0..7).step_by(2) {
        for o in others.iter_mut() {
            if *o == -1 {
                continue;
            }
            let a = ring[slot] as usize;
            let b = ring[slot + 2] as usize;
            let cdist = coord_distance(&points[a], &points[b]);
            if cdist < MEPSILON {
                warn!("order_fiducial_points: coincident corner points");
                continue;
            }
            let pdist = coord_distance(&points[a], &points[*o as usize])
                + coord_distance(&points[b], &points[*o as usize]);
            if pdist / cdist < SEGMENT_RATIO_MAX {
                ring[slot + 1] = *o;
                *o = -1;
                break;
            }
        }
    }

    if others.iter().any(|&o| o != -1) {
        warn!("order_fiducial_points: diagonal point fits no corner gap");
        return false;
    }

    // The remaining -1 marks the seam: the one corner pair with no diagonal
    // between it. Ordering starts there by convention.
    let seam = match (1..9).find(|&i| ring[i] == -1) {
        Some(i) => i as i32,
        None => return false,
    };

    // Traverse clockwise in image (row, col) space; the sign of the cross
    // product of the first two corner radials picks the ring direction.
    let d1 = [points[0][0] - centre[0], points[0][1] - centre[1]];
    let d2 = [points[1][0] - centre[0], points[1][1] - centre[1]];
    let nvecz = d1[0] * d2[1] - d2[0] * d1[1];
    let direction: i32 = if nvecz < 0.0 { -1 } else { 1 };

    let mut ordered = [[0.0f32; 2]; 7];
    let mut i = seam;
    for slot in ordered.iter_mut() {
        i += direction;
        if i == -1 {
            i = 7;
        }
        if i == 9 {
            i = 1;
        }
        *slot = points[ring[i as usize] as usize];
    }
    points.copy_from_slice(&ordered);
    true
}

/// Full ordering pipeline: centre → corners → ring.
pub fn order_fiducials(points: &mut [[f32; 2]; 7]) -> bool {
    let centre = find_fiducial_centre(points);
    find_fiducial_corners(points, &centre);
    order_fiducial_points(points, &centre)
}

/// Validates an ordered pattern: every coordinate inside the image and both
/// pairs of opposite corner edges near parallel.
///
/// Coordinates are truncated to integers first, mirroring the fielded
/// behaviour; the row bound pairs with ysize and the column bound with
/// xsize (slices are square, so the pairing is benign).
pub fn check_fiducial_geometry(points: &[[f32; 2]; 7], xsize: usize, ysize: usize) -> bool {
    let p: Vec<[i32; 2]> = points
        .iter()
        .map(|q| [q[0] as i32, q[1] as i32])
        .collect();

    for q in &p {
        if q[0] < 0 || q[0] >= ysize as i32 || q[1] < 0 || q[1] >= xsize as i32 {
            warn!("check_fiducial_geometry: fiducial coordinates out of range");
            return false;
        }
    }

    // Corner points of the ordered ring.
    let p1 = [p[0][0] as f32, p[0][1] as f32];
    let p3 = [p[2][0] as f32, p[2][1] as f32];
    let p5 = [p[4][0] as f32, p[4][1] as f32];
    let p7 = [p[6][0] as f32, p[6][1] as f32];

    let cos_tol = (PARALLEL_TOL_DEG * std::f32::consts::PI / 180.0).cos();
    let parallel = |a: [f32; 2], b: [f32; 2]| -> bool {
        let na = (a[0] * a[0] + a[1] * a[1]).sqrt();
        let nb = (b[0] * b[0] + b[1] * b[1]).sqrt();
        if na < MEPSILON || nb < MEPSILON {
            return false;
        }
        let dotp = (a[0] * b[0] + a[1] * b[1]) / (na * nb);
        dotp.abs() >= cos_tol
    };

    let d71 = [p7[0] - p1[0], p7[1] - p1[1]];
    let d53 = [p5[0] - p3[0], p5[1] - p3[1]];
    if !parallel(d71, d53) {
        warn!("check_fiducial_geometry: corner edges not parallel");
        return false;
    }
    let d13 = [p1[0] - p3[0], p1[1] - p3[1]];
    let d75 = [p7[0] - p5[0], p7[1] - p5[1]];
    if !parallel(d13, d75) {
        warn!("check_fiducial_geometry: corner edges not parallel");
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The canonical ring for an axis-aligned pattern centred at pixel
    /// (128, 128): corners at even slots, diagonals between them, seam
    /// between the last and first corner.
    fn canonical() -> [[f32; 2]; 7] {
        [
            [158.0, 98.0],
            [158.0, 128.0],
            [158.0, 158.0],
            [128.0, 158.0],
            [98.0, 158.0],
            [98.0, 128.0],
            [98.0, 98.0],
        ]
    }

    #[test]
    fn ordering_is_invariant_under_input_permutation() {
        let expected = canonical();
        let permutations: [[usize; 7]; 5] = [
            [0, 1, 2, 3, 4, 5, 6],
            [6, 5, 4, 3, 2, 1, 0],
            [3, 6, 0, 4, 1, 5, 2],
            [5, 0, 3, 1, 6, 2, 4],
            [2, 4, 6, 1, 3, 5, 0],
        ];
        for perm in &permutations {
            let mut shuffled = [[0.0f32; 2]; 7];
            for (dst, &src) in shuffled.iter_mut().zip(perm.iter()) {
                *dst = expected[src];
            }
            assert!(order_fiducials(&mut shuffled), "ordering failed for {perm:?}");
            assert_eq!(shuffled, expected, "wrong ring for permutation {perm:?}");
        }
    }

    #[test]
    fn off_segment_diagonal_is_rejected() {
        let mut points = canonical();
        // Pull the Base diagonal far off the corner-to-corner segment.
        points[3] = [120.0, 120.0];
        assert!(!order_fiducials(&mut points));
    }

    #[test]
    fn geometry_accepts_canonical_pattern() {
        assert!(check_fiducial_geometry(&canonical(), 256, 256));
    }

    #[test]
    fn geometry_rejects_out_of_range_points() {
        let mut points = canonical();
        points[4] = [-2.0, 158.0];
        assert!(!check_fiducial_geometry(&points, 256, 256));
        points[4] = [98.0, 300.0];
        assert!(!check_fiducial_geometry(&points, 256, 256));
    }

    #[test]
    fn geometry_rejects_skewed_corners() {
        let mut points = canonical();
        // Shear one corner so opposite edges diverge by ~11 degrees.
        points[2] = [170.0, 146.0];
        assert!(!check_fiducial_geometry(&points, 256, 256));
    }
}
