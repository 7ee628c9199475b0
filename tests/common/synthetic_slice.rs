//! Synthetic Z-frame slices for end-to-end tests.
//!
//! Renders the seven fiducial intercepts of a known frame pose into a
//! 256×256 slice buffer by stamping the detector's own disc template at
//! each intercept, with bilinear splatting so fractional positions survive
//! rasterization.

use zframe_calibration::detector::mask::{DISC_KERNEL, KERNEL_SIZE};

pub const N: usize = 256;

/// In-plane fiducial intercepts (mm, frame axes aligned with the image) of
/// a cut through the frame at height `h`, in canonical ring order:
/// corners at even positions, the diagonals of Side 1, Base and Side 2 at
/// positions 1, 3, 5.
pub fn frame_intercepts(h: f32) -> [[f32; 2]; 7] {
    [
        [30.0, -30.0],
        [30.0, -h],
        [30.0, 30.0],
        [h, 30.0],
        [-30.0, 30.0],
        [-30.0, h],
        [-30.0, -30.0],
    ]
}

/// Rotates intercepts in-plane about the image centre.
pub fn rotate(points: &[[f32; 2]; 7], degrees: f32) -> [[f32; 2]; 7] {
    let (s, c) = degrees.to_radians().sin_cos();
    points.map(|p| [c * p[0] - s * p[1], s * p[0] + c * p[1]])
}

/// Shifts intercepts by (dr, dc) millimetres.
pub fn translate(points: &[[f32; 2]; 7], dr: f32, dc: f32) -> [[f32; 2]; 7] {
    points.map(|p| [p[0] + dr, p[1] + dc])
}

/// Renders intercepts (mm at 1 mm/pixel) into a slice buffer with the
/// volume layout `pixel(x, y) = buffer[y*N + x]`. The image centre follows
/// the pipeline's integer-halving convention, so integer-mm intercepts land
/// on exact pixels.
pub fn render_slice(points: &[[f32; 2]]) -> Vec<i16> {
    let mut acc = vec![0.0f32; N * N];
    for p in points {
        let r = (N / 2) as f32 + p[0];
        let c = (N / 2) as f32 + p[1];
        stamp(&mut acc, r, c);
    }
    acc.into_iter()
        .map(|v| (v * 1000.0).round() as i16)
        .collect()
}

/// Splats the disc template centred at the (possibly fractional) matrix
/// coordinate (r, c) = (x, y).
fn stamp(acc: &mut [f32], r: f32, c: f32) {
    let half = (KERNEL_SIZE / 2) as f32;
    for (m, row) in DISC_KERNEL.iter().enumerate() {
        for (n, &v) in row.iter().enumerate() {
            if v == 0.0 {
                continue;
            }
            let rr = r - half + m as f32;
            let cc = c - half + n as f32;
            let r0 = rr.floor();
            let c0 = cc.floor();
            let fr = rr - r0;
            let fc = cc - c0;
            let (x, y) = (r0 as usize, c0 as usize);
            let w = v as f32;
            acc[y * N + x] += w * (1.0 - fr) * (1.0 - fc);
            acc[y * N + x + 1] += w * fr * (1.0 - fc);
            acc[(y + 1) * N + x] += w * (1.0 - fr) * fc;
            acc[(y + 1) * N + x + 1] += w * fr * fc;
        }
    }
}
