use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};
use serde::Serialize;

/// 2D real-valued matrix in row-major layout.
///
/// Matrix element order follows the imaging convention used throughout the
/// pipeline: the first index (row) is the image x coordinate, the second
/// (col) is y. Rows are contiguous, which the FFT row passes rely on.
/// Elements are f64; the correlation stage needs the headroom so that its
/// underflow checks stay meaningful.
#[derive(Clone, Debug)]
pub struct MatrixF64 {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl MatrixF64 {
    /// Allocates a zero-filled rows×cols matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    #[inline]
    pub fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: f64) {
        let i = self.idx(row, col);
        self.data[i] = v;
    }

    pub fn fill(&mut self, v: f64) {
        self.data.fill(v);
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }
}

/// Borrowed, read-only view of a 16-bit signed image volume.
///
/// The buffer is contiguous with x fastest, then y, then z:
/// `pixel(x, y, z) = data[z*xsize*ysize + y*xsize + x]`. The 4×4
/// image-to-world transform holds the pixel-spacing-scaled axis directions
/// in its first three columns and the origin in the fourth; any coordinate
/// convention flips (e.g. LPS↔RAS) are the caller's responsibility.
#[derive(Clone, Debug)]
pub struct VolumeShort<'a> {
    pub dims: [usize; 3],
    pub data: &'a [i16],
    pub transform: Matrix4<f32>,
}

impl<'a> VolumeShort<'a> {
    pub fn new(dims: [usize; 3], data: &'a [i16], transform: Matrix4<f32>) -> Self {
        assert_eq!(
            data.len(),
            dims[0] * dims[1] * dims[2],
            "volume buffer length must match dims"
        );
        Self {
            dims,
            data,
            transform,
        }
    }

    /// Extracts z-plane `k` into `out`, which must be dims[0]×dims[1].
    ///
    /// Matrix element (i, j) receives `buffer[j*xsize + i]`, so the matrix
    /// row index is the image x coordinate.
    pub fn slice_matrix_into(&self, k: usize, out: &mut MatrixF64) {
        let (xsize, ysize) = (self.dims[0], self.dims[1]);
        assert!(k < self.dims[2], "slice index out of range");
        assert_eq!(out.rows, xsize);
        assert_eq!(out.cols, ysize);
        let plane = &self.data[k * xsize * ysize..(k + 1) * xsize * ysize];
        for i in 0..xsize {
            for j in 0..ysize {
                out.set(i, j, plane[j * xsize + i] as f64);
            }
        }
    }

    /// Convenience allocating variant of [`slice_matrix_into`](Self::slice_matrix_into).
    pub fn slice_matrix(&self, k: usize) -> MatrixF64 {
        let mut out = MatrixF64::new(self.dims[0], self.dims[1]);
        self.slice_matrix_into(k, &mut out);
        out
    }
}

/// Rigid pose: position in millimetres plus a unit orientation quaternion
/// (x, y, z, w).
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

/// Final outcome of a multi-slice registration.
///
/// When `found` is false the pose fields are indeterminate. The orientation
/// is the principal eigenvector of the quaternion moment matrix and is unit
/// up to floating-point error; its overall sign is arbitrary.
#[derive(Clone, Debug, Serialize)]
pub struct RegistrationResult {
    pub found: bool,
    /// World-frame position of the frame origin (millimetres).
    pub position: Vector3<f32>,
    /// World-frame orientation, (x, y, z, w).
    pub orientation: Quaternion<f32>,
    /// Equivalent homogeneous pose matrix.
    pub matrix: Matrix4<f32>,
    pub slices_used: usize,
    pub slices_attempted: usize,
    pub latency_ms: f64,
}

impl Default for RegistrationResult {
    fn default() -> Self {
        Self {
            found: false,
            position: Vector3::zeros(),
            orientation: Quaternion::identity(),
            matrix: Matrix4::identity(),
            slices_used: 0,
            slices_attempted: 0,
            latency_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_extraction_transposes_buffer_layout() {
        // 3x2 slice: pixel(x, y) = 10*y + x
        let data: Vec<i16> = vec![0, 1, 2, 10, 11, 12];
        let volume = VolumeShort::new([3, 2, 1], &data, Matrix4::identity());
        let m = volume.slice_matrix(0);
        assert_eq!(m.rows, 3);
        assert_eq!(m.cols, 2);
        for x in 0..3 {
            for y in 0..2 {
                assert_eq!(m.get(x, y), (10 * y + x) as f64);
            }
        }
    }

    #[test]
    fn slice_extraction_selects_plane() {
        let mut data = vec![0i16; 2 * 2 * 3];
        for (idx, v) in data.iter_mut().enumerate() {
            *v = idx as i16;
        }
        let volume = VolumeShort::new([2, 2, 3], &data, Matrix4::identity());
        let m = volume.slice_matrix(2);
        // plane 2 starts at offset 8
        assert_eq!(m.get(0, 0), 8.0);
        assert_eq!(m.get(1, 1), 11.0);
    }
}
