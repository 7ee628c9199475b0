//! Frequency-domain correlation mask construction.

use crate::fft;
use crate::types::MatrixF64;

/// Side length of the disc template.
pub const KERNEL_SIZE: usize = 11;

/// Correlation template for a fiducial cross-section: a filled disc with a
/// half-intensity rim, about 5 mm radius at 1 mm/pixel.
pub const DISC_KERNEL: [[f64; KERNEL_SIZE]; KERNEL_SIZE] = [
    [0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5, 0.0, 0.0],
    [0.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5, 0.0],
    [0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0],
    [0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5],
    [0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5],
    [0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5],
    [0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0],
    [0.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5, 0.0],
    [0.0, 0.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0],
];

/// Conjugated, normalized frequency-domain matched filter.
///
/// Built once per detector; multiplying a slice spectrum by this mask and
/// inverse-transforming yields the cross-correlation with the disc
/// template. Both planes are normalized by the maximum complex magnitude of
/// the transform, not by the sample count; the peak isolation threshold
/// assumes this amplitude convention.
pub struct CorrelationMask {
    pub re: MatrixF64,
    pub im: MatrixF64,
}

impl CorrelationMask {
    /// Embeds the disc kernel at the centre of a size×size zero frame,
    /// transforms it, conjugates and normalizes.
    pub fn build(size: usize) -> Self {
        assert!(size.is_power_of_two(), "mask size must be a power of 2");
        assert!(size >= 2 * KERNEL_SIZE, "mask size too small for template");

        let mut re = MatrixF64::new(size, size);
        let mut im = MatrixF64::new(size, size);

        let start = size / 2 - KERNEL_SIZE / 2;
        for (m, row) in DISC_KERNEL.iter().enumerate() {
            for (n, &v) in row.iter().enumerate() {
                re.set(start + m, start + n, v);
            }
        }

        fft::fft2(&mut re, &mut im);

        // Conjugate, then normalize by the maximum complex magnitude.
        for v in im.data.iter_mut() {
            *v = -*v;
        }
        let maxabs = fft::complex_max(&re, &im);
        let inv = 1.0 / maxabs;
        for v in re.data.iter_mut() {
            *v *= inv;
        }
        for v in im.data.iter_mut() {
            *v *= inv;
        }

        Self { re, im }
    }

    pub fn size(&self) -> usize {
        self.re.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undoing the conjugation and inverse-transforming must reproduce the
    /// centered disc pattern (up to the shared normalization factor).
    #[test]
    fn mask_inverts_back_to_disc_pattern() {
        let size = 64;
        let mask = CorrelationMask::build(size);
        let mut re = mask.re.clone();
        let mut im = mask.im.clone();
        for v in im.data.iter_mut() {
            *v = -*v;
        }
        fft::ifft2(&mut re, &mut im);

        let maxv = fft::real_max(&re);
        assert!(maxv > 0.0);
        let start = size / 2 - KERNEL_SIZE / 2;
        for r in 0..size {
            for c in 0..size {
                let expected = if (start..start + KERNEL_SIZE).contains(&r)
                    && (start..start + KERNEL_SIZE).contains(&c)
                {
                    DISC_KERNEL[r - start][c - start]
                } else {
                    0.0
                };
                assert!(
                    (re.get(r, c) / maxv - expected).abs() < 1e-9,
                    "pattern mismatch at ({r}, {c})"
                );
                assert!(im.get(r, c).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn mask_is_normalized_to_unit_peak_magnitude() {
        let mask = CorrelationMask::build(32);
        let maxabs = fft::complex_max(&mask.re, &mask.im);
        assert!((maxabs - 1.0).abs() < 1e-12);
    }
}
