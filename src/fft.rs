//! Radix-2 FFT over split real/imaginary planes.
//!
//! The correlation stage works on a real matrix plus a separate imaginary
//! matrix rather than interleaved complex samples, so the transforms here
//! take `(re, im)` pairs. Sizes must be powers of two (decimation-in-time,
//! bit-reversal permutation followed by butterfly stages).

use crate::types::MatrixF64;

/// In-place 1D FFT on split real/imaginary slices.
///
/// `inverse` applies the conjugate-exponent transform and scales by 1/n, so
/// a forward/inverse pair round-trips to the input.
pub fn fft_in_place(re: &mut [f64], im: &mut [f64], inverse: bool) {
    let n = re.len();
    assert!(n.is_power_of_two(), "FFT size must be a power of 2");
    assert_eq!(im.len(), n);

    bit_reverse_permute(re, im);

    let sign = if inverse { 1.0f64 } else { -1.0 };
    let mut stage_len = 2;
    while stage_len <= n {
        let half = stage_len / 2;
        let angle = sign * 2.0 * std::f64::consts::PI / stage_len as f64;
        for k in (0..n).step_by(stage_len) {
            for j in 0..half {
                let theta = angle * j as f64;
                let (wi, wr) = theta.sin_cos();

                let even_re = re[k + j];
                let even_im = im[k + j];
                let odd_re = re[k + j + half];
                let odd_im = im[k + j + half];

                // Butterfly: twiddle multiply
                let tr = wr * odd_re - wi * odd_im;
                let ti = wr * odd_im + wi * odd_re;

                re[k + j] = even_re + tr;
                im[k + j] = even_im + ti;
                re[k + j + half] = even_re - tr;
                im[k + j + half] = even_im - ti;
            }
        }
        stage_len *= 2;
    }

    if inverse {
        let scale = 1.0 / n as f64;
        for v in re.iter_mut() {
            *v *= scale;
        }
        for v in im.iter_mut() {
            *v *= scale;
        }
    }
}

fn bit_reverse_permute(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = bit_reverse(i as u32, bits) as usize;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }
}

#[inline(always)]
fn bit_reverse(mut x: u32, bits: u32) -> u32 {
    let mut result = 0u32;
    for _ in 0..bits {
        result = (result << 1) | (x & 1);
        x >>= 1;
    }
    result
}

/// Forward 2D FFT in place: rows first, then columns.
pub fn fft2(re: &mut MatrixF64, im: &mut MatrixF64) {
    transform2(re, im, false);
}

/// Inverse 2D FFT in place; total scaling is 1/(rows·cols).
pub fn ifft2(re: &mut MatrixF64, im: &mut MatrixF64) {
    transform2(re, im, true);
}

fn transform2(re: &mut MatrixF64, im: &mut MatrixF64, inverse: bool) {
    assert_eq!(re.rows, im.rows);
    assert_eq!(re.cols, im.cols);
    let (rows, cols) = (re.rows, re.cols);

    for r in 0..rows {
        fft_in_place(re.row_mut(r), im.row_mut(r), inverse);
    }

    // Column pass through gather/scatter scratch; rows are contiguous,
    // columns are not.
    let mut col_re = vec![0.0f64; rows];
    let mut col_im = vec![0.0f64; rows];
    for c in 0..cols {
        for r in 0..rows {
            col_re[r] = re.get(r, c);
            col_im[r] = im.get(r, c);
        }
        fft_in_place(&mut col_re, &mut col_im, inverse);
        for r in 0..rows {
            re.set(r, c, col_re[r]);
            im.set(r, c, col_im[r]);
        }
    }
}

/// Swaps diagonally-opposite quadrants so the DC sample moves to the matrix
/// centre. Dimensions must be even; the quadrants are rows/2 × cols/2.
pub fn fft_shift(m: &mut MatrixF64) {
    assert!(
        m.rows % 2 == 0 && m.cols % 2 == 0,
        "fft_shift requires even dimensions"
    );
    let (half_r, half_c) = (m.rows / 2, m.cols / 2);
    for i in 0..half_r {
        for j in 0..half_c {
            let a = m.idx(i, j);
            let b = m.idx(i + half_r, j + half_c);
            m.data.swap(a, b);

            let a = m.idx(i + half_r, j);
            let b = m.idx(i, j + half_c);
            m.data.swap(a, b);
        }
    }
}

/// Largest complex magnitude over a split-plane matrix pair.
pub fn complex_max(re: &MatrixF64, im: &MatrixF64) -> f64 {
    let mut maxabs = 0.0f64;
    for (r, i) in re.data.iter().zip(im.data.iter()) {
        let mag = (r * r + i * i).sqrt();
        if mag > maxabs {
            maxabs = mag;
        }
    }
    maxabs
}

/// Largest element value of a real matrix.
///
/// Starts from zero, matching the correlation normalization: an all-negative
/// plane reports zero rather than its (negative) maximum.
pub fn real_max(m: &MatrixF64) -> f64 {
    let mut maxabs = 0.0f64;
    for &v in &m.data {
        if v > maxabs {
            maxabs = v;
        }
    }
    maxabs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_ifft_roundtrip_1d() {
        let n = 16;
        let original: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
        let mut re = original.clone();
        let mut im = vec![0.0f64; n];

        fft_in_place(&mut re, &mut im, false);
        fft_in_place(&mut re, &mut im, true);

        for i in 0..n {
            assert!(
                (re[i] - original[i]).abs() < 1e-12,
                "roundtrip mismatch at {}: {} vs {}",
                i,
                re[i],
                original[i]
            );
            assert!(im[i].abs() < 1e-12);
        }
    }

    #[test]
    fn fft_dc_component() {
        // FFT of a constant signal concentrates everything in the DC bin.
        let n = 8;
        let mut re = vec![1.0f64; n];
        let mut im = vec![0.0f64; n];
        fft_in_place(&mut re, &mut im, false);
        assert!((re[0] - n as f64).abs() < 1e-12);
        for i in 1..n {
            assert!(re[i].abs() < 1e-12 && im[i].abs() < 1e-12);
        }
    }

    #[test]
    fn fft2_impulse_is_flat_spectrum() {
        let mut re = MatrixF64::new(8, 8);
        let mut im = MatrixF64::new(8, 8);
        re.set(0, 0, 1.0);
        fft2(&mut re, &mut im);
        for &v in &re.data {
            assert!((v - 1.0).abs() < 1e-12);
        }
        for &v in &im.data {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn fft2_ifft2_roundtrip() {
        let mut re = MatrixF64::new(16, 16);
        let mut im = MatrixF64::new(16, 16);
        for r in 0..16 {
            for c in 0..16 {
                re.set(r, c, ((r * 31 + c * 17) % 13) as f64);
            }
        }
        let original = re.clone();
        fft2(&mut re, &mut im);
        ifft2(&mut re, &mut im);
        for i in 0..re.data.len() {
            assert!((re.data[i] - original.data[i]).abs() < 1e-10);
            assert!(im.data[i].abs() < 1e-10);
        }
    }

    #[test]
    fn fft_shift_moves_corner_to_centre() {
        let mut m = MatrixF64::new(4, 6);
        m.set(0, 0, 1.0);
        m.set(3, 5, 2.0);
        fft_shift(&mut m);
        assert_eq!(m.get(2, 3), 1.0);
        assert_eq!(m.get(1, 2), 2.0);
        // Applying the swap twice restores the original.
        fft_shift(&mut m);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(3, 5), 2.0);
    }

    #[test]
    fn max_helpers() {
        let mut re = MatrixF64::new(2, 2);
        let mut im = MatrixF64::new(2, 2);
        re.set(0, 1, 3.0);
        im.set(0, 1, 4.0);
        assert!((complex_max(&re, &im) - 5.0).abs() < 1e-12);

        let mut m = MatrixF64::new(2, 2);
        m.fill(-1.0);
        assert_eq!(real_max(&m), 0.0);
        m.set(1, 0, 0.5);
        assert_eq!(real_max(&m), 0.5);
    }
}
