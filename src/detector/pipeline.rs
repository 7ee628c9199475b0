//! Per-slice fiducial detection.

use super::mask::CorrelationMask;
use super::options::DetectorOptions;
use crate::fft;
use crate::types::MatrixF64;
use log::{debug, warn};

const MEPSILON: f64 = 1e-10;

/// A correlation peak: integer matrix coordinate plus sub-pixel refinement.
#[derive(Clone, Copy, Debug, Default)]
pub struct Peak {
    pub row: usize,
    pub col: usize,
    /// Sub-pixel row coordinate (falls back to `row` when the parabola fit
    /// lands out of range).
    pub r: f32,
    /// Sub-pixel column coordinate.
    pub c: f32,
}

/// Matched-filter detector owning the precomputed mask and the per-slice
/// scratch planes.
///
/// The scratch matrices are reused across calls to amortise allocations, so
/// one detector instance must not be shared between concurrent slices.
pub struct FiducialDetector {
    options: DetectorOptions,
    mask: CorrelationMask,
    // Slice spectrum and k-space product; `prod_re` doubles as the
    // correlation plane after the inverse transform.
    spec_re: MatrixF64,
    spec_im: MatrixF64,
    prod_re: MatrixF64,
    prod_im: MatrixF64,
}

impl FiducialDetector {
    pub fn new(options: DetectorOptions) -> Self {
        let n = options.working_size;
        let mask = CorrelationMask::build(n);
        Self {
            options,
            mask,
            spec_re: MatrixF64::new(n, n),
            spec_im: MatrixF64::new(n, n),
            prod_re: MatrixF64::new(n, n),
            prod_im: MatrixF64::new(n, n),
        }
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    pub fn working_size(&self) -> usize {
        self.options.working_size
    }

    /// Locates the seven strongest isolated correlation peaks in `slice`.
    ///
    /// Returns `None` when the slice spectrum or the correlation plane
    /// underflows, or when too many candidates fail the isolation test
    /// before seven peaks are accepted. The returned peaks are unordered.
    pub fn locate_fiducials(&mut self, slice: &MatrixF64) -> Option<[Peak; 7]> {
        let n = self.options.working_size;
        assert_eq!(slice.rows, n, "slice size must match the working size");
        assert_eq!(slice.cols, n, "slice size must match the working size");

        // Slice to k-space.
        self.spec_re.data.copy_from_slice(&slice.data);
        self.spec_im.fill(0.0);
        fft::fft2(&mut self.spec_re, &mut self.spec_im);

        let maxabs = fft::complex_max(&self.spec_re, &self.spec_im);
        if maxabs < MEPSILON {
            warn!("locate_fiducials: slice spectrum underflow");
            return None;
        }
        let inv = 1.0 / maxabs;
        for v in self.spec_re.data.iter_mut() {
            *v *= inv;
        }
        for v in self.spec_im.data.iter_mut() {
            *v *= inv;
        }

        // Pointwise multiply with the conjugated mask: correlation by
        // k-space product.
        for i in 0..self.prod_re.data.len() {
            let sr = self.spec_re.data[i];
            let si = self.spec_im.data[i];
            let mr = self.mask.re.data[i];
            let mi = self.mask.im.data[i];
            self.prod_re.data[i] = sr * mr - si * mi;
            self.prod_im.data[i] = sr * mi + si * mr;
        }

        // Back to the spatial domain; only the real plane matters from here.
        fft::ifft2(&mut self.prod_re, &mut self.prod_im);
        fft::fft_shift(&mut self.prod_re);

        let maxreal = fft::real_max(&self.prod_re);
        if maxreal < MEPSILON {
            warn!("locate_fiducials: correlation plane underflow");
            return None;
        }
        let inv = 1.0 / maxreal;
        for v in self.prod_re.data.iter_mut() {
            *v *= inv;
        }

        self.extract_peaks()
    }

    /// Iteratively pulls the seven strongest isolated peaks out of the
    /// normalized correlation plane, clearing each peak's block so the next
    /// search finds a fresh maximum.
    fn extract_peaks(&mut self) -> Option<[Peak; 7]> {
        let corr = &mut self.prod_re;
        let border = self.options.border_margin;
        let radius = self.options.block_radius;

        let mut peaks = [Peak::default(); 7];
        let mut found = 0usize;
        let mut rejects = 0usize;

        while found < 7 {
            let (peakval, row, col) = find_max_interior(corr, border);
            if peakval < MEPSILON {
                warn!("extract_peaks: peak value is zero");
                return None;
            }

            let rstart = row.saturating_sub(radius);
            let rstop = (row + radius).min(corr.rows - 1);
            let cstart = col.saturating_sub(radius);
            let cstop = (col + radius).min(corr.cols - 1);

            // Isolation test: the correlation must fall off by at least the
            // configured fraction at all four block corners.
            let corners = [
                corr.get(rstart, cstart),
                corr.get(rstart, cstop),
                corr.get(rstop, cstart),
                corr.get(rstop, cstop),
            ];
            let isolated = corners
                .iter()
                .all(|&v| (peakval - v) / peakval >= self.options.isolation_drop as f64);

            if !isolated {
                rejects += 1;
                debug!(
                    "extract_peaks: bad peak at ({row}, {col}), reject {rejects}/{}",
                    self.options.max_rejects
                );
                if rejects > self.options.max_rejects {
                    warn!("extract_peaks: too many rejected candidates");
                    return None;
                }
            } else {
                let (r, c) = find_subpixel_peak(corr, row, col);
                peaks[found] = Peak { row, col, r, c };
                found += 1;
            }

            // Clear the block either way so the search moves on.
            for m in rstart..=rstop {
                for n in cstart..=cstop {
                    corr.set(m, n, 0.0);
                }
            }
        }

        Some(peaks)
    }
}

/// Arg-max over the matrix interior, excluding `border` pixels on every
/// side. Returns zero when nothing positive is found there.
fn find_max_interior(m: &MatrixF64, border: usize) -> (f64, usize, usize) {
    let mut maxabs = 0.0f64;
    let (mut row, mut col) = (0usize, 0usize);
    for i in border..m.rows - border {
        for j in border..m.cols - border {
            let v = m.get(i, j);
            if v > maxabs {
                maxabs = v;
                row = i;
                col = j;
            }
        }
    }
    (maxabs, row, col)
}

/// Per-axis parabola fit through the peak and its two neighbours.
///
/// A shift beyond one pixel (or a degenerate denominator) discards the fit
/// and keeps the integer coordinate.
fn find_subpixel_peak(corr: &MatrixF64, row: usize, col: usize) -> (f32, f32) {
    let y0 = corr.get(row, col);
    let yx1 = corr.get(row - 1, col);
    let yx2 = corr.get(row + 1, col);
    let yy1 = corr.get(row, col - 1);
    let yy2 = corr.get(row, col + 1);

    let xshift = 0.5 * (yx1 - yx2) / (yx1 + yx2 - 2.0 * y0);
    let yshift = 0.5 * (yy1 - yy2) / (yy1 + yy2 - 2.0 * y0);

    if !xshift.is_finite() || !yshift.is_finite() || xshift.abs() > 1.0 || yshift.abs() > 1.0 {
        debug!("find_subpixel_peak: shift out of range at ({row}, {col})");
        (row as f32, col as f32)
    } else {
        ((row as f64 + xshift) as f32, (col as f64 + yshift) as f32)
    }
}
