//! Weighted least-squares gain estimation.
//!
//! Finds per-image gains `g_i` such that `g_i * mean_i ≈ g_j * mean_j`
//! over every overlap, with a soft prior pulling every gain toward 1 so
//! the system stays well-posed on sparse or degenerate overlap graphs.
//! A singular system is never an error: the solver falls back to the
//! identity gain set and logs the condition.

use image::{GrayImage, RgbImage};
use nalgebra::{DMatrix, DVector};
use pano_core::{count_nonzero, mask_and, masked_mean};
use rayon::prelude::*;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct GainParams {
    /// Precision of the overlap-agreement term.
    pub inv_sigma_n_sqr: f64,
    /// Precision of the direct raw-pixel-difference regularizer;
    /// 0 disables it (pixel-accurate paths only).
    pub inv_sigma_d_sqr: f64,
    /// Precision of the unit-gain prior.
    pub inv_sigma_g_sqr: f64,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            inv_sigma_n_sqr: 0.01,
            inv_sigma_d_sqr: 0.0,
            inv_sigma_g_sqr: 100.0,
        }
    }
}

impl GainParams {
    /// Enables the raw-difference regularizer, trading a little bias
    /// for smoother convergence on noisy overlaps.
    pub fn with_direct_regularizer(mut self, weight: f64) -> Self {
        self.inv_sigma_d_sqr = weight;
        self
    }
}

/// Builds the pairwise count/mean matrices for the mean-based solver:
/// `n[(i, j)]` is the overlap pixel count (own-mask count on the
/// diagonal) and `means[(i, j)]` the mean of image i over its overlap
/// with j (own-mask mean on the diagonal).
pub fn mean_matrices(lumas: &[GrayImage], masks: &[GrayImage]) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = lumas.len();
    let mut counts = DMatrix::<f64>::zeros(n, n);
    let mut means = DMatrix::<f64>::zeros(n, n);

    for i in 0..n {
        counts[(i, i)] = count_nonzero(&masks[i]) as f64;
        means[(i, i)] = masked_mean(&lumas[i], &masks[i]);
    }

    let pair_indexes: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();
    let entries: Vec<(usize, usize, f64, f64, f64)> = pair_indexes
        .par_iter()
        .map(|&(i, j)| {
            let inter = mask_and(&masks[i], &masks[j]);
            let count = count_nonzero(&inter) as f64;
            let mi = masked_mean(&lumas[i], &inter);
            let mj = masked_mean(&lumas[j], &inter);
            (i, j, count, mi, mj)
        })
        .collect();
    for (i, j, count, mi, mj) in entries {
        counts[(i, j)] = count;
        counts[(j, i)] = count;
        means[(i, j)] = mi;
        means[(j, i)] = mj;
    }

    (counts, means)
}

/// Solves the gain system from aggregate overlap counts and means.
/// Returns the gains together with the index of the brightest image
/// (highest own-mask mean), the natural rescale reference.
pub fn solve_gains_from_means(
    counts: &DMatrix<f64>,
    means: &DMatrix<f64>,
    params: &GainParams,
) -> (Vec<f64>, usize) {
    let n = counts.nrows();
    assert!(n > 0, "gain solve needs at least one image");
    assert_eq!(counts.shape(), means.shape(), "matrix shapes must agree");

    let sn = params.inv_sigma_n_sqr;
    let sg = params.inv_sigma_g_sqr;
    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);
    for i in 0..n {
        for j in 0..n {
            let nij = counts[(i, j)];
            let iij = means[(i, j)];
            let iji = means[(j, i)];
            a[(i, i)] += nij * (iij * iij * sn + sg);
            a[(j, j)] += nij * iji * iji * sn;
            a[(i, j)] -= 2.0 * nij * iij * iji * sn;
            b[i] += nij * sg;
        }
    }

    let gains = solve_or_identity(a, b);

    let mut reference = 0;
    for i in 1..n {
        if means[(i, i)] > means[(reference, reference)] {
            reference = i;
        }
    }
    (gains, reference)
}

/// Pixel-accurate gain solve: re-walks every pixel of every overlap and
/// accumulates the normal equations from raw samples instead of region
/// means. Pair contributions are gathered in parallel into per-pair
/// partial sums, then folded into the dense system.
pub fn solve_gains_accurate(
    lumas: &[GrayImage],
    masks: &[GrayImage],
    params: &GainParams,
) -> Vec<f64> {
    let n = lumas.len();
    assert!(n > 0, "gain solve needs at least one image");

    let partials = accumulate_pairs(masks, |i, j, inter| {
        let mut s = PairSums::new(i, j, 1);
        for ((&vi, &vj), &m) in lumas[i]
            .as_raw()
            .iter()
            .zip(lumas[j].as_raw())
            .zip(inter.as_raw())
        {
            if m != 0 {
                s.add(0, vi as f64, vj as f64);
            }
        }
        s
    });

    let (a, b) = assemble_system(n, &partials, 0, params);
    solve_or_identity(a, b)
}

/// Per-channel pixel-accurate solve: three independent systems, one
/// pixel walk. Returns one `[r, g, b]` gain triple per image.
pub fn solve_gains_accurate_rgb(
    images: &[RgbImage],
    masks: &[GrayImage],
    params: &GainParams,
) -> Vec<[f64; 3]> {
    let n = images.len();
    assert!(n > 0, "gain solve needs at least one image");

    let partials = accumulate_pairs(masks, |i, j, inter| {
        let mut s = PairSums::new(i, j, 3);
        for ((pi, pj), &m) in images[i]
            .as_raw()
            .chunks_exact(3)
            .zip(images[j].as_raw().chunks_exact(3))
            .zip(inter.as_raw())
        {
            if m != 0 {
                for c in 0..3 {
                    s.add(c, pi[c] as f64, pj[c] as f64);
                }
            }
        }
        s
    });

    let mut per_channel = Vec::with_capacity(3);
    for c in 0..3 {
        let (a, b) = assemble_system(n, &partials, c, params);
        per_channel.push(solve_or_identity(a, b));
    }

    (0..n)
        .map(|i| [per_channel[0][i], per_channel[1][i], per_channel[2][i]])
        .collect()
}

/// Normalizes the gain set so the reference image keeps gain exactly 1,
/// anchoring the panorama's brightness to a real image.
pub fn rescale(gains: &mut [f64], reference: usize) {
    let scale = 1.0 / gains[reference];
    for g in gains.iter_mut() {
        *g *= scale;
    }
}

/// Per-pair partial sums of the normal-equation terms; one slot per
/// channel so the RGB walk shares the structure.
struct PairSums {
    i: usize,
    j: usize,
    count: usize,
    sum_ii: [f64; 3],
    sum_jj: [f64; 3],
    sum_ij: [f64; 3],
}

impl PairSums {
    fn new(i: usize, j: usize, _channels: usize) -> Self {
        Self {
            i,
            j,
            count: 0,
            sum_ii: [0.0; 3],
            sum_jj: [0.0; 3],
            sum_ij: [0.0; 3],
        }
    }

    #[inline]
    fn add(&mut self, channel: usize, vi: f64, vj: f64) {
        self.sum_ii[channel] += vi * vi;
        self.sum_jj[channel] += vj * vj;
        self.sum_ij[channel] += vi * vj;
        if channel == 0 {
            self.count += 1;
        }
    }
}

fn accumulate_pairs<F>(masks: &[GrayImage], per_pair: F) -> Vec<PairSums>
where
    F: Fn(usize, usize, &GrayImage) -> PairSums + Sync,
{
    let n = masks.len();
    let pair_indexes: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();
    pair_indexes
        .par_iter()
        .filter_map(|&(i, j)| {
            let inter = mask_and(&masks[i], &masks[j]);
            if count_nonzero(&inter) == 0 {
                return None;
            }
            Some(per_pair(i, j, &inter))
        })
        .collect()
}

/// Folds per-pair partial sums into the dense N×N system. Each
/// unordered pair contributes both ordered-pair terms of the cost:
/// overlap agreement, unit-gain prior, and (when enabled) the direct
/// raw-difference regularizer.
fn assemble_system(
    n: usize,
    partials: &[PairSums],
    channel: usize,
    params: &GainParams,
) -> (DMatrix<f64>, DVector<f64>) {
    let sn = params.inv_sigma_n_sqr;
    let sd = params.inv_sigma_d_sqr;
    let sg = params.inv_sigma_g_sqr;

    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);
    for p in partials {
        let count = p.count as f64;
        let s_ii = p.sum_ii[channel];
        let s_jj = p.sum_jj[channel];
        let s_ij = p.sum_ij[channel];

        a[(p.i, p.i)] += 2.0 * s_ii * (sn + sd) + count * sg;
        a[(p.j, p.j)] += 2.0 * s_jj * (sn + sd) + count * sg;
        a[(p.i, p.j)] -= 2.0 * s_ij * sn;
        a[(p.j, p.i)] -= 2.0 * s_ij * sn;
        b[p.i] += count * sg + 2.0 * s_ij * sd;
        b[p.j] += count * sg + 2.0 * s_ij * sd;
    }
    (a, b)
}

fn solve_or_identity(a: DMatrix<f64>, b: DVector<f64>) -> Vec<f64> {
    let n = b.len();
    match a.lu().solve(&b) {
        Some(x) => {
            let gains: Vec<f64> = x.iter().copied().collect();
            debug!(?gains, "solved gain system");
            gains
        }
        None => {
            warn!("gain system singular, falling back to identity gains");
            vec![1.0; n]
        }
    }
}
