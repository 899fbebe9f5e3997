//! Outlier classification and consistency grouping.
//!
//! Classifies images that are persistently brighter, darker, or
//! color-shifted relative to the neighbors they share a seam band
//! with, using accumulating votes over pairwise seam statistics rather
//! than a single global threshold. The vote rules and fudge factors
//! encode tuned behavior; comparison semantics are preserved exactly.

use crate::overlap::PairOverlap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct OutlierParams {
    /// Seam-mean difference (intensity levels) counted as a deficit.
    pub luma_thresh: f64,
    /// R/G and B/G ratio difference counted as a tint mismatch.
    pub color_ratio_thresh: f64,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            luma_thresh: 10.0,
            color_ratio_thresh: 0.25,
        }
    }
}

/// Vote tallies for one image over all its seam appearances.
#[derive(Debug, Default, Clone, Copy)]
struct Votes {
    appear: usize,
    small: usize,
    significant_small: usize,
    large: usize,
    significant_large: usize,
    accum_small: f64,
    accum_large: f64,
}

fn num_images(pairs: &[PairOverlap]) -> usize {
    pairs.iter().map(|p| p.i.max(p.j) + 1).max().unwrap_or(0)
}

/// Strict variant: an image is flagged only if it is on the losing
/// (or winning) side of every single seam it appears in.
pub fn pick_always_small_or_large(
    pairs: &[PairOverlap],
    thresh: f64,
) -> (Vec<usize>, Vec<usize>) {
    let n = num_images(pairs);
    let mut small = vec![0usize; n];
    let mut large = vec![0usize; n];
    let mut total = vec![0usize; n];
    for p in pairs {
        if p.seam_count == 0 {
            continue;
        }
        total[p.i] += 1;
        total[p.j] += 1;
        if p.seam_mean[0] > p.seam_mean[1] + thresh {
            small[p.j] += 1;
            large[p.i] += 1;
        }
        if p.seam_mean[1] > p.seam_mean[0] + thresh {
            small[p.i] += 1;
            large[p.j] += 1;
        }
    }

    let mut always_small = Vec::new();
    let mut always_large = Vec::new();
    for k in 0..n {
        if total[k] > 0 && small[k] == total[k] {
            always_small.push(k);
        }
        if total[k] > 0 && large[k] == total[k] {
            always_large.push(k);
        }
    }
    (always_small, always_large)
}

fn tally_luma(pairs: &[PairOverlap], k: usize, thresh: f64) -> Votes {
    let mut v = Votes::default();
    for p in pairs {
        if !p.involves(k) || p.seam_count == 0 {
            continue;
        }
        v.appear += 1;
        let (own, other) = p.seam_means_for(k);
        if own > other {
            v.accum_large += own - other;
        }
        if own < other {
            v.accum_small += other - own;
        }
        if own > other + thresh {
            v.large += 1;
        }
        if own > other + thresh * 3.0 {
            v.significant_large += 1;
        }
        if own + thresh < other {
            v.small += 1;
        }
        if own + 3.0 * thresh < other {
            v.significant_small += 1;
        }
    }
    v
}

/// Flags images that are darker than their seam neighbors almost
/// everywhere. An image qualifies when its accumulated deficit exceeds
/// `2.5·T` per appearance, or it loses every appearance, or (with more
/// than two appearances) the significant-deficit count comes within 2
/// of the appearance count. The symmetric brightness-excess tally is
/// kept for diagnostics but does not flag; the shipped heuristic
/// corrects only the dark side.
pub fn pick_almost_small(pairs: &[PairOverlap], thresh: f64) -> Vec<usize> {
    let n = num_images(pairs);
    let mut flagged = Vec::new();
    for k in 0..n {
        let v = tally_luma(pairs, k, thresh);
        if v.appear == 0 {
            continue;
        }
        debug!(
            image = k,
            appear = v.appear,
            small = v.small,
            significant_small = v.significant_small,
            large = v.large,
            significant_large = v.significant_large,
            "luma outlier votes"
        );
        if v.accum_small > thresh * 2.5 * v.appear as f64
            || v.small == v.appear
            || (v.appear > 2 && v.significant_small + 2 > v.appear)
        {
            flagged.push(k);
        }
    }
    flagged
}

fn any_channel_exceeds(a: &[f64; 3], b: &[f64; 3], margin: f64) -> bool {
    a[0] > b[0] + margin || a[1] > b[1] + margin || a[2] > b[2] + margin
}

/// Per-channel variant of [`pick_almost_small`]: the small/large votes
/// trigger on any single channel, catching tint shifts that cancel in
/// luma; the accumulated deficit still uses luma means.
pub fn pick_almost_small_rgb(pairs: &[PairOverlap], thresh: f64) -> Vec<usize> {
    let n = num_images(pairs);
    let mut flagged = Vec::new();
    for k in 0..n {
        let mut v = Votes::default();
        for p in pairs {
            if !p.involves(k) || p.seam_count == 0 {
                continue;
            }
            v.appear += 1;
            let (own, other) = p.seam_means_for(k);
            if own > other {
                v.accum_large += own - other;
            }
            if own < other {
                v.accum_small += other - own;
            }
            let (own_rgb, other_rgb) = p.seam_rgb_means_for(k);
            if any_channel_exceeds(&own_rgb, &other_rgb, thresh) {
                v.large += 1;
            }
            if any_channel_exceeds(&own_rgb, &other_rgb, thresh * 3.0) {
                v.significant_large += 1;
            }
            if any_channel_exceeds(&other_rgb, &own_rgb, thresh) {
                v.small += 1;
            }
            if any_channel_exceeds(&other_rgb, &own_rgb, thresh * 3.0) {
                v.significant_small += 1;
            }
        }
        if v.appear == 0 {
            continue;
        }
        debug!(
            image = k,
            appear = v.appear,
            small = v.small,
            significant_small = v.significant_small,
            "rgb outlier votes"
        );
        if v.accum_small > thresh * 2.5 * v.appear as f64
            || v.small == v.appear
            || (v.appear > 2 && v.significant_small + 2 > v.small && v.small + 2 > v.appear)
        {
            flagged.push(k);
        }
    }
    flagged
}

/// Flags images whose seam-band chroma disagrees with their neighbors:
/// an appearance mismatches when the R/G or B/G ratio differs by more
/// than the threshold; an image is inconsistent when every appearance
/// mismatches, or at least half do with more than two appearances.
pub fn pick_color_inconsistent(pairs: &[PairOverlap], ratio_thresh: f64) -> Vec<usize> {
    let n = num_images(pairs);
    let mut flagged = Vec::new();
    for k in 0..n {
        let mut appear = 0usize;
        let mut mismatch = 0usize;
        for p in pairs {
            if !p.involves(k) || p.seam_count == 0 {
                continue;
            }
            appear += 1;
            let (own, other) = p.seam_rgb_means_for(k);
            let rg_own = own[0] / own[1];
            let bg_own = own[2] / own[1];
            let rg_other = other[0] / other[1];
            let bg_other = other[2] / other[1];
            if (rg_own - rg_other).abs() > ratio_thresh
                || (bg_own - bg_other).abs() > ratio_thresh
            {
                mismatch += 1;
            }
        }
        if appear > 0 {
            debug!(image = k, appear, mismatch, "tint mismatch votes");
            if mismatch == appear || (appear > 2 && mismatch * 2 >= appear) {
                flagged.push(k);
            }
        }
    }
    flagged
}

/// A cluster of images whose mutual seam brightness differences are
/// below threshold. Groups are disjoint and cover all images.
#[derive(Debug, Clone)]
pub struct ConsistencyGroup {
    pub indexes: Vec<usize>,
    pub includes: Vec<bool>,
}

impl ConsistencyGroup {
    fn singleton(index: usize, total: usize) -> Self {
        let mut includes = vec![false; total];
        includes[index] = true;
        Self {
            indexes: vec![index],
            includes,
        }
    }

    fn absorb(&mut self, other: &ConsistencyGroup) {
        for &idx in &other.indexes {
            self.indexes.push(idx);
            self.includes[idx] = true;
        }
    }
}

fn seam_close(pairs: &[PairOverlap], a: usize, b: usize, thresh: f64, strict: bool) -> bool {
    // A missing record means "never measured", which is NOT the same as
    // a zero difference; only real overlaps can witness closeness.
    pairs.iter().any(|p| {
        p.seam_count > 0
            && ((p.i == a && p.j == b) || (p.i == b && p.j == a))
            && {
                let d = (p.seam_mean[0] - p.seam_mean[1]).abs();
                if strict {
                    d < thresh
                } else {
                    d <= thresh
                }
            }
    })
}

/// Clusters images into mutually-consistent groups: each image joins
/// the first group containing a seam neighbor within threshold, then
/// groups sharing any close cross pair are merged to a fixed point
/// (transitive closure). Deterministic for a given pair list.
pub fn group_consistent(pairs: &[PairOverlap], total: usize, thresh: f64) -> Vec<ConsistencyGroup> {
    if total == 0 {
        return Vec::new();
    }

    let mut groups = vec![ConsistencyGroup::singleton(0, total)];
    for i in 1..total {
        let home = groups.iter().position(|g| {
            g.indexes
                .iter()
                .any(|&member| seam_close(pairs, i, member, thresh, false))
        });
        match home {
            Some(gi) => {
                groups[gi].indexes.push(i);
                groups[gi].includes[i] = true;
            }
            None => groups.push(ConsistencyGroup::singleton(i, total)),
        }
    }

    // Merge groups with any close cross-group pair until stable.
    loop {
        let mut merged = false;
        'outer: for left in 0..groups.len() {
            for right in left + 1..groups.len() {
                let close = groups[left].indexes.iter().any(|&a| {
                    groups[right]
                        .indexes
                        .iter()
                        .any(|&b| seam_close(pairs, a, b, thresh, true))
                });
                if close {
                    let absorbed = groups.remove(right);
                    groups[left].absorb(&absorbed);
                    merged = true;
                    break 'outer;
                }
            }
        }
        if !merged {
            break;
        }
    }

    for (gi, g) in groups.iter().enumerate() {
        debug!(group = gi, members = ?g.indexes, "consistency group");
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(i: usize, j: usize, mean_i: f64, mean_j: f64) -> PairOverlap {
        PairOverlap {
            i,
            j,
            full_count: 100,
            core_count: 100,
            seam_count: 100,
            full_mean: [mean_i, mean_j],
            core_mean: [mean_i, mean_j],
            seam_mean: [mean_i, mean_j],
            seam_mean_rgb: [[mean_i; 3], [mean_j; 3]],
        }
    }

    #[test]
    fn persistently_dark_image_is_flagged() {
        // Image 2 is 30 levels darker than every neighbor; T = 10.
        let pairs = vec![
            pair(0, 1, 120.0, 122.0),
            pair(0, 2, 120.0, 90.0),
            pair(1, 2, 122.0, 92.0),
        ];
        let flagged = pick_almost_small(&pairs, 10.0);
        assert_eq!(flagged, vec![2]);
    }

    #[test]
    fn consistent_set_has_no_outliers() {
        let pairs = vec![
            pair(0, 1, 120.0, 125.0),
            pair(0, 2, 120.0, 118.0),
            pair(1, 2, 125.0, 119.0),
        ];
        assert!(pick_almost_small(&pairs, 10.0).is_empty());
    }

    #[test]
    fn always_small_requires_every_appearance() {
        let pairs = vec![
            pair(0, 1, 140.0, 100.0),
            pair(1, 2, 100.0, 145.0),
            pair(0, 2, 140.0, 145.0),
        ];
        let (small, large) = pick_always_small_or_large(&pairs, 10.0);
        assert_eq!(small, vec![1]);
        assert!(large.is_empty());
    }

    #[test]
    fn rgb_vote_catches_single_channel_shift() {
        // Image 1 matches in luma-ish terms but its red channel is
        // persistently 40 below the neighbors.
        let mk = |i, j, own: [f64; 3], other: [f64; 3]| PairOverlap {
            i,
            j,
            full_count: 100,
            core_count: 100,
            seam_count: 100,
            full_mean: [120.0, 120.0],
            core_mean: [120.0, 120.0],
            seam_mean: [120.0, 120.0],
            seam_mean_rgb: [own, other],
        };
        let pairs = vec![
            mk(0, 1, [130.0, 120.0, 110.0], [90.0, 120.0, 110.0]),
            mk(1, 2, [90.0, 120.0, 110.0], [131.0, 121.0, 111.0]),
        ];
        let flagged = pick_almost_small_rgb(&pairs, 10.0);
        assert_eq!(flagged, vec![1]);
    }

    #[test]
    fn tint_shift_is_color_inconsistent() {
        let mk = |i, j, own: [f64; 3], other: [f64; 3]| PairOverlap {
            i,
            j,
            full_count: 100,
            core_count: 100,
            seam_count: 100,
            full_mean: [120.0, 120.0],
            core_mean: [120.0, 120.0],
            seam_mean: [120.0, 120.0],
            seam_mean_rgb: [own, other],
        };
        // Image 0 runs strongly red relative to both neighbors.
        let pairs = vec![
            mk(0, 1, [160.0, 100.0, 100.0], [105.0, 100.0, 100.0]),
            mk(0, 2, [160.0, 100.0, 100.0], [102.0, 100.0, 100.0]),
            mk(1, 2, [105.0, 100.0, 100.0], [102.0, 100.0, 100.0]),
        ];
        let flagged = pick_color_inconsistent(&pairs, 0.25);
        assert_eq!(flagged, vec![0]);
    }

    #[test]
    fn grouping_follows_transitive_closure() {
        // 0-1 close, 1-2 close, 0-2 far: one merged group.
        let pairs = vec![
            pair(0, 1, 100.0, 105.0),
            pair(1, 2, 105.0, 111.0),
            pair(0, 2, 100.0, 140.0),
        ];
        let groups = group_consistent(&pairs, 3, 8.0);
        assert_eq!(groups.len(), 1);
        let mut members = groups[0].indexes.clone();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 2]);
    }

    #[test]
    fn far_apart_images_stay_in_separate_groups() {
        let pairs = vec![pair(0, 1, 100.0, 160.0)];
        let groups = group_consistent(&pairs, 2, 10.0);
        assert_eq!(groups.len(), 2);
        assert!(groups[0].includes[0]);
        assert!(groups[1].includes[1]);
    }
}
