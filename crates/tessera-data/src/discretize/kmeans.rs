//! One-dimensional Lloyd iterations for k-means binning.

pub(super) const MAX_ITER: usize = 100;
const TOL: f64 = 1e-12;

/// Cut points halfway between consecutive sorted k-means centers.
///
/// Centers start at evenly spaced quantiles, so the result is deterministic.
/// An empty cluster keeps its previous center.
pub(super) fn kmeans_cuts(known: &[f64], bins: usize, max_iter: usize) -> Vec<f64> {
    if known.is_empty() {
        return vec![0.0; bins - 1];
    }
    let mut sorted = known.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let n = sorted.len();

    let mut centers: Vec<f64> = (0..bins)
        .map(|j| sorted[((2 * j + 1) * n / (2 * bins)).min(n - 1)])
        .collect();

    for _ in 0..max_iter {
        let boundaries = midpoints(&centers);
        let mut sums = vec![0.0f64; bins];
        let mut counts = vec![0usize; bins];
        for &v in &sorted {
            let c = boundaries.partition_point(|&b| b < v);
            sums[c] += v;
            counts[c] += 1;
        }

        let mut shift = 0.0f64;
        for ((center, &sum), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                let updated = sum / count as f64;
                shift = shift.max((updated - *center).abs());
                *center = updated;
            }
        }
        centers.sort_unstable_by(f64::total_cmp);
        if shift <= TOL {
            break;
        }
    }

    midpoints(&centers)
}

fn midpoints(centers: &[f64]) -> Vec<f64> {
    centers.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
}
