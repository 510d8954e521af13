//! Class-aware cut points from recursive minimum-entropy partitioning.
//!
//! Intervals are split breadth first. Each split sits at the boundary that
//! minimizes the weighted class entropy of the two halves and is kept only
//! when its information gain passes the minimum description length test.
//! Splitting stops once `bins - 1` cuts exist or no interval passes the test;
//! the remaining slots hold `+inf`, which no finite value reaches.

use std::collections::VecDeque;

/// Entropy in nats of a class histogram holding `n` samples.
fn class_entropy(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * p.ln()
        })
        .sum::<f64>()
}

fn histogram(points: &[(f64, usize)], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &(_, c) in points {
        counts[c] += 1;
    }
    counts
}

fn distinct_classes(counts: &[usize]) -> f64 {
    counts.iter().filter(|&&c| c > 0).count() as f64
}

/// The best accepted split of a sorted interval: `(position, cut)`.
///
/// `position` is the number of points that fall left of `cut`.
fn best_split(points: &[(f64, usize)], n_classes: usize) -> Option<(usize, f64)> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let total = histogram(points, n_classes);
    let mut left = vec![0usize; n_classes];
    let mut right = total.clone();
    let mut best: Option<(f64, usize)> = None;
    for i in 1..n {
        let class = points[i - 1].1;
        left[class] += 1;
        right[class] -= 1;
        if points[i - 1].0 == points[i].0 {
            continue;
        }
        let e = (i as f64 * class_entropy(&left, i)
            + (n - i) as f64 * class_entropy(&right, n - i))
            / n as f64;
        if best.is_none_or(|(b, _)| e < b) {
            best = Some((e, i));
        }
    }
    let (split_entropy, position) = best?;

    let left = histogram(&points[..position], n_classes);
    let right = histogram(&points[position..], n_classes);
    let whole = class_entropy(&total, n);
    let gain = whole - split_entropy;
    let (k, k1, k2) = (
        distinct_classes(&total),
        distinct_classes(&left),
        distinct_classes(&right),
    );
    let delta = (3.0f64.powf(k) - 2.0).ln()
        - (k * whole - k1 * class_entropy(&left, position) - k2 * class_entropy(&right, n - position));
    let n = n as f64;
    let threshold = ((n - 1.0).ln() + delta) / n;
    (gain > threshold).then(|| {
        let cut = (points[position - 1].0 + points[position].0) / 2.0;
        (position, cut)
    })
}

/// `bins - 1` non-decreasing cuts separating the classes of `known`.
///
/// `labels[i]` is the class of `known[i]`; every label is below `n_classes`.
pub(super) fn entropy_cuts(known: &[f64], labels: &[usize], n_classes: usize, bins: usize) -> Vec<f64> {
    let mut points: Vec<(f64, usize)> = known.iter().copied().zip(labels.iter().copied()).collect();
    points.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let mut cuts = Vec::with_capacity(bins - 1);
    let mut queue = VecDeque::from([0..points.len()]);
    while cuts.len() < bins - 1 {
        let Some(range) = queue.pop_front() else {
            break;
        };
        if let Some((position, cut)) = best_split(&points[range.clone()], n_classes) {
            cuts.push(cut);
            let mid = range.start + position;
            queue.push_back(range.start..mid);
            queue.push_back(mid..range.end);
        }
    }
    cuts.sort_unstable_by(f64::total_cmp);
    cuts.resize(bins - 1, f64::INFINITY);
    cuts
}
