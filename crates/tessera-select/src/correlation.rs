//! Entropy and symmetric uncertainty between discretized features and the class.

/// Correlations at or below this are treated as exactly zero.
const ZERO_TOLERANCE: f64 = 1e-12;

/// Shannon entropy in bits of a histogram of non-negative weights.
///
/// Returns 0 for an empty or all-zero histogram.
#[must_use]
pub fn entropy(histogram: &[f64]) -> f64 {
    let total: f64 = histogram.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    -histogram
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| {
            let p = w / total;
            p * p.log2()
        })
        .sum::<f64>()
}

/// Symmetric uncertainty `2·(H(A) + H(B) − H(A,B)) / (H(A) + H(B))` of two coded columns.
///
/// `card_a` and `card_b` are the numbers of distinct codes. Every joint cell
/// starts with one pseudo-count and the marginals with the matching row and
/// column totals, so all histograms are consistent. Pairs where either value
/// is unknown (`None`) are skipped. Returns 0 when both entropies are zero
/// and snaps rounding residue of independent columns to 0.
#[must_use]
pub fn symmetric_uncertainty(
    a: &[Option<usize>],
    card_a: usize,
    b: &[Option<usize>],
    card_b: usize,
) -> f64 {
    let mut joint = vec![1.0f64; card_a * card_b];
    let mut hist_a = vec![card_b as f64; card_a];
    let mut hist_b = vec![card_a as f64; card_b];

    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (*x, *y) {
            joint[x * card_b + y] += 1.0;
            hist_a[x] += 1.0;
            hist_b[y] += 1.0;
        }
    }

    let h_a = entropy(&hist_a);
    let h_b = entropy(&hist_b);
    let denom = h_a + h_b;
    if denom <= 0.0 {
        return 0.0;
    }
    let h_ab = entropy(&joint);
    let su = 2.0 * (denom - h_ab) / denom;
    if su <= ZERO_TOLERANCE { 0.0 } else { su }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(values: &[usize]) -> Vec<Option<usize>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn uniform_entropy_is_log2_of_bins() {
        assert!((entropy(&[3.0, 3.0, 3.0, 3.0]) - 2.0).abs() < 1e-12);
        assert_eq!(entropy(&[5.0]), 0.0);
        assert_eq!(entropy(&[]), 0.0);
    }

    #[test]
    fn identical_columns_correlate_more_than_unrelated_ones() {
        let a = known(&[0, 0, 1, 1, 0, 0, 1, 1]);
        let noise = known(&[0, 1, 0, 1, 0, 1, 0, 1]);
        let same = symmetric_uncertainty(&a, 2, &a, 2);
        let unrelated = symmetric_uncertainty(&a, 2, &noise, 2);
        assert!(same > 0.3, "same = {same}");
        assert!(unrelated.abs() < 1e-9, "unrelated = {unrelated}");
    }

    #[test]
    fn symmetric_and_bounded() {
        let a = known(&[0, 1, 2, 2, 1, 0, 2]);
        let b = known(&[1, 1, 0, 0, 1, 1, 0]);
        let ab = symmetric_uncertainty(&a, 3, &b, 2);
        let ba = symmetric_uncertainty(&b, 2, &a, 3);
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn constant_column_has_zero_correlation() {
        let a = known(&[0, 0, 0, 0]);
        let b = known(&[0, 1, 0, 1]);
        assert!(symmetric_uncertainty(&a, 1, &b, 2).abs() < 1e-12);
        assert_eq!(symmetric_uncertainty(&a, 1, &a, 1), 0.0);
    }

    #[test]
    fn unknown_pairs_are_skipped() {
        let a = vec![Some(0), None, Some(1), Some(1)];
        let b = vec![Some(0), Some(1), Some(1), None];
        let with_gaps = symmetric_uncertainty(&a, 2, &b, 2);
        let dense = symmetric_uncertainty(&known(&[0, 1]), 2, &known(&[0, 1]), 2);
        assert!((with_gaps - dense).abs() < 1e-12);
    }
}
