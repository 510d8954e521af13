/// `bins - 1` equally spaced cuts over `[min, max]` of the known values.
pub(super) fn equal_width(known: &[f64], bins: usize) -> Vec<f64> {
    let (min, max) = known
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return vec![0.0; bins - 1];
    }
    let width = (max - min) / bins as f64;
    (1..bins).map(|j| min + j as f64 * width).collect()
}

/// Cuts at the sorted values found every `n / bins` positions.
pub(super) fn equal_frequency(known: &[f64], bins: usize) -> Vec<f64> {
    if known.is_empty() {
        return vec![0.0; bins - 1];
    }
    let mut sorted = known.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let n = sorted.len();
    (1..bins).map(|j| sorted[(j * n / bins).min(n - 1)]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_width_spacing() {
        assert_eq!(equal_width(&[2.0, 10.0, 6.0], 4), vec![4.0, 6.0, 8.0]);
    }

    #[test]
    fn equal_width_constant_column_collapses() {
        assert_eq!(equal_width(&[3.0, 3.0], 3), vec![3.0, 3.0]);
    }

    #[test]
    fn equal_frequency_quantiles() {
        let col: Vec<f64> = (0..8).rev().map(f64::from).collect();
        assert_eq!(equal_frequency(&col, 4), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn empty_column_yields_zero_cuts() {
        assert_eq!(equal_width(&[], 3), vec![0.0, 0.0]);
        assert_eq!(equal_frequency(&[], 2), vec![0.0]);
    }
}
