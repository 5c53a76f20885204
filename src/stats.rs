//! Statistics and index helpers shared by the pipeline stages.
//!
//! Aggregates ignore NaN entries and return NaN for an empty (or all-NaN)
//! input. Index helpers operate on ascending `usize` sequences.

/// Median of the finite-or-infinite (non-NaN) values; NaN when none remain.
pub fn nanmedian(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Mean of the non-NaN values; NaN when none remain.
pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|x| !x.is_nan())
        .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Population standard deviation (ddof = 0) of the non-NaN values.
pub fn nanstd(values: &[f64]) -> f64 {
    let mean = nanmean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (ss, n) = values
        .iter()
        .filter(|x| !x.is_nan())
        .fold((0.0, 0usize), |(s, n), x| (s + (x - mean).powi(2), n + 1));
    (ss / n as f64).sqrt()
}

/// Median of index differences divided by the sample rate, as a duration in seconds.
pub fn median_duration(diffs: &[usize], sample_rate: f64) -> f64 {
    let v: Vec<f64> = diffs.iter().map(|&d| d as f64).collect();
    nanmedian(&v) / sample_rate
}

/// Round to `decimals` places; NaN passes through.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// First differences.
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// First differences of an index sequence (assumed ascending).
pub fn diff_indices(values: &[usize]) -> Vec<usize> {
    values.windows(2).map(|w| w[1].saturating_sub(w[0])).collect()
}

/// Sort and deduplicate.
pub fn sorted_unique(mut values: Vec<usize>) -> Vec<usize> {
    values.sort_unstable();
    values.dedup();
    values
}

/// Last element of `sorted` strictly below `bound`.
pub fn last_before(sorted: &[usize], bound: usize) -> Option<usize> {
    let pos = sorted.partition_point(|&x| x < bound);
    if pos == 0 {
        None
    } else {
        Some(sorted[pos - 1])
    }
}

/// First element of `sorted` strictly above `bound`.
pub fn first_after(sorted: &[usize], bound: usize) -> Option<usize> {
    let pos = sorted.partition_point(|&x| x <= bound);
    sorted.get(pos).copied()
}

/// Whether `value` occurs in the ascending `sorted` slice.
pub fn contains_sorted(sorted: &[usize], value: usize) -> bool {
    sorted.binary_search(&value).is_ok()
}

/// Group an ascending index sequence into runs of consecutive integers,
/// returned as inclusive `(start, end)` pairs.
pub fn consecutive_runs(sorted: &[usize]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut iter = sorted.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let (mut start, mut prev) = (first, first);
    for idx in iter {
        if idx != prev + 1 {
            runs.push((start, prev));
            start = idx;
        }
        prev = idx;
    }
    runs.push((start, prev));
    runs
}

/// Indices where the mask is set.
pub fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

/// Boolean mask of length `len` with the given indices set (out-of-range ignored).
pub fn indices_to_mask(indices: &[usize], len: usize) -> Vec<bool> {
    let mut mask = vec![false; len];
    for &i in indices {
        if i < len {
            mask[i] = true;
        }
    }
    mask
}

/// Index of the maximum value in `values[range]`, first on ties, ignoring NaN.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the minimum value, first on ties, ignoring NaN.
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Unwrap a phase series (radians) so successive samples never jump by more than π.
pub fn unwrap(values: &[f64]) -> Vec<f64> {
    use std::f64::consts::PI;
    let mut out = Vec::with_capacity(values.len());
    let mut offset = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            let d = v - values[i - 1];
            if d > PI {
                offset -= 2.0 * PI * ((d + PI) / (2.0 * PI)).floor();
            } else if d < -PI {
                offset += 2.0 * PI * ((-d + PI) / (2.0 * PI)).floor();
            }
        }
        out.push(v + offset);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_nanmedian_ignores_nan() {
        assert_eq!(nanmedian(&[3.0, f64::NAN, 1.0, 2.0]), 2.0);
        assert_eq!(nanmedian(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(nanmedian(&[]).is_nan());
        assert!(nanmedian(&[f64::NAN]).is_nan());
    }

    #[test]
    fn test_nanmean_and_std() {
        assert_abs_diff_eq!(nanmean(&[1.0, 2.0, f64::NAN, 3.0]), 2.0);
        assert_abs_diff_eq!(nanstd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert!(nanmean(&[]).is_nan());
    }

    #[test]
    fn test_last_before_first_after() {
        let v = [10, 20, 30];
        assert_eq!(last_before(&v, 20), Some(10));
        assert_eq!(last_before(&v, 10), None);
        assert_eq!(first_after(&v, 20), Some(30));
        assert_eq!(first_after(&v, 30), None);
        assert_eq!(first_after(&v, 0), Some(10));
    }

    #[test]
    fn test_consecutive_runs() {
        assert_eq!(
            consecutive_runs(&[1, 2, 3, 7, 8, 12]),
            vec![(1, 3), (7, 8), (12, 12)]
        );
        assert!(consecutive_runs(&[]).is_empty());
    }

    #[test]
    fn test_argmax_argmin_first_on_tie() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmin(&[2.0, 0.0, 0.0, 5.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_unwrap_removes_jumps() {
        use std::f64::consts::PI;
        let wrapped = [PI - 0.1, -PI + 0.1, -PI + 0.3];
        let u = unwrap(&wrapped);
        assert_abs_diff_eq!(u[1], PI + 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(u[2], PI + 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.2345, 2), 1.23);
        assert!(round_to(f64::NAN, 1).is_nan());
    }
}
