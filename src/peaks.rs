//! Peak detection.
//!
//! Local maxima with optional height, minimum-distance and prominence
//! criteria. Flat peaks resolve to their middle sample (lower middle for an
//! even plateau). Criteria apply in the order height, distance, prominence;
//! the distance criterion keeps taller peaks first.

use serde::{Deserialize, Serialize};

/// Selection criteria for [`find_peaks`]. `None` disables a criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakCriteria {
    /// Minimum peak height.
    pub height: Option<f64>,
    /// Minimum horizontal distance between kept peaks, in samples.
    pub distance: Option<f64>,
    /// Minimum topographic prominence.
    pub prominence: Option<f64>,
}

impl PeakCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(mut self, h: f64) -> Self {
        self.height = Some(h);
        self
    }

    pub fn distance(mut self, d: f64) -> Self {
        self.distance = Some(d);
        self
    }

    pub fn prominence(mut self, p: f64) -> Self {
        self.prominence = Some(p);
        self
    }
}

/// Indices of the peaks of `x` satisfying `criteria`, ascending.
pub fn find_peaks(x: &[f64], criteria: &PeakCriteria) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(h) = criteria.height {
        peaks.retain(|&p| x[p] >= h);
    }
    if let Some(d) = criteria.distance {
        peaks = select_by_distance(x, &peaks, d.ceil().max(1.0) as usize);
    }
    if let Some(p) = criteria.prominence {
        peaks.retain(|&peak| prominence(x, peak) >= p);
    }
    peaks
}

/// Prominence of the peak at `peak`: height above the higher of the two
/// lowest points reachable on either side without climbing above the peak.
pub fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];

    let mut left_min = height;
    let mut i = peak;
    loop {
        if x[i] > height {
            break;
        }
        left_min = left_min.min(x[i]);
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let mut right_min = height;
    for &v in &x[peak..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let n = peaks.len();
    let mut keep = vec![true; n];

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < n && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_simple_maxima() {
        let x = [0.0, 1.0, 0.0, 2.0, 0.0, 1.5, 0.0];
        assert_eq!(find_peaks(&x, &PeakCriteria::new()), vec![1, 3, 5]);
    }

    #[test]
    fn test_edges_are_never_peaks() {
        let x = [5.0, 1.0, 0.0, 1.0, 5.0];
        assert!(find_peaks(&x, &PeakCriteria::new()).is_empty());
    }

    #[test]
    fn test_plateau_midpoint() {
        let x = [0.0, 1.0, 2.0, 2.0, 2.0, 2.0, 1.0, 0.0];
        assert_eq!(find_peaks(&x, &PeakCriteria::new()), vec![3]);
    }

    #[test]
    fn test_height_filter() {
        let x = [0.0, 0.2, 0.0, 0.5, 0.0];
        assert_eq!(find_peaks(&x, &PeakCriteria::new().height(0.3)), vec![3]);
    }

    #[test]
    fn test_distance_keeps_taller_peak() {
        let x = [0.0, 1.0, 0.0, 3.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let peaks = find_peaks(&x, &PeakCriteria::new().distance(3.0));
        assert_eq!(peaks, vec![3, 9]);
    }

    #[test]
    fn test_prominence_value() {
        let x = [0.0, 3.0, 1.0, 2.0, 0.5, 0.0];
        assert_abs_diff_eq!(prominence(&x, 1), 3.0);
        assert_abs_diff_eq!(prominence(&x, 3), 1.0);
        assert_eq!(find_peaks(&x, &PeakCriteria::new().prominence(1.5)), vec![1]);
    }

    #[test]
    fn test_short_input() {
        assert!(find_peaks(&[], &PeakCriteria::new()).is_empty());
        assert!(find_peaks(&[1.0, 2.0], &PeakCriteria::new()).is_empty());
    }
}
