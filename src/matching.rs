//! Cross-modality event matching.
//!
//! Aligns events detected by two independent pipelines (markers vs. IMU, or
//! either vs. force plates) for validation. Matching is greedy: each event of
//! the first sequence takes its nearest partner in the second within a
//! symmetric window, and a partner may be claimed more than once.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GaitError, Result};
use crate::types::StrideRecord;

/// Matching window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Half-width of the matching window (s).
    pub window_s: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { window_s: 0.2 }
    }
}

impl MatchingConfig {
    /// Window half-width in samples at `sample_rate`.
    pub fn window_samples(&self, sample_rate: f64) -> Result<usize> {
        let window = self.window_s * sample_rate;
        if !window.is_finite() || window < 1.0 {
            return Err(GaitError::config(format!(
                "matching window of {} s at {sample_rate} Hz is under one sample",
                self.window_s
            )));
        }
        Ok(window as usize)
    }
}

/// Result of matching sequence `a` against sequence `b`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMatch {
    /// Events of `a` with a partner, in `a` order.
    pub matched_a: Vec<usize>,
    /// Partner in `b` of each entry of `matched_a`.
    pub matched_b: Vec<usize>,
    /// Events of `a` without a partner (falsely detected by `a`).
    pub unmatched_a: Vec<usize>,
    /// Events of `b` never claimed (missed by `a`).
    pub unmatched_b: Vec<usize>,
}

impl EventMatch {
    pub fn len(&self) -> usize {
        self.matched_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched_a.is_empty()
    }

    /// `(a, b)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.matched_a.iter().copied().zip(self.matched_b.iter().copied())
    }

    /// Signed offset `a − b` per pair, in samples.
    pub fn offsets(&self) -> Vec<i64> {
        self.pairs().map(|(a, b)| a as i64 - b as i64).collect()
    }

    /// Partner of an `a` event.
    pub fn partner(&self, a: usize) -> Option<usize> {
        self.pairs().find(|&(x, _)| x == a).map(|(_, b)| b)
    }
}

/// Match every element of `a` to the nearest element of `b` lying in
/// `[a − window, a + window)`.
///
/// Equal distances resolve to the earlier `b` element.
pub fn match_events(a: &[usize], b: &[usize], window: usize) -> EventMatch {
    let mut result = EventMatch::default();
    for &event in a {
        let lo = event.saturating_sub(window);
        let hi = event + window;
        let nearest = b
            .iter()
            .copied()
            .filter(|&x| x >= lo && x < hi)
            .min_by_key(|&x| x.abs_diff(event));
        match nearest {
            Some(partner) => {
                result.matched_a.push(event);
                result.matched_b.push(partner);
            }
            None => result.unmatched_a.push(event),
        }
    }
    result.unmatched_b = b
        .iter()
        .copied()
        .filter(|x| !result.matched_b.contains(x))
        .collect();
    result
}

/// One stride seen by both modalities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StridePair {
    pub a: StrideRecord,
    pub b: StrideRecord,
}

impl StridePair {
    /// Value difference `a − b`.
    pub fn difference(&self) -> f64 {
        self.a.value - self.b.value
    }
}

/// Stride-by-stride comparison of two modalities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrideComparison {
    /// Initial Contact (stride end) matching.
    pub initial_contact: EventMatch,
    /// Terminal Contact (stride start) matching.
    pub terminal_contact: EventMatch,
    /// Strides whose IC and TC were both matched.
    pub pairs: Vec<StridePair>,
}

impl StrideComparison {
    pub fn differences(&self) -> Vec<f64> {
        self.pairs.iter().map(StridePair::difference).collect()
    }
}

/// Pair strides of two modalities whose start (TC) and end (IC) were both
/// matched within `window` samples.
///
/// Records are `(TC, IC, value)`; a stride of `a` pairs with the `b` stride
/// ending at the partner of its IC, provided that stride starts at the
/// partner of its TC.
pub fn stride_by_stride(a: &[StrideRecord], b: &[StrideRecord], window: usize) -> StrideComparison {
    let ends = |s: &[StrideRecord]| s.iter().map(|r| r.end).collect::<Vec<_>>();
    let starts = |s: &[StrideRecord]| s.iter().map(|r| r.start).collect::<Vec<_>>();
    let initial_contact = match_events(&ends(a), &ends(b), window);
    let terminal_contact = match_events(&starts(a), &starts(b), window);

    let pairs: Vec<StridePair> = a
        .iter()
        .filter_map(|sa| {
            let end = initial_contact.partner(sa.end)?;
            let start = terminal_contact.partner(sa.start)?;
            let sb = b.iter().find(|r| r.end == end && r.start == start)?;
            Some(StridePair { a: *sa, b: *sb })
        })
        .collect();
    debug!(
        strides_a = a.len(),
        strides_b = b.len(),
        paired = pairs.len(),
        "Stride-by-stride comparison"
    );
    StrideComparison {
        initial_contact,
        terminal_contact,
        pairs,
    }
}
