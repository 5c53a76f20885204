//! Gait-phase segmentation.
//!
//! Each of the seven phases runs from a "from" event to the next "to" event
//! of the same foot. The same interval fill serves every phase; only the
//! event pair differs:
//!
//! | Phase            | From                | To                  |
//! |------------------|---------------------|---------------------|
//! | Loading Response | Initial Contact     | Mid-Stance Onset    |
//! | Mid-Stance       | Mid-Stance Onset    | Heel-Off            |
//! | Terminal Stance  | Heel-Off            | Pre-Swing Onset     |
//! | Pre-Swing        | Pre-Swing Onset     | Terminal Contact    |
//! | Initial Swing    | Terminal Contact    | Mid-Swing Onset     |
//! | Mid-Swing        | Mid-Swing Onset     | Terminal-Swing Onset|
//! | Terminal Swing   | Terminal-Swing Onset| Initial Contact     |
//!
//! Intervals are half-open `[from, to)`, so consecutive phases meet at the
//! event sample without overlapping.

use serde::{Deserialize, Serialize};

use crate::stats::{first_after, mask_indices};
use crate::types::{FootEvents, GaitEvents, Side};

/// The seven named gait phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GaitPhase {
    LoadingResponse,
    MidStance,
    TerminalStance,
    PreSwing,
    InitialSwing,
    MidSwing,
    TerminalSwing,
}

impl GaitPhase {
    /// All phases in gait-cycle order starting at Initial Contact.
    pub const ALL: [GaitPhase; 7] = [
        GaitPhase::LoadingResponse,
        GaitPhase::MidStance,
        GaitPhase::TerminalStance,
        GaitPhase::PreSwing,
        GaitPhase::InitialSwing,
        GaitPhase::MidSwing,
        GaitPhase::TerminalSwing,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GaitPhase::LoadingResponse => "Loading Response",
            GaitPhase::MidStance => "Mid-Stance",
            GaitPhase::TerminalStance => "Terminal-Stance",
            GaitPhase::PreSwing => "Pre-Swing",
            GaitPhase::InitialSwing => "Initial-Swing",
            GaitPhase::MidSwing => "Mid-Swing",
            GaitPhase::TerminalSwing => "Terminal-Swing",
        }
    }

    /// `(from, to)` event sequences delimiting this phase.
    pub fn bounds(self, events: &FootEvents) -> (&[usize], &[usize]) {
        match self {
            GaitPhase::LoadingResponse => (&events.initial_contact, &events.mid_stance_onset),
            GaitPhase::MidStance => (&events.mid_stance_onset, &events.heel_off),
            GaitPhase::TerminalStance => (&events.heel_off, &events.pre_swing_onset),
            GaitPhase::PreSwing => (&events.pre_swing_onset, &events.terminal_contact),
            GaitPhase::InitialSwing => (&events.terminal_contact, &events.mid_swing_onset),
            GaitPhase::MidSwing => (&events.mid_swing_onset, &events.terminal_swing_onset),
            GaitPhase::TerminalSwing => (&events.terminal_swing_onset, &events.initial_contact),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Mark `[f, t)` for every `f` in `from`, where `t` is the first element of
/// `to` strictly greater than `f`. A `from` event with no later `to` event
/// marks nothing. Intervals are clipped to `len`.
pub fn fill_between(from: &[usize], to: &[usize], len: usize) -> Vec<bool> {
    let mut mask = vec![false; len];
    for &start in from {
        let Some(end) = first_after(to, start) else {
            continue;
        };
        let end = end.min(len);
        if start < end {
            mask[start..end].iter_mut().for_each(|m| *m = true);
        }
    }
    mask
}

/// Per-sample phase masks of one foot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootPhases {
    masks: Vec<Vec<bool>>,
    len: usize,
}

impl FootPhases {
    /// Segment a foot's events over a series of `len` samples.
    pub fn segment(events: &FootEvents, len: usize) -> Self {
        let masks = GaitPhase::ALL
            .iter()
            .map(|phase| {
                let (from, to) = phase.bounds(events);
                fill_between(from, to, len)
            })
            .collect();
        Self { masks, len }
    }

    /// Boolean mask of one phase.
    pub fn mask(&self, phase: GaitPhase) -> &[bool] {
        self.masks.get(phase.slot()).map_or(&[][..], Vec::as_slice)
    }

    /// Sample indices of one phase.
    pub fn indices(&self, phase: GaitPhase) -> Vec<usize> {
        mask_indices(self.mask(phase))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Phase masks of both feet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaitPhases {
    pub left: FootPhases,
    pub right: FootPhases,
}

impl GaitPhases {
    pub fn segment(events: &GaitEvents, len: usize) -> Self {
        Self {
            left: FootPhases::segment(&events.left, len),
            right: FootPhases::segment(&events.right, len),
        }
    }

    pub fn foot(&self, side: Side) -> &FootPhases {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}
