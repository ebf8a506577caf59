//! Constant-conjunction habit tracker.
//!
//! Cursor positions are reduced to screen quadrants. Every observation that
//! follows at least three others records the conjunction
//! `(previous three quadrants) -> quadrant`; the prediction for the current
//! three-quadrant context is its most frequently observed successor.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ArbiterConfig;
use crate::stimulus::Stimulus;

const CONTEXT_LEN: usize = 3;
const SATURATION_COUNT: f64 = 10.0;
const UNSURE_CONFIDENCE: f64 = 0.3;
const UNSURE_VIVACITY: f64 = 0.4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    NW,
    NE,
    SW,
    SE,
}

impl Quadrant {
    /// Tie-break order for successors with equal counts.
    pub const ALL: [Quadrant; 4] = [Quadrant::NW, Quadrant::NE, Quadrant::SW, Quadrant::SE];

    /// Quadrant of `(x, y)` relative to the screen center; north is `y < cy`.
    pub fn from_point(x: f64, y: f64, width: f64, height: f64) -> Self {
        let west = x < width / 2.0;
        let north = y < height / 2.0;
        match (north, west) {
            (true, true) => Quadrant::NW,
            (true, false) => Quadrant::NE,
            (false, true) => Quadrant::SW,
            (false, false) => Quadrant::SE,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quadrant::NW => "NW",
            Quadrant::NE => "NE",
            Quadrant::SW => "SW",
            Quadrant::SE => "SE",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionKind {
    QuadrantTransition,
    Unsure,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "prediction_type")]
    pub kind: PredictionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Quadrant>,
    pub confidence: f64,
    pub vivacity: f64,
}

impl Prediction {
    fn unsure() -> Self {
        Self {
            kind: PredictionKind::Unsure,
            target: None,
            confidence: UNSURE_CONFIDENCE,
            vivacity: UNSURE_VIVACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HabitTracker {
    screen: (f64, f64),
    window: VecDeque<Quadrant>,
    capacity: usize,
    /// Successor counts per 3-quadrant context, indexed by `Quadrant::index`.
    conjunctions: BTreeMap<[Quadrant; CONTEXT_LEN], [u32; 4]>,
}

impl HabitTracker {
    pub fn new(config: &ArbiterConfig) -> Self {
        let capacity = config.habit_window.max(CONTEXT_LEN + 1);
        Self {
            screen: (config.screen_width, config.screen_height),
            window: VecDeque::with_capacity(capacity),
            capacity,
            conjunctions: BTreeMap::new(),
        }
    }

    /// Record a cursor movement. Other stimulus kinds are ignored (`None`).
    pub fn record_observation(&mut self, stimulus: &Stimulus) -> Option<Quadrant> {
        if !stimulus.is_cursor_movement() {
            return None;
        }
        let [x, y] = stimulus.coordinates;
        let quadrant = Quadrant::from_point(x, y, self.screen.0, self.screen.1);
        self.observe(quadrant);
        Some(quadrant)
    }

    /// Push a quadrant directly.
    pub fn observe(&mut self, quadrant: Quadrant) {
        if let Some(context) = self.context() {
            self.conjunctions.entry(context).or_default()[quadrant.index()] += 1;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(quadrant);
    }

    /// The last three observed quadrants, oldest first.
    fn context(&self) -> Option<[Quadrant; CONTEXT_LEN]> {
        let len = self.window.len();
        if len < CONTEXT_LEN {
            return None;
        }
        let mut context = [Quadrant::NW; CONTEXT_LEN];
        for (slot, q) in context.iter_mut().zip(self.window.range(len - CONTEXT_LEN..)) {
            *slot = *q;
        }
        Some(context)
    }

    /// `None` with fewer than three observations; `Unsure` when the current
    /// context has never been followed by anything.
    pub fn predict_next(&self) -> Option<Prediction> {
        let context = self.context()?;
        let Some(counts) = self.conjunctions.get(&context) else {
            return Some(Prediction::unsure());
        };

        let mut best: Option<(Quadrant, u32)> = None;
        for q in Quadrant::ALL {
            let count = counts[q.index()];
            if count > 0 && best.is_none_or(|(_, c)| count > c) {
                best = Some((q, count));
            }
        }
        let Some((target, count)) = best else {
            return Some(Prediction::unsure());
        };

        let confidence = (count as f64 / SATURATION_COUNT).min(1.0);
        Some(Prediction {
            kind: PredictionKind::QuadrantTransition,
            target: Some(target),
            confidence,
            vivacity: (confidence * 1.2).min(1.0),
        })
    }

    pub fn observations(&self) -> usize {
        self.window.len()
    }

    /// Number of distinct contexts with recorded successors.
    pub fn known_patterns(&self) -> usize {
        self.conjunctions.len()
    }
}
