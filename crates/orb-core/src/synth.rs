//! Synthetic cursor streams for exercising the controller without a desktop.
//!
//! Every generated stimulus is a `cursor_movement` in test mode carrying its
//! pattern name and iteration in `meta`, so no two stimuli share a cache key.

use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::stimulus::Stimulus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Constant drift of (+5, +2) per step, clamped to the screen.
    Linear,
    /// Circle of radius 100 around the screen center.
    Oscillate,
    /// Bounded random walk with steps in [-10, 10].
    RandomWalk,
    /// NW, NE, SE, SW, repeated, with a slow diagonal drift.
    QuadrantLoop,
    /// Slow drift punctuated by reflections across the vertical center line.
    MirrorJump,
}

impl Pattern {
    pub const ALL: [Pattern; 5] = [
        Pattern::Linear,
        Pattern::Oscillate,
        Pattern::RandomWalk,
        Pattern::QuadrantLoop,
        Pattern::MirrorJump,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pattern::Linear => "linear",
            Pattern::Oscillate => "oscillate",
            Pattern::RandomWalk => "random-walk",
            Pattern::QuadrantLoop => "quadrant-loop",
            Pattern::MirrorJump => "mirror-jump",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Pattern::ALL.iter().map(|p| p.name()).collect();
                format!("unknown pattern '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Endless stimulus stream for one pattern.
#[derive(Debug, Clone)]
pub struct StimulusGenerator {
    pattern: Pattern,
    width: f64,
    height: f64,
    iteration: u64,
    last: Option<[f64; 2]>,
    next_jump: u64,
    rng: SmallRng,
}

impl StimulusGenerator {
    pub fn new(pattern: Pattern, width: f64, height: f64, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let next_jump = rng.random_range(50..=100);
        Self {
            pattern,
            width,
            height,
            iteration: 0,
            last: None,
            next_jump,
            rng,
        }
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    fn clamp(&self, x: f64, y: f64) -> [f64; 2] {
        [x.clamp(0.0, self.width), y.clamp(0.0, self.height)]
    }

    fn step(&mut self) -> ([f64; 2], f64) {
        let (cx, cy) = (self.width / 2.0, self.height / 2.0);
        let i = self.iteration;
        match (self.pattern, self.last) {
            (Pattern::Linear, None) => ([0.0, 0.0], 29f64.sqrt()),
            (Pattern::Linear, Some([x, y])) => (self.clamp(x + 5.0, y + 2.0), 29f64.sqrt()),
            (Pattern::Oscillate, _) => {
                let t = i as f64 * 0.1;
                ([cx + 100.0 * t.sin(), cy + 100.0 * t.cos()], 10.0)
            }
            (Pattern::RandomWalk, None) => ([cx, cy], 5.0),
            (Pattern::RandomWalk, Some([x, y])) => {
                let dx = self.rng.random_range(-10.0..=10.0);
                let dy = self.rng.random_range(-10.0..=10.0);
                (self.clamp(x + dx, y + dy), f64::hypot(dx, dy))
            }
            (Pattern::QuadrantLoop, _) => {
                let corners = [
                    (0.25, 0.25), // NW
                    (0.75, 0.25), // NE
                    (0.75, 0.75), // SE
                    (0.25, 0.75), // SW
                ];
                let (fx, fy) = corners[(i % 4) as usize];
                let drift = ((i / 4) % 50) as f64 * 2.0;
                (
                    self.clamp(fx * self.width + drift, fy * self.height + drift),
                    8.0,
                )
            }
            (Pattern::MirrorJump, None) => ([cx, cy], 50.0),
            (Pattern::MirrorJump, Some([x, y])) => {
                if i >= self.next_jump {
                    self.next_jump = i + self.rng.random_range(50..=100);
                    (self.clamp(self.width - x, y), 50.0)
                } else {
                    (self.clamp(x + 3.0, y + 1.0), 10f64.sqrt())
                }
            }
        }
    }
}

impl Iterator for StimulusGenerator {
    type Item = Stimulus;

    fn next(&mut self) -> Option<Stimulus> {
        let ([x, y], velocity) = self.step();
        self.last = Some([x, y]);
        let stimulus = Stimulus::cursor(x, y, velocity)
            .in_test_mode()
            .with_meta("pattern", self.pattern.name())
            .with_meta("iteration", self.iteration);
        self.iteration += 1;
        Some(stimulus)
    }
}
