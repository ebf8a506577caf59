//! Per-stimulus orchestration.
//!
//! `OrbController` owns every piece of mutable state (field, evidence, habit
//! window) and is driven one stimulus at a time through `tick`. Hosts that
//! share it across tasks wrap it in a single lock; nothing in here is
//! internally synchronized.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;

use crate::arbiter::{ArbiterSignals, Mode, ModeArbiter};
use crate::cache::{MemoryCache, NullTrace, PulseCache, TraceEntry, TraceSink};
use crate::config::{ConfigError, OrbConfig};
use crate::constants::{
    HABIT_SUCCESS_CONFIDENCE, HYPOTHESIS_GUARD, HYPOTHESIS_HABIT, HYPOTHESIS_JUMP,
    NEIGHBOR_RADIUS,
};
use crate::events::{FieldEvent, PurgeReport};
use crate::evidence::EvidenceTracker;
use crate::field::{FieldPulse, SpatialField};
use crate::habit::HabitTracker;
use crate::necessity::NecessityCheck;
use crate::neighbors::NeighborQuery;
use crate::node::Node;
use crate::pulse::{Pulse, PulseSource, SpatialCoordinate};
use crate::shadow::{DigestShadows, Shadow, ShadowSource};
use crate::snapshot::{FieldSnapshot, SnapshotError};
use crate::stimulus::{SURVEILLANCE, Stimulus, StimulusError, StimulusKey};
use crate::time::now_unix_secs_f64;

/// (hypothesis, prior, evidence strength) seeded at construction.
const SEED_PRIORS: [(&str, f64, f64); 3] = [
    (HYPOTHESIS_HABIT, 0.6, 1.2),
    (HYPOTHESIS_JUMP, 0.3, 0.8),
    (HYPOTHESIS_GUARD, 0.7, 1.5),
];
const SEED_RELIABILITY: f64 = 0.01;
const SHADOW_PRIOR: f64 = 0.5;

const HABIT_OUTCOME_WEIGHT: f64 = 0.7;
const JUMP_OUTCOME_WEIGHT: f64 = 0.6;
const GUARD_OUTCOME_WEIGHT: f64 = 0.5;

/// Running counters since construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerStats {
    pub ticks: u64,
    /// Stimuli refused by the sovereignty gate.
    pub rejected: u64,
    /// Pulses served from the crystallization cache.
    pub crystallized: u64,
    pub modes: BTreeMap<Mode, u64>,
}

pub struct OrbController {
    config: OrbConfig,
    field: SpatialField,
    evidence: EvidenceTracker,
    habits: HabitTracker,
    arbiter: ModeArbiter,
    shadows: Box<dyn ShadowSource>,
    cache: Box<dyn PulseCache>,
    trace: Box<dyn TraceSink>,
    stats: ControllerStats,
}

impl OrbController {
    /// Validate `config` and build a controller with an in-memory cache, no
    /// trace and the default digest shadows.
    pub fn new(config: OrbConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let field = SpatialField::new(config.field.clone())?;
        let mut controller = Self {
            evidence: EvidenceTracker::new(config.evidence.clone()),
            habits: HabitTracker::new(&config.arbiter),
            arbiter: ModeArbiter::new(config.arbiter.clone(), &config.field),
            field,
            shadows: Box::new(DigestShadows::default()),
            cache: Box::new(MemoryCache::new()),
            trace: Box::new(NullTrace),
            stats: ControllerStats::default(),
            config,
        };
        controller.seed_priors();
        Ok(controller)
    }

    pub fn with_cache(mut self, cache: impl PulseCache + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    pub fn with_trace(mut self, trace: impl TraceSink + 'static) -> Self {
        self.trace = Box::new(trace);
        self
    }

    pub fn with_shadows(mut self, shadows: impl ShadowSource + 'static) -> Self {
        self.shadows = Box::new(shadows);
        self
    }

    fn seed_priors(&mut self) {
        for (hypothesis, prior, strength) in SEED_PRIORS {
            self.evidence.set_prior(hypothesis, prior, strength);
            self.evidence.add_evidence(
                hypothesis,
                &format!("seed_{hypothesis}"),
                prior,
                "init",
                SEED_RELIABILITY,
            );
        }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    pub fn field(&self) -> &SpatialField {
        &self.field
    }

    pub fn evidence(&self) -> &EvidenceTracker {
        &self.evidence
    }

    pub fn habits(&self) -> &HabitTracker {
        &self.habits
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Process one stimulus.
    ///
    /// Returns `Ok(None)` when the sovereignty gate refuses the stimulus and
    /// a pulse otherwise, either freshly computed or replayed from the cache.
    /// A replayed stimulus has still been mapped into the field.
    pub fn tick(
        &mut self,
        stimulus: &Stimulus,
        rng: &mut impl Rng,
    ) -> Result<Option<Pulse>, StimulusError> {
        stimulus.validate()?;
        if !Self::sovereign(stimulus) {
            self.stats.rejected += 1;
            tracing::warn!(kind = %stimulus.kind, "sovereignty gate refused stimulus");
            return Ok(None);
        }
        self.stats.ticks += 1;

        self.habits.record_observation(stimulus);
        let key = self.field.map(stimulus);

        let necessity = NecessityCheck::check(&self.field, self.arbiter.config());
        let prediction = if necessity.jump_triggered {
            None
        } else {
            self.habits.predict_next()
        };

        let stimulus_key = stimulus.key();
        if let Some(cached) = self.cache.lookup(&stimulus_key) {
            let pulse = cached.crystallized();
            self.stats.crystallized += 1;
            self.finish(&stimulus_key, &pulse);
            tracing::debug!(key = %stimulus_key, "crystallized bypass");
            return Ok(Some(pulse));
        }

        let shadows = self.shadows.shadows(stimulus);
        let epistemic_bayes = self.fold_shadows(&shadows);

        let decision = self.arbiter.arbitrate(ArbiterSignals {
            prediction,
            necessity: Some(necessity),
            habit_posterior: self.evidence.posterior(HYPOTHESIS_HABIT).unwrap_or(0.0),
            jump_posterior: self.evidence.posterior(HYPOTHESIS_JUMP).unwrap_or(0.0),
            guard_posterior: self.evidence.posterior(HYPOTHESIS_GUARD).unwrap_or(0.0),
            live_density: self.field.size(),
            breach_density: self.field.last_density_breach(),
        });

        let neighbors = NeighborQuery::neighbors(&self.field, &key, NEIGHBOR_RADIUS, rng);
        for n in &neighbors {
            self.field.note_adjacency(&n.key, n.adjacency);
        }
        let node = self
            .field
            .get(&key)
            .expect("map keeps the touched node resident through any purge");
        let dimension = self.field.config().dimension;
        let vector = if neighbors.is_empty() {
            vec![0.0; dimension]
        } else {
            let members: Vec<&Node> = neighbors
                .iter()
                .filter_map(|n| self.field.get(&n.key))
                .chain(std::iter::once(node))
                .collect();
            NeighborQuery::weighted_vector(members, dimension)
        };

        let confidence = ModeArbiter::confidence(&decision, shadows.len(), &vector);
        let epistemic_alignment = if shadows.is_empty() {
            0.0
        } else {
            shadows.iter().map(|s| s.confidence).sum::<f64>() / shadows.len() as f64
        };

        let pulse = Pulse {
            cognitive_mode: decision.mode,
            glow_intensity: confidence,
            field_density: decision.effective_density,
            jump_vector: decision.necessity.as_ref().and_then(|n| n.vector),
            predictive_intent: decision.prediction.clone(),
            bayes_habit_prob: decision.habit_posterior,
            bayes_jump_prob: decision.jump_posterior,
            bayes_guard_prob: decision.guard_posterior,
            epistemic_bayes,
            epistemic_alignment,
            deterministic: confidence > 0.95,
            spatial: SpatialCoordinate::from(node),
            source: PulseSource::Computed,
        };

        self.feed_outcomes(
            decision.mode,
            decision.prediction.as_ref().map_or(0.0, |p| p.confidence),
            decision.jump_triggered,
        );
        self.cache.store(&stimulus_key, &pulse);
        self.finish(&stimulus_key, &pulse);
        tracing::debug!(
            mode = %pulse.cognitive_mode,
            confidence,
            density = pulse.field_density,
            "pulse"
        );
        Ok(Some(pulse))
    }

    /// Surveillance stimuli pass only when explicitly marked as test traffic.
    fn sovereign(stimulus: &Stimulus) -> bool {
        stimulus.is_test_mode() || stimulus.kind != SURVEILLANCE
    }

    /// Add each shadow as evidence for its persistence hypothesis and read the
    /// posterior back.
    fn fold_shadows(&mut self, shadows: &[Shadow]) -> BTreeMap<String, f64> {
        let tick = self.stats.ticks;
        let mut view = BTreeMap::new();
        for shadow in shadows {
            let hypothesis = format!("{}_pattern_persistence", shadow.name);
            if !self.evidence.has_prior(&hypothesis) {
                self.evidence.set_prior(&hypothesis, SHADOW_PRIOR, 1.0);
            }
            self.evidence.add_evidence(
                &hypothesis,
                &format!("stim_{tick}_{}", shadow.name),
                shadow.confidence,
                &shadow.name,
                shadow.reliability,
            );
            let posterior = self
                .evidence
                .posterior(&hypothesis)
                .unwrap_or(shadow.confidence);
            view.insert(shadow.name.clone(), posterior);
        }
        view
    }

    fn feed_outcomes(&mut self, mode: Mode, prediction_confidence: f64, jump_triggered: bool) {
        let habit_success = matches!(mode, Mode::Habit | Mode::GuardHabit)
            && prediction_confidence > HABIT_SUCCESS_CONFIDENCE;
        let jump_success = mode == Mode::IntuitionJump && jump_triggered;
        let guard_success = mode == Mode::Guard && !habit_success && !jump_success;

        self.evidence
            .record_outcome(HYPOTHESIS_HABIT, habit_success, HABIT_OUTCOME_WEIGHT);
        self.evidence
            .record_outcome(HYPOTHESIS_JUMP, jump_success, JUMP_OUTCOME_WEIGHT);
        self.evidence
            .record_outcome(HYPOTHESIS_GUARD, guard_success, GUARD_OUTCOME_WEIGHT);
    }

    fn finish(&mut self, key: &StimulusKey, pulse: &Pulse) {
        *self.stats.modes.entry(pulse.cognitive_mode).or_default() += 1;
        self.trace.record(TraceEntry {
            timestamp: now_unix_secs_f64(),
            stimulus_key: key.clone(),
            mode: pulse.cognitive_mode,
            confidence: pulse.glow_intensity,
            field_density: pulse.field_density,
            source: pulse.source,
        });
    }

    /// Idle forgetting with the configured factor and floor.
    pub fn decay(&mut self) {
        let (factor, floor) = (self.config.decay.factor, self.config.decay.floor);
        self.field.decay(factor, floor);
    }

    /// Manual density reset. No-op while the field is below its trigger.
    pub fn emergency_purge(&mut self) -> Option<PurgeReport> {
        let report = self.field.purge();
        if let Some(r) = &report {
            tracing::warn!(before = r.before, kept = r.kept, "emergency purge");
        }
        report
    }

    pub fn pulse_phase(&mut self) -> FieldPulse {
        self.field.pulse()
    }

    pub fn take_events(&mut self) -> Vec<FieldEvent> {
        self.field.take_events()
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot::capture(&self.field)
    }

    pub fn restore(&mut self, snapshot: FieldSnapshot) -> Result<usize, SnapshotError> {
        snapshot.restore_into(&mut self.field)
    }

    pub fn flush_trace(&mut self) {
        self.trace.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTrace;
    use crate::config::FieldConfig;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::{Arc, Mutex};

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn controller() -> OrbController {
        OrbController::new(OrbConfig::default()).unwrap()
    }

    /// Trace sink that shares its entries with the test.
    #[derive(Clone, Default)]
    struct SharedTrace(Arc<Mutex<Vec<TraceEntry>>>);

    impl TraceSink for SharedTrace {
        fn record(&mut self, entry: TraceEntry) {
            self.0.lock().unwrap().push(entry);
        }
    }

    #[test]
    fn test_seed_priors() {
        let c = controller();
        let habit = c.evidence().prior(HYPOTHESIS_HABIT).unwrap();
        assert_eq!(habit.probability, 0.6);
        assert_eq!(habit.evidence_strength, 1.2);
        assert_eq!(c.evidence().evidence_count(HYPOTHESIS_GUARD), 1);
    }

    #[test]
    fn test_first_tick_produces_pulse() {
        let mut c = controller();
        let pulse = c
            .tick(&Stimulus::cursor(100.0, 200.0, 5.0), &mut rng())
            .unwrap()
            .unwrap();
        assert_eq!(pulse.source, PulseSource::Computed);
        assert_eq!(pulse.field_density, 1);
        assert_eq!(pulse.epistemic_bayes.len(), 4);
        assert!(pulse.glow_intensity >= 0.85 && pulse.glow_intensity <= 0.99);
        assert_eq!(pulse.deterministic, pulse.glow_intensity > 0.95);
        assert_eq!(pulse.spatial.coordinates.len(), 18);
        assert_eq!(c.stats().ticks, 1);
    }

    #[test]
    fn test_surveillance_stimulus_refused_unless_test_mode() {
        let mut c = controller();
        let mut covert = Stimulus::cursor(1.0, 1.0, 0.0);
        covert.kind = SURVEILLANCE.to_string();
        assert_eq!(c.tick(&covert, &mut rng()).unwrap(), None);
        assert_eq!(c.stats().rejected, 1);
        assert!(c.field().is_empty());

        let allowed = covert.in_test_mode();
        assert!(c.tick(&allowed, &mut rng()).unwrap().is_some());
    }

    #[test]
    fn test_every_tick_through_purges_reports_the_touched_node() {
        let config = OrbConfig {
            field: FieldConfig {
                dimension: 4,
                hard_cap: 40,
                trigger_threshold: 30,
                release_threshold: 20,
                ..FieldConfig::default()
            },
            ..OrbConfig::default()
        };
        let mut c = OrbController::new(config).unwrap();
        let mut r = rng();
        for i in 0..120 {
            let s = Stimulus::cursor(i as f64 * 11.0, i as f64 * 3.0, 1.0);
            let pulse = c.tick(&s, &mut r).unwrap().unwrap();
            assert!(c.field().contains(&pulse.spatial.node));
            assert!(c.field().size() <= 40);
        }
        assert!(
            c.take_events()
                .iter()
                .any(|e| matches!(e, crate::events::FieldEvent::Purged(_)))
        );
    }

    #[test]
    fn test_invalid_stimulus_is_an_error() {
        let mut c = controller();
        let bad = Stimulus::cursor(f64::NAN, 1.0, 0.0);
        assert!(matches!(
            c.tick(&bad, &mut rng()),
            Err(StimulusError::NonFiniteCoordinate { axis: 0, .. })
        ));
        assert!(c.field().is_empty());
    }

    #[test]
    fn test_repeat_stimulus_is_crystallized() {
        let trace = SharedTrace::default();
        let mut c = controller().with_trace(trace.clone());
        let s = Stimulus::cursor(300.0, 300.0, 2.0);
        let first = c.tick(&s, &mut rng()).unwrap().unwrap();
        let second = c.tick(&s, &mut rng()).unwrap().unwrap();

        assert_eq!(second.source, PulseSource::Crystallized);
        assert_eq!(second.cognitive_mode, first.cognitive_mode);
        assert_eq!(c.stats().crystallized, 1);
        // Mapped both times: occupancy grew.
        assert_eq!(c.field().get(&first.spatial.node).unwrap().occupancy, 2);

        let entries = trace.0.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].source, PulseSource::Crystallized);
    }

    #[test]
    fn test_shadow_hypotheses_created() {
        let mut c = controller();
        c.tick(&Stimulus::cursor(5.0, 5.0, 1.0), &mut rng()).unwrap();
        for lens in crate::shadow::DEFAULT_LENSES {
            let h = format!("{lens}_pattern_persistence");
            assert_eq!(c.evidence().evidence_count(&h), 1);
        }
    }

    #[test]
    fn test_failed_habit_outcome_lowers_prior() {
        let mut c = controller();
        // The first tick has no habit prediction and nothing forcing a jump,
        // but the seeded habit posterior (0.6) promotes GUARD to HABIT.
        let pulse = c
            .tick(&Stimulus::cursor(5.0, 5.0, 1.0), &mut rng())
            .unwrap()
            .unwrap();
        assert_eq!(pulse.cognitive_mode, Mode::Habit);
        // Habit failed (no prediction): prior pulled toward 0.
        let habit = c.evidence().prior(HYPOTHESIS_HABIT).unwrap().probability;
        assert!((habit - 0.6 * 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_density_stays_bounded_with_small_field() {
        let config = OrbConfig {
            field: FieldConfig {
                dimension: 4,
                hard_cap: 30,
                trigger_threshold: 24,
                release_threshold: 18,
                ..FieldConfig::default()
            },
            ..OrbConfig::default()
        };
        let mut c = OrbController::new(config).unwrap().with_cache(crate::cache::NoCache);
        let mut r = rng();
        for i in 0..200 {
            let s = Stimulus::cursor(i as f64, 2.0 * i as f64, 1.0).with_meta("i", i);
            c.tick(&s, &mut r).unwrap();
            assert!(c.field().size() <= 30);
        }
        assert!(c
            .take_events()
            .iter()
            .any(|e| matches!(e, FieldEvent::Purged(_))));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut c = controller();
        let mut r = rng();
        for i in 0..10 {
            c.tick(&Stimulus::cursor(i as f64, 0.0, 1.0), &mut r).unwrap();
        }
        let snapshot = c.snapshot();
        let mut fresh = controller();
        assert_eq!(fresh.restore(snapshot).unwrap(), 10);
        assert_eq!(fresh.field().size(), 10);
    }

    #[test]
    fn test_memory_trace_usable_as_sink() {
        let mut c = controller().with_trace(MemoryTrace::default());
        c.tick(&Stimulus::cursor(1.0, 1.0, 1.0), &mut rng()).unwrap();
        c.flush_trace();
        assert_eq!(c.stats().modes.values().sum::<u64>(), 1);
    }
}
