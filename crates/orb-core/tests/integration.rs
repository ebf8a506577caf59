//! End-to-end behavior of the field, signal sources and controller through
//! the public API.

use orb_core::{
    ArbiterConfig, EvidenceConfig, EvidenceTracker, FieldConfig, FieldEvent, HabitTracker, Mode,
    NecessityCheck, Node, NodeKey, OrbConfig, OrbController, Pattern, PredictionKind, Quadrant,
    SpatialField, Stimulus, StimulusGenerator,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn rng() -> SmallRng {
    SmallRng::seed_from_u64(42)
}

fn unique(i: usize) -> Stimulus {
    Stimulus::cursor((i % 1920) as f64, (i * 7 % 1080) as f64, 2.0).with_meta("iteration", i)
}

fn purges(events: &[FieldEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, FieldEvent::Purged(_)))
        .count()
}

/// 800 distinct inserts reach the trigger and purge below the release
/// threshold; no further purge happens until density climbs back to 800.
#[test]
fn hysteresis_801_inserts() {
    let mut field = SpatialField::new(FieldConfig::default()).unwrap();

    for i in 0..799 {
        field.map(&unique(i));
    }
    assert_eq!(field.size(), 799);
    assert!(!field.purge_active());
    assert_eq!(purges(&field.take_events()), 0);

    let touched = field.map(&unique(799));
    assert!(field.purge_active());
    assert!(field.size() <= 650);
    assert!(field.contains(&touched));
    assert_eq!(field.last_density_breach(), 800);
    assert_eq!(field.effective_density(), 800);
    assert_eq!(purges(&field.take_events()), 1);

    field.map(&unique(800));
    let after_801 = field.size();
    assert!(after_801 <= 650);

    // Climb back up to one below the trigger: no purge on the way.
    let mut i = 801;
    while field.size() < 799 {
        field.map(&unique(i));
        i += 1;
    }
    assert_eq!(purges(&field.take_events()), 0);
    assert!(!field.purge_active());

    field.map(&unique(i));
    assert_eq!(purges(&field.take_events()), 1);
    assert!(field.size() <= 650);
}

#[test]
fn repetition_raises_vivacity_to_the_ceiling() {
    let mut field = SpatialField::new(FieldConfig::default()).unwrap();
    let s = Stimulus::cursor(42.0, 42.0, 1.0);
    let key = field.map(&s);
    let mut last = field.get(&key).unwrap().vivacity;
    let mut capped = false;
    for _ in 0..40 {
        field.map(&s);
        let v = field.get(&key).unwrap().vivacity;
        if capped {
            assert_eq!(v, 10.0);
        } else {
            assert!(v > last || v == 10.0);
            capped = v == 10.0;
        }
        last = v;
    }
    assert!(capped);
}

#[test]
fn mirror_pair_fires_necessity() {
    let mut field = SpatialField::new(FieldConfig {
        dimension: 2,
        ..FieldConfig::default()
    })
    .unwrap();
    let a = [1.0, 1.0];
    let b = [-1.0, 1.0];
    field.restore([
        Node::new(NodeKey::new(3, 2, &a), a.to_vec(), 1.0, 0.5),
        Node::new(NodeKey::new(5, 7, &b), b.to_vec(), 1.0, 0.5),
    ]);

    let config = ArbiterConfig {
        density_threshold: 1,
        ..ArbiterConfig::default()
    };
    let result = NecessityCheck::check(&field, &config);
    assert_eq!(result.unity_score, 1.0);
    assert!(result.jump_triggered);

    // Same field under the default density threshold is not evaluated.
    assert!(!NecessityCheck::check(&field, &ArbiterConfig::default()).jump_triggered);
}

#[test]
fn quadrant_loop_is_learned() {
    use Quadrant::*;
    const LOOP: [Quadrant; 4] = [NW, NE, SE, SW];

    let mut tracker = HabitTracker::new(&ArbiterConfig::default());
    let mut last_confidence = 0.0;
    for i in 0..60 {
        tracker.observe(LOOP[i % 4]);
        if i < 6 {
            continue;
        }
        let p = tracker.predict_next().unwrap();
        assert_eq!(p.kind, PredictionKind::QuadrantTransition);
        assert_eq!(p.target, Some(LOOP[(i + 1) % 4]));
        assert!(p.confidence >= last_confidence);
        last_confidence = p.confidence;
    }
    assert_eq!(last_confidence, 1.0);
}

/// Ten outcomes at weight 1.0: each update replaces the prior with the
/// blend `0.7 * long_run + 0.3 * window`, so the final value is the last blend.
#[test]
fn outcome_smoothing_matches_formula() {
    let mut tracker = EvidenceTracker::new(EvidenceConfig::default());
    tracker.set_prior("h", 0.5, 1.0);
    tracker.add_evidence("h", "seed", 0.5, "init", 0.01);

    for i in 0..10 {
        assert!(tracker.record_outcome("h", i < 8, 1.0));
    }
    let expected = 0.7 * (8.0 / 10.0) + 0.3 * (8.0 / 10.0);
    let stored = tracker.prior("h").unwrap().probability;
    assert!((stored - expected).abs() < 1e-12);

    // A short window makes the recent term diverge from the long-run rate.
    let mut short = EvidenceTracker::new(EvidenceConfig {
        outcome_window: 4,
        ..EvidenceConfig::default()
    });
    short.set_prior("h", 0.5, 1.0);
    short.add_evidence("h", "seed", 0.5, "init", 0.01);
    for i in 0..10 {
        short.record_outcome("h", i < 8, 1.0);
    }
    let blended = 0.7 * 0.8 + 0.3 * 0.5;
    assert!((short.prior("h").unwrap().probability - blended).abs() < 1e-12);
}

#[test]
fn controller_learns_quadrant_loop() {
    let mut controller = OrbController::new(OrbConfig::default()).unwrap();
    let mut r = rng();
    let mut last = None;
    for stimulus in StimulusGenerator::new(Pattern::QuadrantLoop, 1920.0, 1080.0, 7).take(80) {
        last = controller.tick(&stimulus, &mut r).unwrap();
    }
    let pulse = last.unwrap();
    let prediction = pulse.predictive_intent.unwrap();
    assert_eq!(prediction.kind, PredictionKind::QuadrantTransition);
    assert_eq!(prediction.confidence, 1.0);
    assert_eq!(pulse.cognitive_mode, Mode::Habit);
    assert!(pulse.glow_intensity >= 0.93);
    assert_eq!(controller.stats().ticks, 80);
}

#[test]
fn controller_decay_and_emergency_purge() {
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
    let mut controller = OrbController::new(config).unwrap();
    let mut r = rng();
    for i in 0..10 {
        controller.tick(&unique(i), &mut r).unwrap();
    }
    assert!(controller.emergency_purge().is_none());

    for _ in 0..500 {
        controller.decay();
    }
    assert!(controller.field().nodes().all(|n| (n.vivacity - 0.5).abs() < 1e-9));
    assert!(
        controller
            .take_events()
            .iter()
            .any(|e| matches!(e, FieldEvent::Decayed { .. }))
    );
}

#[derive(Debug, Clone)]
enum Op {
    Map(u16, u16),
    Decay,
    Purge,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0u16..64, 0u16..64).prop_map(|(x, y)| Op::Map(x, y)),
        1 => Just(Op::Decay),
        1 => Just(Op::Purge),
    ]
}

proptest! {
    #[test]
    fn size_bound_and_no_flapping(ops in prop::collection::vec(op(), 1..400)) {
        let config = FieldConfig {
            dimension: 3,
            hard_cap: 40,
            trigger_threshold: 32,
            release_threshold: 24,
            ..FieldConfig::default()
        };
        let mut field = SpatialField::new(config).unwrap();
        let mut was_active = false;

        for op in ops {
            match op {
                Op::Map(x, y) => {
                    let key = field.map(&Stimulus::cursor(x as f64, y as f64, 1.0));
                    prop_assert!(field.contains(&key));
                }
                Op::Decay => field.decay(0.9, 0.5),
                Op::Purge => {
                    field.purge();
                }
            }
            prop_assert!(field.size() <= 40);

            let active = field.purge_active();
            if was_active && !active {
                prop_assert!(field.size() <= 24);
            }
            for event in field.take_events() {
                match event {
                    FieldEvent::PurgeTriggered { density, .. } => prop_assert!(density >= 32),
                    FieldEvent::HysteresisReleased { density, .. } => prop_assert!(density <= 24),
                    _ => {}
                }
            }
            was_active = active;
        }
    }

    #[test]
    fn posterior_monotone_in_new_likelihood(
        prior in 0.05f64..0.95,
        existing in prop::collection::vec((0.0f64..=1.0, 0.0f64..=1.0), 0..5),
        low in 0.5f64..=1.0,
        delta in 0.0f64..=0.5,
        reliability in 0.0f64..=1.0,
    ) {
        let high = (low + delta).min(1.0);
        let now = 1_800_000_000.0;
        let posterior_with = |likelihood: f64| {
            let mut t = EvidenceTracker::new(EvidenceConfig::default());
            t.set_prior("h", prior, 1.0);
            for (i, (l, r)) in existing.iter().enumerate() {
                t.add_evidence_at("h", &format!("e{i}"), *l, "p", *r, now - 3600.0);
            }
            t.add_evidence_at("h", "new", likelihood, "p", reliability, now);
            t.posterior_at("h", now).unwrap()
        };
        prop_assert!(posterior_with(high) + 1e-12 >= posterior_with(low));
    }
}
