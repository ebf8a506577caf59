//! Smoothed per-hypothesis confidence estimates.
//!
//! Two separate mechanisms share a hypothesis name:
//!
//! - **Outcomes** (`record_outcome`) move the stored prior toward a blend of
//!   the long-run success rate and a bounded recent window. This is plain
//!   exponential smoothing.
//! - **Evidence items** (`add_evidence`) are combined with the prior in
//!   `posterior` as a product of reliability- and age-weighted likelihoods,
//!   normalized against the complement in odds form. Items are not assumed
//!   independent; the formula is a heuristic, not a posterior model.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::config::EvidenceConfig;
use crate::constants::RECENT_EVIDENCE_SECS;
use crate::time::now_unix_secs_f64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prior {
    pub probability: f64,
    pub evidence_strength: f64,
    pub last_updated: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub id: String,
    pub likelihood: f64,
    pub timestamp: f64,
    pub source: String,
    pub reliability: f64,
}

#[derive(Debug, Clone, Default)]
struct OutcomeTracking {
    successes: u64,
    total: u64,
    recent: VecDeque<bool>,
}

/// One row of `competing_hypotheses`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisRank {
    pub hypothesis: String,
    pub posterior: f64,
    pub prior: f64,
    pub evidence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceSummary {
    pub total_evidence: usize,
    pub recent_evidence: usize,
    pub avg_likelihood: f64,
    pub avg_reliability: f64,
    pub most_common_source: String,
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceTracker {
    config: EvidenceConfig,
    priors: HashMap<String, Prior>,
    evidence: HashMap<String, Vec<Evidence>>,
    tracking: HashMap<String, OutcomeTracking>,
}

impl EvidenceTracker {
    pub fn new(config: EvidenceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EvidenceConfig {
        &self.config
    }

    pub fn prior(&self, hypothesis: &str) -> Option<&Prior> {
        self.priors.get(hypothesis)
    }

    pub fn has_prior(&self, hypothesis: &str) -> bool {
        self.priors.contains_key(hypothesis)
    }

    pub fn set_prior(&mut self, hypothesis: &str, probability: f64, evidence_strength: f64) {
        self.priors.insert(
            hypothesis.to_string(),
            Prior {
                probability: probability.clamp(0.0, 1.0),
                evidence_strength,
                last_updated: now_unix_secs_f64(),
            },
        );
    }

    pub fn add_evidence(
        &mut self,
        hypothesis: &str,
        id: &str,
        likelihood: f64,
        source: &str,
        reliability: f64,
    ) {
        self.add_evidence_at(hypothesis, id, likelihood, source, reliability, now_unix_secs_f64());
    }

    /// `add_evidence` with an explicit timestamp (Unix seconds).
    pub fn add_evidence_at(
        &mut self,
        hypothesis: &str,
        id: &str,
        likelihood: f64,
        source: &str,
        reliability: f64,
        timestamp: f64,
    ) {
        self.evidence
            .entry(hypothesis.to_string())
            .or_default()
            .push(Evidence {
                id: id.to_string(),
                likelihood: likelihood.clamp(0.0, 1.0),
                timestamp,
                source: source.to_string(),
                reliability: reliability.clamp(0.0, 1.0),
            });
        self.tracking.entry(hypothesis.to_string()).or_default();
    }

    pub fn evidence_count(&self, hypothesis: &str) -> usize {
        self.evidence.get(hypothesis).map_or(0, Vec::len)
    }

    /// Fold an observed outcome into the stored prior.
    ///
    /// `estimate = w_long * successes/total + (1 - w_long) * mean(window)`, then
    /// `prior = prior * (1 - weight) + estimate * weight`. Returns false (and
    /// changes nothing) for a hypothesis that has never received evidence.
    pub fn record_outcome(&mut self, hypothesis: &str, success: bool, weight: f64) -> bool {
        let Some(tracking) = self.tracking.get_mut(hypothesis) else {
            return false;
        };
        let weight = weight.clamp(0.0, 1.0);

        tracking.total += 1;
        if success {
            tracking.successes += 1;
        }
        if tracking.recent.len() == self.config.outcome_window {
            tracking.recent.pop_front();
        }
        tracking.recent.push_back(success);

        let long_run = tracking.successes as f64 / tracking.total as f64;
        let recent = tracking.recent.iter().filter(|s| **s).count() as f64
            / tracking.recent.len() as f64;
        let w = self.config.long_run_weight;
        let estimate = w * long_run + (1.0 - w) * recent;

        if let Some(prior) = self.priors.get_mut(hypothesis) {
            prior.probability = prior.probability * (1.0 - weight) + estimate * weight;
            prior.last_updated = now_unix_secs_f64();
        }
        true
    }

    /// Posterior at the current time. `None` when the hypothesis has no prior.
    pub fn posterior(&self, hypothesis: &str) -> Option<f64> {
        self.posterior_at(hypothesis, now_unix_secs_f64())
    }

    /// Posterior evaluated at `now` (Unix seconds).
    pub fn posterior_at(&self, hypothesis: &str, now: f64) -> Option<f64> {
        let prior = self.priors.get(hypothesis)?.probability;
        let items = match self.evidence.get(hypothesis) {
            Some(items) if !items.is_empty() => items,
            _ => return Some(prior),
        };

        let total_likelihood: f64 = items
            .iter()
            .map(|e| {
                let weight = e.reliability * self.time_decay(e.timestamp, now);
                e.likelihood * weight + 0.5 * (1.0 - weight)
            })
            .product();

        let marginal = prior * total_likelihood + (1.0 - prior) * (1.0 - total_likelihood);
        if marginal == 0.0 {
            return Some(prior);
        }
        Some((prior * total_likelihood / marginal).clamp(0.0, 1.0))
    }

    /// `0.5 ^ (age / half_life)`; future timestamps count as age zero.
    fn time_decay(&self, timestamp: f64, now: f64) -> f64 {
        let age = (now - timestamp).max(0.0);
        0.5f64.powf(age / self.config.half_life_secs)
    }

    /// Every hypothesis with a prior, ranked by posterior (highest first).
    pub fn competing_hypotheses(&self) -> Vec<HypothesisRank> {
        let now = now_unix_secs_f64();
        let mut ranks: Vec<HypothesisRank> = self
            .priors
            .iter()
            .filter_map(|(h, prior)| {
                Some(HypothesisRank {
                    hypothesis: h.clone(),
                    posterior: self.posterior_at(h, now)?,
                    prior: prior.probability,
                    evidence_count: self.evidence_count(h),
                })
            })
            .collect();
        ranks.sort_by(|a, b| {
            b.posterior
                .total_cmp(&a.posterior)
                .then_with(|| a.hypothesis.cmp(&b.hypothesis))
        });
        ranks
    }

    pub fn evidence_summary(&self, hypothesis: &str) -> Option<EvidenceSummary> {
        self.evidence_summary_at(hypothesis, now_unix_secs_f64())
    }

    pub fn evidence_summary_at(&self, hypothesis: &str, now: f64) -> Option<EvidenceSummary> {
        let items = self.evidence.get(hypothesis)?;
        if items.is_empty() {
            return None;
        }
        let n = items.len() as f64;

        let mut source_counts: HashMap<&str, usize> = HashMap::new();
        for e in items {
            *source_counts.entry(e.source.as_str()).or_default() += 1;
        }
        let most_common_source = source_counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(s, _)| s.to_string())
            .unwrap_or_default();

        Some(EvidenceSummary {
            total_evidence: items.len(),
            recent_evidence: items
                .iter()
                .filter(|e| now - e.timestamp < RECENT_EVIDENCE_SECS)
                .count(),
            avg_likelihood: items.iter().map(|e| e.likelihood).sum::<f64>() / n,
            avg_reliability: items.iter().map(|e| e.reliability).sum::<f64>() / n,
            most_common_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const NOW: f64 = 1_800_000_000.0;

    fn tracker() -> EvidenceTracker {
        EvidenceTracker::new(EvidenceConfig::default())
    }

    #[test]
    fn test_unknown_hypothesis_has_no_posterior() {
        assert_eq!(tracker().posterior("nothing"), None);
    }

    #[test]
    fn test_posterior_without_evidence_is_prior() {
        let mut t = tracker();
        t.set_prior("h", 0.42, 1.0);
        assert_eq!(t.posterior("h"), Some(0.42));
    }

    #[test]
    fn test_posterior_odds_form() {
        let mut t = tracker();
        t.set_prior("h", 0.5, 1.0);
        t.add_evidence_at("h", "e1", 0.8, "test", 1.0, NOW);
        // T = 0.8; 0.5*0.8 / (0.5*0.8 + 0.5*0.2)
        assert_relative_eq!(t.posterior_at("h", NOW).unwrap(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_reliability_pulls_toward_half() {
        let mut t = tracker();
        t.set_prior("h", 0.5, 1.0);
        t.add_evidence_at("h", "e1", 0.9, "test", 0.5, NOW);
        // weighted likelihood = 0.9*0.5 + 0.5*0.5 = 0.7
        assert_relative_eq!(t.posterior_at("h", NOW).unwrap(), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_half_life_decay() {
        let mut t = tracker();
        t.set_prior("h", 0.5, 1.0);
        t.add_evidence_at("h", "e1", 1.0, "test", 1.0, NOW);
        let one_day_later = NOW + 24.0 * 3600.0;
        // weight 0.5 -> likelihood 0.75
        assert_relative_eq!(
            t.posterior_at("h", one_day_later).unwrap(),
            0.75,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_zero_marginal_returns_prior() {
        let mut t = tracker();
        t.set_prior("h", 1.0, 1.0);
        t.add_evidence_at("h", "e1", 0.0, "test", 1.0, NOW);
        assert_eq!(t.posterior_at("h", NOW), Some(1.0));
    }

    #[test]
    fn test_record_outcome_requires_tracking() {
        let mut t = tracker();
        t.set_prior("h", 0.5, 1.0);
        assert!(!t.record_outcome("h", true, 1.0));
        assert_eq!(t.prior("h").unwrap().probability, 0.5);
    }

    #[test]
    fn test_record_outcome_smoothing() {
        let mut t = tracker();
        t.set_prior("h", 0.6, 1.0);
        t.add_evidence_at("h", "seed", 0.6, "init", 0.01, NOW);
        assert!(t.record_outcome("h", true, 0.7));
        // estimate = 0.7*1 + 0.3*1 = 1.0; prior = 0.6*0.3 + 1.0*0.7
        assert_relative_eq!(t.prior("h").unwrap().probability, 0.88, epsilon = 1e-12);
    }

    #[test]
    fn test_eight_successes_then_two_failures_default_window() {
        let mut t = tracker();
        t.set_prior("h", 0.5, 1.0);
        t.add_evidence_at("h", "seed", 0.5, "init", 0.01, NOW);
        for i in 0..10 {
            t.record_outcome("h", i < 8, 1.0);
        }
        // Window (100) holds all ten: 0.7*0.8 + 0.3*0.8
        assert_relative_eq!(t.prior("h").unwrap().probability, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_eight_successes_then_two_failures_short_window() {
        let mut t = EvidenceTracker::new(EvidenceConfig {
            outcome_window: 5,
            ..EvidenceConfig::default()
        });
        t.set_prior("h", 0.5, 1.0);
        t.add_evidence_at("h", "seed", 0.5, "init", 0.01, NOW);
        for i in 0..10 {
            t.record_outcome("h", i < 8, 1.0);
        }
        // Window holds [T, T, T, F, F]: 0.7*0.8 + 0.3*0.6, not the raw 0.8
        let p = t.prior("h").unwrap().probability;
        assert_relative_eq!(p, 0.74, epsilon = 1e-12);
        assert!((p - 0.8).abs() > 1e-3);
    }

    #[test]
    fn test_competing_hypotheses_sorted() {
        let mut t = tracker();
        t.set_prior("low", 0.2, 1.0);
        t.set_prior("high", 0.9, 1.0);
        t.set_prior("mid", 0.5, 1.0);
        let ranks = t.competing_hypotheses();
        let names: Vec<&str> = ranks.iter().map(|r| r.hypothesis.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_evidence_summary() {
        let mut t = tracker();
        t.add_evidence_at("h", "a", 0.2, "empiric", 1.0, NOW);
        t.add_evidence_at("h", "b", 0.4, "skeptic", 0.5, NOW - 8.0 * 24.0 * 3600.0);
        t.add_evidence_at("h", "c", 0.6, "empiric", 0.0, NOW);
        let s = t.evidence_summary_at("h", NOW).unwrap();
        assert_eq!(s.total_evidence, 3);
        assert_eq!(s.recent_evidence, 2);
        assert_relative_eq!(s.avg_likelihood, 0.4, epsilon = 1e-12);
        assert_relative_eq!(s.avg_reliability, 0.5, epsilon = 1e-12);
        assert_eq!(s.most_common_source, "empiric");
        assert!(t.evidence_summary("missing").is_none());
    }
}
