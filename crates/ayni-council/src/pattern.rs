//! Pattern observations across dialogue rounds.
//!
//! Patterns are keyed by a normalised type tag. The first participant and
//! round to mention a tag own its attribution. Agreement divides the
//! observers still in the circle by the circle size when the pattern was
//! first observed. A participant that drops out later loses its vote but
//! stays in the denominator.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::judgment::truncate;

const MAX_EXAMPLES: usize = 3;
const EXAMPLE_LIMIT: usize = 160;

/// A pattern the circle agreed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Normalised snake_case tag.
    pub pattern_type: String,
    /// Short description derived from the tag.
    pub description: String,
    /// Active participants that reported it, sorted.
    pub observers: Vec<String>,
    /// Participant that reported it first.
    pub first_observed_by: String,
    /// Round of the first report.
    pub first_round: usize,
    /// Active participants in the round of the first report.
    pub circle_size: usize,
    /// `observers.len() / circle_size`.
    pub agreement: f64,
    /// Reasoning excerpts from observers.
    pub examples: Vec<String>,
}

#[derive(Debug, Clone)]
struct Observation {
    first_observed_by: String,
    first_round: usize,
    observers: BTreeSet<String>,
    examples: Vec<(String, String)>,
}

/// Collects pattern reports during a dialogue.
#[derive(Debug, Clone, Default)]
pub struct PatternTracker {
    observations: BTreeMap<String, Observation>,
    circle_sizes: BTreeMap<usize, usize>,
}

/// Lowercase snake_case form of a tag, or `None` if nothing is left.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let normalized = tag
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

impl PatternTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records how many participants were active when a round was dispatched.
    pub fn open_round(&mut self, round: usize, active: usize) {
        self.circle_sizes.insert(round, active);
    }

    /// Active participants recorded for a round.
    pub fn circle_size(&self, round: usize) -> Option<usize> {
        self.circle_sizes.get(&round).copied()
    }

    /// Records the tags one participant reported in one round.
    pub fn record(&mut self, participant: &str, round: usize, tags: &[String], reasoning: &str) {
        for tag in tags.iter().filter_map(|t| normalize_tag(t)) {
            let observation = self.observations.entry(tag).or_insert_with(|| Observation {
                first_observed_by: participant.to_string(),
                first_round: round,
                observers: BTreeSet::new(),
                examples: Vec::new(),
            });
            observation.observers.insert(participant.to_string());
            if !reasoning.is_empty()
                && observation.examples.len() < MAX_EXAMPLES
                && !observation.examples.iter().any(|(who, _)| who == participant)
            {
                observation
                    .examples
                    .push((participant.to_string(), truncate(reasoning, EXAMPLE_LIMIT)));
            }
        }
    }

    /// Number of distinct tags seen.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether no tag was seen.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Patterns whose agreement meets `threshold`.
    ///
    /// Only observers in `active` count. The denominator is the size recorded
    /// by [`open_round`](Self::open_round) for the first report, or the size
    /// of `active` when that round was never opened.
    ///
    /// Sorted by agreement (highest first), then by tag.
    pub fn retained(&self, active: &BTreeSet<String>, threshold: f64) -> Vec<Pattern> {
        if active.is_empty() {
            return Vec::new();
        }

        let mut patterns: Vec<Pattern> = self
            .observations
            .iter()
            .filter_map(|(tag, obs)| {
                let observers: Vec<String> = obs.observers.intersection(active).cloned().collect();
                let circle_size = self
                    .circle_size(obs.first_round)
                    .unwrap_or(active.len())
                    .max(observers.len());
                if observers.is_empty() {
                    return None;
                }
                let agreement = observers.len() as f64 / circle_size as f64;
                if agreement < threshold {
                    return None;
                }
                let examples = obs
                    .examples
                    .iter()
                    .filter(|(who, _)| active.contains(who))
                    .map(|(who, text)| format!("{}: {}", who, text))
                    .collect();
                Some(Pattern {
                    pattern_type: tag.clone(),
                    description: tag.replace('_', " "),
                    observers,
                    first_observed_by: obs.first_observed_by.clone(),
                    first_round: obs.first_round,
                    circle_size,
                    agreement,
                    examples,
                })
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.agreement
                .total_cmp(&a.agreement)
                .then_with(|| a.pattern_type.cmp(&b.pattern_type))
        });
        patterns
    }
}
