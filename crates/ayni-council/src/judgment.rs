//! Participant judgments and reply parsing.
//!
//! ## Parse Ladder
//!
//! | Step | Accepts |
//! |------|---------|
//! | 1. JSON | first `{...}` block, code fences ignored |
//! | 2. Fields | `truth: 0.8`, `indeterminacy = 0.1`, `F: 0.0`, `patterns: a, b` |
//! | 3. Keywords | unambiguous verdict vocabulary only |
//! | 4. Give up | [`InferenceError::Malformed`] |
//!
//! Out-of-range values are rejected, not clamped. No step ever invents a
//! neutral judgment for a reply it could not read.

use ayni_reciprocity::Tif;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InferenceError;

const REASONING_LIMIT: usize = 500;

/// One participant's answer for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    /// Judged values.
    #[serde(flatten)]
    pub tif: Tif,
    /// Free-text justification.
    #[serde(default)]
    pub reasoning: String,
    /// Pattern tags reported in the second round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns_observed: Vec<String>,
    /// Pattern tags reported from the third round on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consensus_patterns: Vec<String>,
}

impl Judgment {
    /// Creates a judgment with no patterns.
    pub fn new(tif: Tif, reasoning: impl Into<String>) -> Self {
        Self {
            tif,
            reasoning: reasoning.into(),
            patterns_observed: Vec::new(),
            consensus_patterns: Vec::new(),
        }
    }

    /// Sets the second-round pattern list.
    #[must_use]
    pub fn with_patterns_observed<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns_observed = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the later-round pattern list.
    #[must_use]
    pub fn with_consensus_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consensus_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Patterns for a given round.
    ///
    /// Round 2 reads `patterns_observed`, later rounds read
    /// `consensus_patterns`; either falls back to the other list when its
    /// own is empty. Round 1 reports none.
    pub fn patterns_for_round(&self, round: usize) -> &[String] {
        let (primary, fallback) = match round {
            0 | 1 => return &[],
            2 => (&self.patterns_observed, &self.consensus_patterns),
            _ => (&self.consensus_patterns, &self.patterns_observed),
        };
        if primary.is_empty() {
            fallback
        } else {
            primary
        }
    }
}

/// What an inference client hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelReply {
    /// Already structured by the client.
    Judgment(Judgment),
    /// Raw model text, still to be parsed.
    Text(String),
}

/// Reads model text into a [`Judgment`].
#[derive(Debug, Clone)]
pub struct ResponseParser {
    truth: Regex,
    indeterminacy: Regex,
    falsehood: Regex,
    reasoning: Regex,
    patterns: Regex,
    extractive: Regex,
    reciprocal: Regex,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn field_pattern(long: &str, short: &str) -> Regex {
    let pattern = format!(
        r#"(?i)\b(?:{}|{})\b["']?\s*[:=]\s*(-?\d+(?:\.\d+)?)"#,
        long, short
    );
    Regex::new(&pattern).expect("field pattern is a valid regex")
}

impl ResponseParser {
    /// Compiles the extraction patterns.
    pub fn new() -> Self {
        Self {
            truth: field_pattern("truth", "t"),
            indeterminacy: field_pattern("indeterminacy", "i"),
            falsehood: field_pattern("falsehood", "f"),
            reasoning: Regex::new(r#"(?im)^\s*["']?reasoning["']?\s*[:=]\s*(.+)$"#)
                .expect("reasoning pattern is a valid regex"),
            patterns: Regex::new(
                r#"(?im)^\s*["']?(patterns_observed|consensus_patterns|patterns)["']?\s*[:=]\s*(.+)$"#,
            )
            .expect("patterns pattern is a valid regex"),
            extractive: Regex::new(
                r"(?i)\b(manipulative|extractive|violation|violates|injection|jailbreak)\b",
            )
            .expect("extractive vocabulary is a valid regex"),
            reciprocal: Regex::new(r"(?i)\b(reciprocal|respectful|balanced|benign)\b")
                .expect("reciprocal vocabulary is a valid regex"),
        }
    }

    /// Turns a client reply into a judgment.
    ///
    /// # Errors
    ///
    /// [`InferenceError::Malformed`] when the reply cannot be read.
    pub fn interpret(&self, reply: ModelReply) -> Result<Judgment, InferenceError> {
        match reply {
            ModelReply::Judgment(judgment) => Ok(judgment),
            ModelReply::Text(text) => self.parse(&text),
        }
    }

    /// Parses raw model text.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ayni_council::ResponseParser;
    ///
    /// let parser = ResponseParser::new();
    /// let judgment = parser.parse("truth: 0.8\nindeterminacy: 0.1\nfalsehood: 0.05")?;
    /// assert!((judgment.tif.falsehood() - 0.05).abs() < 1e-9);
    /// # Ok::<(), ayni_council::InferenceError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// [`InferenceError::Malformed`] when no step of the ladder succeeds or
    /// a value is out of range.
    pub fn parse(&self, text: &str) -> Result<Judgment, InferenceError> {
        if let Some(judgment) = parse_json_block(text) {
            debug!("reply parsed as json");
            return Ok(judgment);
        }

        if let Some(result) = self.parse_fields(text) {
            debug!("reply parsed from fields");
            return result;
        }

        if let Some(judgment) = self.parse_keywords(text) {
            debug!("reply parsed from keywords");
            return Ok(judgment);
        }

        Err(InferenceError::Malformed(format!(
            "no judgment found in reply: {}",
            truncate(text.trim(), 80)
        )))
    }

    fn parse_fields(&self, text: &str) -> Option<Result<Judgment, InferenceError>> {
        let truth = capture_number(&self.truth, text)?;
        let indeterminacy = capture_number(&self.indeterminacy, text)?;
        let falsehood = capture_number(&self.falsehood, text)?;

        let tif = match Tif::new(truth, indeterminacy, falsehood) {
            Ok(tif) => tif,
            Err(err) => return Some(Err(InferenceError::Malformed(err.to_string()))),
        };

        let reasoning = self
            .reasoning
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| truncate(text.trim(), REASONING_LIMIT));

        let mut judgment = Judgment::new(tif, reasoning);
        for caps in self.patterns.captures_iter(text) {
            let (Some(key), Some(list)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let tags = split_tags(list.as_str());
            if key.as_str().eq_ignore_ascii_case("consensus_patterns") {
                judgment.consensus_patterns.extend(tags);
            } else {
                judgment.patterns_observed.extend(tags);
            }
        }
        Some(Ok(judgment))
    }

    fn parse_keywords(&self, text: &str) -> Option<Judgment> {
        let extractive = self.extractive.find(text);
        let reciprocal = self.reciprocal.find(text);
        let (tif, matched) = match (extractive, reciprocal) {
            (Some(word), None) => (Tif::new(0.2, 0.3, 0.8).ok()?, word.as_str()),
            (None, Some(word)) => (Tif::new(0.8, 0.3, 0.1).ok()?, word.as_str()),
            _ => return None,
        };
        Some(Judgment::new(
            tif,
            format!("keyword heuristic matched '{}'", matched.to_lowercase()),
        ))
    }
}

fn parse_json_block(text: &str) -> Option<Judgment> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn capture_number(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn split_tags(list: &str) -> Vec<String> {
    list.split(',')
        .map(|tag| tag.trim().trim_matches(|c| matches!(c, '[' | ']' | '"' | '\'')).trim())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(limit).collect();
        cut.push_str("...");
        cut
    }
}
