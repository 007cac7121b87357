// Matcher - resolve a raw capture to an enrolled identity
// Threshold contract: best similarity >= threshold on a 0-100 scale.
//
// The bundled similarity function is a generic sequence-comparison ratio,
// NOT a validated biometric matching algorithm. It preserves the threshold
// contract so a vetted matcher can be plugged in behind the `Similarity`
// trait before production use.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::Identity;

/// Default acceptance threshold (0-100 scale).
pub const DEFAULT_THRESHOLD: f64 = 80.0;

// ============================================================================
// TEMPLATE
// ============================================================================

/// Opaque biometric feature representation derived from one sensor capture.
///
/// Raw bytes are biometric data and must never be printed or logged;
/// use `digest()` for any human-facing reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template(Vec<u8>);

impl Template {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Template(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short log-safe reference to this template.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        let hex = format!("{:x}", hasher.finalize());
        hex[..16].to_string()
    }
}

// ============================================================================
// CAPTURE
// ============================================================================

/// Transient output of one sensor read. Never persisted; consumed
/// immediately by the matcher or the enrollment flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub template: Template,
    /// Sensor-reported quality (0-100); the capability layer has already
    /// rejected unusable samples.
    pub quality: u8,
}

impl Capture {
    pub fn new(template: Template, quality: u8) -> Self {
        Capture { template, quality }
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

/// Outcome of one identify call. Derived, never stored.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The accepted identity; `None` when below threshold.
    pub identity: Option<Identity>,

    /// Best similarity found across candidates (0 if none holds a template).
    pub score: f64,

    pub matched: bool,
}

impl MatchResult {
    fn no_match(score: f64) -> Self {
        MatchResult {
            identity: None,
            score,
            matched: false,
        }
    }
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Symmetric similarity in [0, 100]. Pluggable so the placeholder ratio can
/// be swapped for a real biometric matcher.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &Template, b: &Template) -> f64;
}

/// Generic sequence-similarity ratio: 2*M / (len_a + len_b) * 100, where M
/// is the length of the longest common subsequence. Placeholder algorithm.
pub struct SequenceRatio;

impl Similarity for SequenceRatio {
    fn score(&self, a: &Template, b: &Template) -> f64 {
        let total = a.len() + b.len();
        if total == 0 {
            return 100.0;
        }

        let common = lcs_length(a.as_bytes(), b.as_bytes());
        (2.0 * common as f64 / total as f64) * 100.0
    }
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_length(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Keep the inner loop over the shorter sequence
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];

    for &x in outer {
        for (j, &y) in inner.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[inner.len()]
}

// ============================================================================
// MATCHER
// ============================================================================

pub struct Matcher {
    threshold: f64,
    similarity: Box<dyn Similarity>,
}

impl Matcher {
    /// Matcher with the placeholder sequence-ratio similarity.
    pub fn new(threshold: f64) -> Self {
        Matcher {
            threshold,
            similarity: Box::new(SequenceRatio),
        }
    }

    pub fn with_similarity(threshold: f64, similarity: Box<dyn Similarity>) -> Self {
        Matcher {
            threshold,
            similarity,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare the probe against every candidate holding a template and
    /// accept the maximum if it clears the threshold.
    ///
    /// Tie-break: the first candidate achieving the maximum wins (candidates
    /// arrive in the store's stable iteration order). Pure and synchronous,
    /// no retries.
    pub fn identify(&self, probe: &Capture, candidates: &[Identity]) -> MatchResult {
        let mut best_score = 0.0f64;
        let mut best: Option<&Identity> = None;

        for candidate in candidates {
            let template = match &candidate.template {
                Some(t) => t,
                None => continue,
            };

            let score = self.similarity.score(&probe.template, template);
            // Strict > keeps the first candidate on equal scores
            if score > best_score || best.is_none() {
                best_score = score;
                best = Some(candidate);
            }
        }

        match best {
            Some(identity) if best_score >= self.threshold => MatchResult {
                identity: Some(identity.clone()),
                score: best_score,
                matched: true,
            },
            _ => MatchResult::no_match(best_score),
        }
    }
}
