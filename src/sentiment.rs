// src/sentiment.rs
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Four-way polarity summary of a piece of text.
/// `neg + neu + pos` is ~1.0 and `compound` lies in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub neg: f64,
    pub neu: f64,
    pub pos: f64,
    pub compound: f64,
}

impl SentimentScores {
    pub fn new(neg: f64, neu: f64, pos: f64, compound: f64) -> Self {
        Self {
            neg,
            neu,
            pos,
            compound,
        }
    }

    /// Fully neutral text (also what empty text scores as).
    pub fn neutral() -> Self {
        Self::new(0.0, 1.0, 0.0, 0.0)
    }
}

/// Anything that can turn text into [`SentimentScores`].
/// Must be deterministic and side-effect free.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> SentimentScores;
}

impl<F> SentimentScorer for F
where
    F: Fn(&str) -> SentimentScores + Send + Sync,
{
    fn score(&self, text: &str) -> SentimentScores {
        self(text)
    }
}

// Valences on the usual -4..=4 scale, tuned for crypto chatter.
const LEXICON_SEED: &[(&str, f64)] = &[
    ("moon", 2.0),
    ("mooning", 2.3),
    ("bullish", 2.2),
    ("bearish", -2.2),
    ("pump", 1.2),
    ("dump", -1.8),
    ("crash", -2.6),
    ("crashing", -2.6),
    ("scam", -2.9),
    ("rugpull", -3.0),
    ("rekt", -2.4),
    ("hack", -2.1),
    ("hacked", -2.5),
    ("fear", -2.2),
    ("panic", -2.3),
    ("greed", -1.7),
    ("hope", 1.9),
    ("good", 1.9),
    ("great", 3.1),
    ("amazing", 2.8),
    ("love", 3.2),
    ("like", 1.5),
    ("bad", -2.5),
    ("terrible", -2.9),
    ("hate", -2.7),
    ("win", 2.8),
    ("winning", 2.4),
    ("lose", -1.9),
    ("loss", -1.3),
    ("losses", -1.6),
    ("gain", 2.0),
    ("gains", 2.0),
    ("profit", 1.9),
    ("rich", 2.0),
    ("broke", -1.8),
    ("up", 0.6),
    ("down", -0.6),
    ("rally", 1.9),
    ("surge", 1.6),
    ("plunge", -2.2),
    ("adoption", 1.1),
    ("ban", -2.0),
    ("banned", -2.2),
    ("safe", 1.9),
    ("risky", -1.4),
    ("worried", -1.9),
    ("happy", 2.7),
    ("sad", -2.1),
];

static LEXICON: Lazy<HashMap<&'static str, f64>> =
    Lazy::new(|| LEXICON_SEED.iter().copied().collect());

// Scalar applied to a valence preceded by a negator within three tokens.
const NEGATION_SCALAR: f64 = -0.74;
// Normalization constant for the compound score.
const COMPOUND_ALPHA: f64 = 15.0;

/// Small lexicon scorer producing VADER-shaped output.
#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    /// Lexicon valence of a word (0 when unknown).
    #[inline]
    fn word_valence(&self, w: &str) -> f64 {
        LEXICON.get(w).copied().unwrap_or(0.0)
    }

    pub fn polarity_scores(&self, text: &str) -> SentimentScores {
        // Collect so we can look back for negators.
        let tokens: Vec<String> = tokenize(text).collect();
        if tokens.is_empty() {
            return SentimentScores::neutral();
        }

        let mut sum = 0.0;
        let mut pos_sum = 0.0;
        let mut neg_sum = 0.0;
        let mut neu_count = 0.0;

        for i in 0..tokens.len() {
            let base = self.word_valence(tokens[i].as_str());
            if base == 0.0 {
                neu_count += 1.0;
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            let v = if negated { base * NEGATION_SCALAR } else { base };
            sum += v;
            if v > 0.0 {
                pos_sum += v + 1.0;
            } else {
                neg_sum += v - 1.0;
            }
        }

        let total = pos_sum + neg_sum.abs() + neu_count;
        let compound = (sum / (sum * sum + COMPOUND_ALPHA).sqrt()).clamp(-1.0, 1.0);
        SentimentScores {
            neg: round3((neg_sum / total).abs()),
            neu: round3(neu_count / total),
            pos: round3(pos_sum / total),
            compound: round3(compound),
        }
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> SentimentScores {
        self.polarity_scores(text)
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Alphanumeric tokens plus apostrophes, lowercased.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "without"
    )
}
