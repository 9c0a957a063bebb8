//! Advertisement scoring.
//!
//! Pure, deterministic classifier over a weighted policy. RMT spam in game
//! chat leans on the same tells: gil-per-price patterns, site keywords,
//! shouted text, and runs of decorative symbols. Each signal contributes a
//! weight and the sum is compared against the policy threshold.

use fancy_regex::Regex;
use tracing::warn;

use crate::config::types::FilterConfig;

/// Symbols advertisers use to frame their messages.
const DECORATIVE_SYMBOLS: &[char] = &[
    '★', '☆', '✦', '✧', '◆', '◇', '■', '□', '●', '○', '▲', '△', '▼', '▽', '♥', '♡', '♦', '♣',
    '♠', '♪', '※', '═', '【', '】', '≪', '≫',
];

/// Minimum run of consecutive shouting tokens that scores.
const SHOUT_RUN: usize = 5;
/// Minimum run of consecutive decorative symbols that scores.
const DECORATION_RUN: usize = 3;

/// A compiled regex pattern with its original string for diagnostics.
#[derive(Debug, Clone)]
struct CompiledPattern {
    original: String,
    regex: Regex,
}

/// Compiled advertisement scoring policy.
#[derive(Debug, Clone)]
pub struct AdScorer {
    whitelist: Vec<String>,
    high_patterns: Vec<CompiledPattern>,
    medium_patterns: Vec<CompiledPattern>,
    high_keywords: Vec<String>,
    medium_keywords: Vec<String>,
    threshold: i32,
}

impl AdScorer {
    /// Compile a scorer from the configured policy.
    ///
    /// Invalid regex patterns are logged and skipped; one bad pattern never
    /// disables the rest of the policy.
    pub fn from_policy(policy: &FilterConfig) -> Self {
        Self {
            whitelist: lowercase_all(&policy.whitelist),
            high_patterns: compile_patterns("high", &policy.high_patterns),
            medium_patterns: compile_patterns("medium", &policy.medium_patterns),
            high_keywords: lowercase_all(&policy.high_keywords),
            medium_keywords: lowercase_all(&policy.medium_keywords),
            threshold: policy.threshold,
        }
    }

    /// Classify a message. Blank text and whitelisted text never flag.
    pub fn is_advertisement(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let lower = text.to_lowercase();
        if self.whitelist.iter().any(|phrase| lower.contains(phrase)) {
            return false;
        }

        self.score(text, &lower) >= self.threshold
    }

    fn score(&self, text: &str, lower: &str) -> i32 {
        let mut score = 0;

        // High regexes are additive per match, uncapped.
        for pattern in &self.high_patterns {
            if pattern_matches(pattern, text) {
                score += 2;
            }
        }

        // Keyword bonuses are flat regardless of how far past the bar the
        // count goes.
        let high_hits = self
            .high_keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count();
        if high_hits >= 3 {
            score += 2;
        }

        for pattern in &self.medium_patterns {
            if pattern_matches(pattern, text) {
                score += 1;
            }
        }

        let medium_hits = self
            .medium_keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count();
        if medium_hits >= 2 {
            score += 1;
        }

        if longest_shout_run(text) >= SHOUT_RUN {
            score += 1;
        }

        if longest_decoration_run(text) >= DECORATION_RUN {
            score += 1;
        }

        score
    }
}

fn pattern_matches(pattern: &CompiledPattern, text: &str) -> bool {
    pattern.regex.is_match(text).unwrap_or_else(|e| {
        warn!("Regex match error for pattern '{}': {}", pattern.original, e);
        false
    })
}

/// Compile a list of regex pattern strings, skipping invalid ones.
fn compile_patterns(tier: &str, patterns: &[String]) -> Vec<CompiledPattern> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(CompiledPattern {
                original: pattern.clone(),
                regex,
            }),
            Err(e) => {
                warn!("Invalid {} filter pattern '{}': {}", tier, pattern, e);
                None
            }
        })
        .collect()
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// Longest run of consecutive whitespace tokens that shout.
///
/// A token shouts when it is longer than one character, contains a letter,
/// and every letter in it is uppercase.
fn longest_shout_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;

    for token in text.split_whitespace() {
        if is_shouting(token) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }

    longest
}

fn is_shouting(token: &str) -> bool {
    token.chars().count() > 1
        && token.chars().any(|c| c.is_alphabetic())
        && token
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

/// Longest run of consecutive decorative symbols.
fn longest_decoration_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;

    for c in text.chars() {
        if DECORATIVE_SYMBOLS.contains(&c) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }

    longest
}
