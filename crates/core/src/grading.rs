//! Answer normalization and correctness.
//!
//! Grading is string/set equality only. Single-choice and judgment answers
//! compare case-insensitively; multi-choice answers are canonicalized into a
//! sorted, deduplicated set of option keys so learners can separate keys
//! however they like (or not at all); short answers compare as trimmed text.

use std::collections::BTreeSet;

use crate::model::QuestionType;

/// Separator characters accepted between multi-choice option keys, in
/// addition to any whitespace. Covers both halfwidth and fullwidth
/// punctuation.
const MULTI_SEPARATORS: [char; 7] = [',', '，', ';', '；', '、', '/', '|'];

fn is_multi_separator(c: char) -> bool {
    c.is_whitespace() || MULTI_SEPARATORS.contains(&c)
}

fn normalize_multi(value: &str) -> String {
    let mut parts: Vec<String> = value
        .split(is_multi_separator)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_uppercase)
        .collect();

    // A single unseparated run of letters ("ABC") means one key per letter.
    if parts.len() == 1 {
        let only = &parts[0];
        if only.chars().count() > 1 && only.chars().all(char::is_alphabetic) {
            parts = only.chars().map(String::from).collect();
        }
    }

    let keys: BTreeSet<String> = parts.into_iter().collect();
    keys.into_iter().collect::<Vec<_>>().join(",")
}

/// Canonicalizes a submitted or standard answer for comparison.
#[must_use]
pub fn normalize(value: &str, kind: QuestionType) -> String {
    match kind {
        QuestionType::MultiChoice => normalize_multi(value),
        QuestionType::SingleChoice | QuestionType::Judgment => value.trim().to_uppercase(),
        QuestionType::ShortAnswer => value.trim().to_string(),
    }
}

/// Compares a submission against the standard answer.
///
/// An empty standard answer never matches: a question with no usable answer
/// must not silently grade everything as correct.
#[must_use]
pub fn is_correct(submitted: &str, standard: &str, kind: QuestionType) -> bool {
    let standard = normalize(standard, kind);
    !standard.is_empty() && normalize(submitted, kind) == standard
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
