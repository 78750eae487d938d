//! Reply classification: does the final message wait on the user?
//!
//! This is a heuristic and only feeds the `expects_reply` hint on a
//! completed turn. Control flow never depends on it; whether a turn is over
//! is decided by the reasoner's decision alone.

/// Decides whether a user-facing message asks the user for something.
pub trait Classifier: Send + Sync {
    fn expects_reply(&self, text: &str) -> bool;
}

/// Phrases that read as a request for more input.
const ASKING_PHRASES: [&str; 7] = [
    "please provide",
    "could you tell",
    "which one",
    "would you like",
    "请问",
    "请提供",
    "您想",
];

/// Keyword and punctuation rules.
///
/// A message expects a reply when its last sentence is a question (`?`,
/// `？`, or a trailing `吗`) or when it contains one of a few fixed asking
/// phrases.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn expects_reply(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }

        let last_line = trimmed.lines().last().unwrap_or(trimmed).trim_end();
        if last_line.ends_with('?') || last_line.ends_with('？') || last_line.ends_with('吗') {
            return true;
        }

        let lower = trimmed.to_lowercase();
        ASKING_PHRASES.iter().any(|phrase| lower.contains(phrase))
    }
}
