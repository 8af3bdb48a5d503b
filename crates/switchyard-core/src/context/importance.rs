//! Message importance scoring.
//!
//! Weighted sum over keyword hits, length, a trailing question mark and
//! code-like markers, bucketed into Low/Medium/High. System messages are
//! always Critical.

use switchyard_types::conversation::ImportanceLevel;
use switchyard_types::llm::Message;

const HIGH_IMPORTANCE_KEYWORDS: &[&str] = &[
    "important",
    "critical",
    "must",
    "remember",
    "requirement",
    "required",
    "deadline",
    "decision",
    "decided",
    "error",
    "bug",
    "never",
    "always",
    "key point",
    "don't forget",
];

const LOW_IMPORTANCE_KEYWORDS: &[&str] = &[
    "thanks",
    "thank you",
    "ok",
    "okay",
    "cool",
    "nice",
    "lol",
    "hello",
    "hi",
    "bye",
    "sure",
    "great",
];

const CODE_MARKERS: &[&str] = &["```", "fn ", "def ", "class ", "import ", "=>", "();", "{\n", "</"];

const HIGH_KEYWORD_WEIGHT: f64 = 2.0;
const MAX_HIGH_HITS: usize = 3;
const LOW_KEYWORD_WEIGHT: f64 = -1.5;
const LONG_MESSAGE_CHARS: usize = 200;
const VERY_LONG_MESSAGE_CHARS: usize = 500;
const SHORT_MESSAGE_CHARS: usize = 20;
const QUESTION_WEIGHT: f64 = 1.5;
const CODE_WEIGHT: f64 = 1.5;

const HIGH_THRESHOLD: f64 = 3.5;
const MEDIUM_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceScorer;

/// Single words match whole words only, so "ok" does not hit "token".
fn hits(lowered: &str, words: &[&str], keyword: &str) -> bool {
    if keyword.contains(' ') || keyword.contains('\'') {
        lowered.contains(keyword)
    } else {
        words.contains(&keyword)
    }
}

impl ImportanceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Raw weighted score of a message's content.
    pub fn score(&self, message: &Message) -> f64 {
        let content = message.content.as_str();
        let lowered = content.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let high = HIGH_IMPORTANCE_KEYWORDS
            .iter()
            .filter(|k| hits(&lowered, &words, k))
            .count()
            .min(MAX_HIGH_HITS);
        let low = LOW_IMPORTANCE_KEYWORDS
            .iter()
            .filter(|k| hits(&lowered, &words, k))
            .count();

        let mut score = high as f64 * HIGH_KEYWORD_WEIGHT + low as f64 * LOW_KEYWORD_WEIGHT;

        let chars = content.chars().count();
        if chars > LONG_MESSAGE_CHARS {
            score += 1.0;
        }
        if chars > VERY_LONG_MESSAGE_CHARS {
            score += 1.0;
        }
        if chars < SHORT_MESSAGE_CHARS {
            score -= 1.0;
        }
        if content.trim_end().ends_with('?') {
            score += QUESTION_WEIGHT;
        }
        if CODE_MARKERS.iter().any(|m| content.contains(m)) {
            score += CODE_WEIGHT;
        }
        score
    }

    pub fn classify(&self, message: &Message) -> ImportanceLevel {
        if message.is_system() {
            return ImportanceLevel::Critical;
        }
        let score = self.score(message);
        if score >= HIGH_THRESHOLD {
            ImportanceLevel::High
        } else if score >= MEDIUM_THRESHOLD {
            ImportanceLevel::Medium
        } else {
            ImportanceLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_is_critical() {
        let scorer = ImportanceScorer::new();
        assert_eq!(
            scorer.classify(&Message::system("ok")),
            ImportanceLevel::Critical
        );
    }

    #[test]
    fn test_small_talk_is_low() {
        let scorer = ImportanceScorer::new();
        assert_eq!(scorer.classify(&Message::user("ok thanks")), ImportanceLevel::Low);
        assert_eq!(scorer.classify(&Message::assistant("Hello!")), ImportanceLevel::Low);
    }

    #[test]
    fn test_question_is_medium() {
        let scorer = ImportanceScorer::new();
        let msg = Message::user("How do I configure the proxy settings?");
        assert!((scorer.score(&msg) - 1.5).abs() < f64::EPSILON);
        assert_eq!(scorer.classify(&msg), ImportanceLevel::Medium);
    }

    #[test]
    fn test_keywords_and_code_are_high() {
        let scorer = ImportanceScorer::new();
        let msg = Message::user(
            "Important: remember that the deploy must use this config:\n```\nport = 8080\n```",
        );
        // 3 capped high hits (6.0) + code (1.5)
        assert!((scorer.score(&msg) - 7.5).abs() < f64::EPSILON);
        assert_eq!(scorer.classify(&msg), ImportanceLevel::High);
    }

    #[test]
    fn test_whole_word_matching() {
        let scorer = ImportanceScorer::new();
        let msg = Message::user("The token estimator looks reasonable overall.");
        // no "ok" hit inside "token", no "hi" hit inside "this"
        assert!((scorer.score(&msg) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_length_bonus() {
        let scorer = ImportanceScorer::new();
        let long = Message::assistant("word ".repeat(120));
        assert!((scorer.score(&long) - 2.0).abs() < f64::EPSILON);
        assert_eq!(scorer.classify(&long), ImportanceLevel::Medium);
    }
}
