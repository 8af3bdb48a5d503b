//! Extractive summaries for pruned conversation history.
//!
//! No model call: the summary is stitched together from the user's
//! questions, the most frequent topic words and the first sentence of each
//! assistant answer, then cut to a token cap.

use std::collections::HashMap;

use switchyard_types::llm::{Message, MessageRole, SUMMARY_PREFIX};

use super::estimator::TokenEstimator;

const MAX_TOPICS: usize = 5;
const MIN_TOPIC_LEN: usize = 5;
const MAX_SENTENCE_CHARS: usize = 160;

const ASKED_LABEL: &str = "User asked: ";
const TOPICS_LABEL: &str = "Topics: ";
const ANSWERED_LABEL: &str = "Assistant answered: ";

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "could", "their", "there", "these", "thing", "think", "those",
    "where", "which", "while", "would", "should", "other", "really", "being", "because", "before",
    "might", "still", "first", "using", "hello", "thanks",
];

/// `(older, recent)` where `recent` is the last `keep_recent` messages.
pub fn split_for_summary(messages: &[Message], keep_recent: usize) -> (&[Message], &[Message]) {
    messages.split_at(messages.len().saturating_sub(keep_recent))
}

/// First sentence of `text`, capped in length.
fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map_or(trimmed.len(), |(i, c)| i + c.len_utf8());
    let sentence: String = trimmed[..end].trim().chars().take(MAX_SENTENCE_CHARS).collect();
    sentence
}

/// Question sentences of a user message, or its first sentence if it asks none.
fn questions(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            if c == '?' {
                let q = text[start..=i].trim();
                if !q.is_empty() {
                    out.push(q.chars().take(MAX_SENTENCE_CHARS).collect());
                }
            }
            start = i + c.len_utf8();
        }
    }
    if out.is_empty() {
        let sentence = first_sentence(text);
        if !sentence.is_empty() {
            out.push(sentence);
        }
    }
    out
}

/// Most frequent content words, ties broken by first appearance.
fn topics<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0;
    for text in texts {
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= MIN_TOPIC_LEN && !STOPWORDS.contains(&w.as_str()))
        {
            let entry = counts.entry(word).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(word, _)| word)
        .collect()
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Joins content carried from earlier summaries with fresh content. Once
/// the line would overflow, the carried part keeps at most half the room.
fn section(carried: &[String], fresh: &[String], budget: usize) -> String {
    let carried = carried.join(" ");
    let fresh = fresh.join(" ");
    if carried.is_empty() {
        return clip(&fresh, budget);
    }
    if fresh.is_empty() {
        return clip(&carried, budget);
    }
    if carried.chars().count() + 1 + fresh.chars().count() <= budget {
        return format!("{carried} {fresh}");
    }
    let older = clip(&carried, budget / 2);
    let room = budget.saturating_sub(older.chars().count() + 1);
    format!("{older} {}", clip(&fresh, room))
}

/// What a batch of messages asked, answered and talked about, oldest first.
#[derive(Debug, Default)]
struct Digest {
    condensed: usize,
    carried_asked: Vec<String>,
    carried_answered: Vec<String>,
    asked: Vec<String>,
    answered: Vec<String>,
    /// Text fed to topic detection.
    topic_text: Vec<String>,
}

impl Digest {
    fn collect(messages: &[Message]) -> Self {
        let mut digest = Self::default();
        for message in messages {
            if message.is_summary() {
                digest.absorb_summary(&message.content);
                continue;
            }
            digest.condensed += 1;
            digest.topic_text.push(message.content.clone());
            match message.role {
                MessageRole::User => digest.asked.extend(questions(&message.content)),
                MessageRole::Assistant => {
                    let sentence = first_sentence(&message.content);
                    if !sentence.is_empty() {
                        digest.answered.push(sentence);
                    }
                }
                MessageRole::System => {}
            }
        }
        digest
    }

    /// Fold an earlier summary back in: its message count, questions,
    /// answers and topics carry over.
    fn absorb_summary(&mut self, text: &str) {
        let mut counted = false;
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix(SUMMARY_PREFIX) {
                if let Some(n) = rest
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                {
                    self.condensed += n;
                    counted = true;
                }
            } else if let Some(rest) = line.strip_prefix(ASKED_LABEL) {
                self.carried_asked.push(rest.trim().to_string());
                self.topic_text.push(rest.to_string());
            } else if let Some(rest) = line.strip_prefix(ANSWERED_LABEL) {
                self.carried_answered.push(rest.trim().to_string());
                self.topic_text.push(rest.to_string());
            } else if let Some(rest) = line.strip_prefix(TOPICS_LABEL) {
                self.topic_text.push(rest.to_string());
            }
        }
        if !counted {
            self.condensed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSummarizer {
    estimator: TokenEstimator,
    max_tokens: u32,
}

impl ExtractiveSummarizer {
    pub fn new(estimator: TokenEstimator, max_tokens: u32) -> Self {
        Self {
            estimator,
            max_tokens,
        }
    }

    /// Summary text for `messages`, at most `max_tokens` estimated tokens.
    ///
    /// Earlier summaries among `messages` are folded in, so the oldest
    /// questions and answers survive repeated summarization.
    pub fn summarize(&self, messages: &[Message]) -> String {
        let digest = Digest::collect(messages);

        let header = format!("{SUMMARY_PREFIX} {} messages condensed.", digest.condensed);
        // Leaves room for the reasoning overhead of the estimator.
        let char_budget = (self.max_tokens as usize).saturating_mul(10) / 3;
        let line_budget = char_budget.saturating_sub(header.chars().count()) * 2 / 5;

        let mut lines = vec![header];
        let asked = section(&digest.carried_asked, &digest.asked, line_budget);
        if !asked.is_empty() {
            lines.push(format!("{ASKED_LABEL}{asked}"));
        }
        let topics = topics(digest.topic_text.iter().map(String::as_str));
        if !topics.is_empty() {
            lines.push(format!("{TOPICS_LABEL}{}", topics.join(", ")));
        }
        let answered = section(&digest.carried_answered, &digest.answered, line_budget);
        if !answered.is_empty() {
            lines.push(format!("{ANSWERED_LABEL}{answered}"));
        }

        self.truncate(lines.join("\n"))
    }

    /// Summary wrapped as a synthetic system message.
    pub fn summary_message(&self, messages: &[Message]) -> Message {
        Message::system(self.summarize(messages))
    }

    fn truncate(&self, text: String) -> String {
        if self.estimator.estimate_text(&text) <= self.max_tokens {
            return text;
        }
        let mut chars: Vec<char> = text.chars().collect();
        // Start from the plain 4 chars/token budget and shrink until it fits.
        chars.truncate((self.max_tokens as usize).saturating_mul(4));
        loop {
            let candidate: String = chars.iter().collect();
            if chars.is_empty() || self.estimator.estimate_text(&candidate) <= self.max_tokens {
                return candidate;
            }
            let keep = chars.len() * 9 / 10;
            chars.truncate(keep);
        }
    }
}
