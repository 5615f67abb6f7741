//! Result types returned by the study operations.
//!
//! Everything here is `Serialize + Deserialize` so a front end can hand the
//! values straight to its JSON layer, and so chat history can round-trip
//! through a file between CLI invocations.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// A generated summary, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    /// Model that produced the text.
    pub model: String,
}

/// One multiple-choice question.
///
/// Decoding validates that `options` has exactly four entries and that
/// `answer` indexes one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mcq {
    pub question: String,
    pub options: Vec<String>,
    /// Zero-based index into `options`.
    pub answer: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Mcq {
    /// Letter label (`A`–`D`) of the correct option.
    pub fn answer_label(&self) -> char {
        b'A'.saturating_add(self.answer) as char
    }
}

/// A validated set of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqSet {
    pub mcqs: Vec<Mcq>,
    pub model: String,
}

impl McqSet {
    /// Render the numbered plain-text quiz layout used for printing and export:
    ///
    /// ```text
    /// 1. Question?
    /// A) first
    /// B) second
    /// C) third
    /// D) fourth
    /// Answer: B
    /// ```
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for (i, q) in self.mcqs.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("{}. {}\n", i + 1, q.question));
            for (j, opt) in q.options.iter().enumerate() {
                out.push_str(&format!("{}) {}\n", (b'A' + j as u8) as char, opt));
            }
            out.push_str(&format!("Answer: {}\n", q.answer_label()));
        }
        out
    }
}

// ── Saved quiz text ──────────────────────────────────────────────────────────

/// Start of a numbered question line: `12. `.
static QUIZ_BLOCK_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\d+\.\s").unwrap());
static QUIZ_QUESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\s+(.+?)\r?\n").unwrap());
static QUIZ_OPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[A-D]\)\s+(.+)$").unwrap());
static QUIZ_ANSWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Answer:\s*([A-D])").unwrap());

/// Read questions back from the layout written by [`McqSet::to_plain_text`].
///
/// A block needs a numbered question line, exactly four `A)`–`D)` option
/// lines and an `Answer: X` line (letter case-insensitive). Blocks that do
/// not are skipped with a warning; an input with no valid block yields an
/// empty list. Explanations are not part of the layout and come back `None`.
pub fn parse_quiz_text(text: &str) -> Vec<Mcq> {
    let text = text.trim();
    let mut starts: Vec<usize> = QUIZ_BLOCK_START.find_iter(text).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut mcqs = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = &text[start..end];
        match parse_quiz_block(block) {
            Some(q) => mcqs.push(q),
            None if block.trim().is_empty() => {}
            None => {
                let preview: String = block.chars().take(100).collect();
                warn!("Skipped malformed quiz block: {:?}", preview);
            }
        }
    }
    debug!("Loaded {} questions from quiz text", mcqs.len());
    mcqs
}

fn parse_quiz_block(block: &str) -> Option<Mcq> {
    // The question line must end in a newline; options always follow it.
    let question = QUIZ_QUESTION.captures(block)?.get(1)?.as_str().trim();
    let options: Vec<String> = QUIZ_OPTION
        .captures_iter(block)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();
    if options.len() != 4 {
        return None;
    }
    let letter = QUIZ_ANSWER.captures(block)?.get(1)?.as_str().to_ascii_uppercase();
    let answer = letter.bytes().next()?.checked_sub(b'A')?;
    Some(Mcq {
        question: question.to_string(),
        options,
        answer,
        explanation: None,
    })
}

/// One flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardDeck {
    pub flashcards: Vec<Flashcard>,
    pub model: String,
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    #[serde(alias = "ai", alias = "model")]
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => f.write_str("User"),
            ChatRole::Assistant => f.write_str("Assistant"),
        }
    }
}

/// One entry of a conversation, oldest first in a history slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub model: String,
}
