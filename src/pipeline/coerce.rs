//! Response coercion: turn raw model text into the shape a task promised.
//!
//! ## Why is this necessary?
//!
//! The prompts ask for raw JSON, but the model frequently answers with
//!
//! ````text
//! ```json
//! {"flashcards": [...]}
//! ```
//! ````
//!
//! anyway. The fence shim here recognises exactly the two wrappers seen in
//! practice, an opener tagged `json` and an untagged opener, each closed by
//! a bare fence, and only as the outermost wrapper. It is not a Markdown
//! parser.
//!
//! Decoding is all-or-nothing: a payload that fails to parse, or that
//! parses but contains an item breaking a structural rule, yields a
//! [`DecodeError`] and no items at all.
//!
//! ## MCQ validation
//!
//! A question must carry exactly four options and an `answer` index in
//! `0..=3`. Anything else rejects the whole set.

use crate::error::DecodeError;
use crate::output::{Flashcard, Mcq};
use crate::provider::RawModelResponse;
use serde::de::{DeserializeOwned, Error as _};
use serde_json::Value;

/// Options every question must carry.
pub const MCQ_OPTION_COUNT: usize = 4;

/// The trimmed text payload.
pub fn as_text(raw: &RawModelResponse) -> String {
    raw.text.trim().to_string()
}

/// Strip one leading fence marker (with or without a `json` tag) and one
/// trailing fence marker, then trim.
///
/// ```rust
/// use edgequake_studyaid::pipeline::coerce::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
/// ```
pub fn strip_code_fences(input: &str) -> &str {
    let mut s = input.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Decode the fence-stripped payload as any JSON-deserialisable `T`.
pub fn as_structured<T: DeserializeOwned>(raw: &RawModelResponse) -> Result<T, DecodeError> {
    let body = strip_code_fences(&raw.text);
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

/// Pull the item array out of `{"<key>": [...]}` or accept a bare array.
///
/// The envelope is unwrapped by hand rather than via an untagged enum so a
/// bad item reports its own field error instead of a generic mismatch.
fn items_under<T: DeserializeOwned>(
    raw: &RawModelResponse,
    key: &str,
) -> Result<Vec<T>, DecodeError> {
    let items = match as_structured::<Value>(raw)? {
        Value::Object(mut map) => map.remove(key).ok_or_else(|| {
            serde_json::Error::custom(format!("expected an array or an object with a `{key}` key"))
        })?,
        other => other,
    };
    Ok(serde_json::from_value(items)?)
}

/// Decode and validate a multiple-choice payload.
pub fn decode_mcqs(raw: &RawModelResponse) -> Result<Vec<Mcq>, DecodeError> {
    let mcqs: Vec<Mcq> = items_under(raw, "mcqs")?;
    for (index, q) in mcqs.iter().enumerate() {
        validate_mcq(index, q)?;
    }
    Ok(mcqs)
}

/// Decode a flashcard payload.
pub fn decode_flashcards(raw: &RawModelResponse) -> Result<Vec<Flashcard>, DecodeError> {
    let cards: Vec<Flashcard> = items_under(raw, "flashcards")?;
    for (index, card) in cards.iter().enumerate() {
        if card.front.trim().is_empty() || card.back.trim().is_empty() {
            return Err(DecodeError::InvalidItem {
                index,
                reason: "front and back must both be non-empty".to_string(),
            });
        }
    }
    Ok(cards)
}

fn validate_mcq(index: usize, q: &Mcq) -> Result<(), DecodeError> {
    if q.question.trim().is_empty() {
        return Err(DecodeError::InvalidItem {
            index,
            reason: "question text is empty".to_string(),
        });
    }
    if q.options.len() != MCQ_OPTION_COUNT {
        return Err(DecodeError::InvalidItem {
            index,
            reason: format!(
                "expected {MCQ_OPTION_COUNT} options, got {}",
                q.options.len()
            ),
        });
    }
    if usize::from(q.answer) >= MCQ_OPTION_COUNT {
        return Err(DecodeError::InvalidItem {
            index,
            reason: format!("answer index {} is out of range 0..=3", q.answer),
        });
    }
    Ok(())
}
