//! Prompt text for the four study tasks.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: each structured prompt spells out the
//!    JSON shape that [`crate::pipeline::coerce`] decodes, so the contract
//!    between what we ask for and what we parse lives in one place.
//!
//! 2. **Testability**: unit tests inspect prompts directly without a model.
//!
//! Every builder bounds its context with [`truncate_context`] before
//! embedding it. Oversized input is cut, never rejected.

use crate::config::StudyConfig;
use crate::output::ChatTurn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Appended to a context that was cut at its bound.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// Appended to every structured prompt.
pub const STRICT_JSON_SUFFIX: &str = "Provide the output strictly as a JSON object. \
Do not include Markdown blocks (```json ... ```).";

/// The task a prompt is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Summary,
    Mcq,
    Flashcards,
    Chat,
}

impl TaskKind {
    /// Whether the output is decoded as JSON rather than taken as text.
    pub fn is_structured(self) -> bool {
        matches!(self, TaskKind::Mcq | TaskKind::Flashcards)
    }

    /// Context bound for this task under `config`.
    pub fn context_limit(self, config: &StudyConfig) -> usize {
        match self {
            TaskKind::Summary => config.limits.summary,
            TaskKind::Mcq => config.limits.mcq,
            TaskKind::Flashcards => config.limits.flashcards,
            TaskKind::Chat => config.limits.chat,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Summary => "summary",
            TaskKind::Mcq => "mcq",
            TaskKind::Flashcards => "flashcards",
            TaskKind::Chat => "chat",
        })
    }
}

/// A bounded context paired with its task directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub kind: TaskKind,
    /// Grounding text, already truncated.
    pub context: String,
    /// Task directive, placed before the context.
    pub instruction: String,
    /// Output contract, placed after the context.
    pub output_format: String,
    /// Whether `context` was cut.
    pub truncated: bool,
}

impl TaskRequest {
    /// The exact prompt text sent to the model.
    pub fn render(&self) -> String {
        let mut prompt = String::with_capacity(
            self.instruction.len() + self.context.len() + self.output_format.len() + 64,
        );
        prompt.push_str(self.instruction.trim_end());
        prompt.push_str("\n\n");
        prompt.push_str(&self.context);
        if !self.output_format.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.output_format);
        }
        prompt
    }
}

/// Keep at most `max_chars` characters of `text`, appending
/// [`TRUNCATION_MARKER`] when anything was dropped.
///
/// Cuts on a `char` boundary. Returns the text and whether it was cut.
pub fn truncate_context(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            (out, true)
        }
        None => (text.to_string(), false),
    }
}

/// Summary prompt: plain-text sections with headings.
pub fn summary_request(text: &str, max_chars: usize) -> TaskRequest {
    let (context, truncated) = truncate_context(text, max_chars);
    TaskRequest {
        kind: TaskKind::Summary,
        context: format!("Text:\n{context}"),
        instruction: SUMMARY_INSTRUCTION.to_string(),
        output_format: String::new(),
        truncated,
    }
}

const SUMMARY_INSTRUCTION: &str = r#"You are a study assistant. Your task is to generate a clean, readable summary of the following text.

Instructions:
- The output should be in simple plain text.
- Use clear section headings named after the topics of the text.
- Do NOT use any Markdown symbols like # or **.
- Each section should start with a title and a brief paragraph summarizing that topic.
- The summary should be structured, informative, and readable."#;

/// MCQ prompt asking for `count` questions in the `{"mcqs": [...]}` shape.
pub fn mcq_request(text: &str, max_chars: usize, count: usize) -> TaskRequest {
    let (context, truncated) = truncate_context(text, max_chars);
    TaskRequest {
        kind: TaskKind::Mcq,
        context: format!("Content:\n{context}"),
        instruction: format!(
            "Generate {count} multiple choice questions (MCQs) based on the following study material.\n\
Each question must have exactly 4 options and exactly one correct option.\n\
The \"answer\" field is the zero-based index (0, 1, 2 or 3) of the correct option."
        ),
        output_format: format!(
            r#"Return output as a JSON object:
{{
    "mcqs": [
        {{
            "question": "Question text?",
            "options": ["Option A", "Option B", "Option C", "Option D"],
            "answer": 0
        }}
    ]
}}

{STRICT_JSON_SUFFIX}"#
        ),
        truncated,
    }
}

/// Flashcard prompt asking for `count` cards in the `{"flashcards": [...]}` shape.
pub fn flashcard_request(text: &str, max_chars: usize, count: usize) -> TaskRequest {
    let (context, truncated) = truncate_context(text, max_chars);
    TaskRequest {
        kind: TaskKind::Flashcards,
        context: format!("Content:\n{context}"),
        instruction: format!(
            "Generate {count} key concept flashcards based on the following text.\n\
Each flashcard should have a 'front' (the term or question) and a 'back' (the definition or answer)."
        ),
        output_format: format!(
            r#"Return output as a JSON object:
{{
    "flashcards": [
        {{
            "front": "Term",
            "back": "Definition"
        }}
    ]
}}

{STRICT_JSON_SUFFIX}"#
        ),
        truncated,
    }
}

/// Chat prompt grounded in `document`, carrying the last `history_turns`
/// turns of `history`.
pub fn chat_request(
    document: &str,
    query: &str,
    history: &[ChatTurn],
    max_chars: usize,
    history_turns: usize,
) -> TaskRequest {
    let (context, truncated) = truncate_context(document, max_chars);
    let recent = &history[history.len().saturating_sub(history_turns)..];
    let history_block = format_history(recent);

    TaskRequest {
        kind: TaskKind::Chat,
        context: format!("Document Content:\n{context}"),
        instruction: "You are an intelligent assistant helping a user understand a document."
            .to_string(),
        output_format: format!(
            "Chat History:\n{history_block}\n\n\
User Question: {query}\n\n\
Answer based ONLY on the document provided. If the answer is not in the document, \
say \"I cannot find the answer in the document.\""
        ),
        truncated,
    }
}

/// `Role: content` lines, oldest first.
pub fn format_history(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_untouched() {
        let (out, cut) = truncate_context("hello", 10);
        assert_eq!(out, "hello");
        assert!(!cut);
    }

    #[test]
    fn exact_bound_untouched() {
        let (out, cut) = truncate_context("hello", 5);
        assert_eq!(out, "hello");
        assert!(!cut);
    }

    #[test]
    fn long_text_cut_with_marker() {
        let text = "a".repeat(120);
        let (out, cut) = truncate_context(&text, 100);
        assert!(cut);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), 100 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn cuts_on_char_boundary() {
        let (out, cut) = truncate_context("ééééé", 2);
        assert!(cut);
        assert_eq!(out, format!("éé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn mcq_prompt_states_contract() {
        let req = mcq_request("Cats are mammals.", 50_000, 10);
        let prompt = req.render();
        assert!(prompt.contains("Generate 10 multiple choice"));
        assert!(prompt.contains("\"mcqs\""));
        assert!(prompt.contains("\"options\""));
        assert!(prompt.contains("\"answer\": 0"));
        assert!(prompt.contains("Cats are mammals."));
        assert!(prompt.ends_with(STRICT_JSON_SUFFIX));
        assert!(req.kind.is_structured());
    }

    #[test]
    fn flashcard_prompt_states_contract() {
        let prompt = flashcard_request("Mitochondria", 50_000, 5).render();
        assert!(prompt.contains("Generate 5 key concept flashcards"));
        assert!(prompt.contains("\"front\": \"Term\""));
        assert!(prompt.contains("\"back\": \"Definition\""));
    }

    #[test]
    fn summary_prompt_is_text_task() {
        let req = summary_request("Arrays and lists", 100_000);
        assert!(!req.kind.is_structured());
        assert!(req.render().contains("section headings"));
        assert!(req.render().contains("Arrays and lists"));
    }

    #[test]
    fn summary_bound_applies() {
        let text = "x".repeat(200);
        let req = summary_request(&text, 50);
        assert!(req.truncated);
        assert!(req.render().contains(&format!("{}{}", "x".repeat(50), TRUNCATION_MARKER)));
        assert!(!req.render().contains(&"x".repeat(51)));
    }

    #[test]
    fn chat_keeps_only_recent_turns() {
        let history: Vec<ChatTurn> = (0..6)
            .flat_map(|i| {
                [
                    ChatTurn::user(format!("question {i}")),
                    ChatTurn::assistant(format!("answer {i}")),
                ]
            })
            .collect();
        let prompt = chat_request("doc", "what now?", &history, 30_000, 4).render();
        assert!(!prompt.contains("question 3"));
        assert!(prompt.contains("User: question 4\nAssistant: answer 4\nUser: question 5\nAssistant: answer 5"));
        assert!(prompt.contains("User Question: what now?"));
        assert!(prompt.contains("Answer based ONLY on the document"));
    }

    #[test]
    fn chat_with_empty_history() {
        let prompt = chat_request("doc text", "q", &[], 30_000, 10).render();
        assert!(prompt.contains("Document Content:\ndoc text"));
        assert!(prompt.contains("Chat History:\n\n"));
    }

    #[test]
    fn task_kind_limits() {
        let c = StudyConfig::builder("k").build().unwrap();
        assert_eq!(TaskKind::Summary.context_limit(&c), 100_000);
        assert_eq!(TaskKind::Flashcards.context_limit(&c), 50_000);
        assert_eq!(TaskKind::Chat.context_limit(&c), 30_000);
        assert_eq!(TaskKind::Mcq.to_string(), "mcq");
    }
}
