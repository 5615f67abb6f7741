//! Full study pipeline against a scripted provider.
//!
//! Every test runs resolve → invoke → coerce end to end with
//! [`MockProvider`], so no network or API key is needed.

use edgequake_studyaid::provider::mock::MockProvider;
use edgequake_studyaid::{
    ChatTurn, ContextLimits, ProviderError, RetryPolicy, StudyAidError, StudyAssistant,
    StudyConfig, TaskKind,
};
use std::io::Write;
use std::sync::Arc;

const CATS_AND_DOGS: &str = "Cats are mammals. Dogs are mammals.";

/// Route library logs through the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> edgequake_studyaid::StudyConfigBuilder {
    init_tracing();
    StudyConfig::builder("test-key")
        .retry_base_delay_ms(0)
        .retry_jitter_ms(0)
}

fn assistant(mock: &Arc<MockProvider>) -> StudyAssistant {
    StudyAssistant::with_provider(config().build().unwrap(), mock.clone())
}

// ── Structured tasks ─────────────────────────────────────────────────────────

#[tokio::test]
async fn fenced_mcq_set_decodes_to_one_question() {
    let mock = Arc::new(MockProvider::new().respond(
        "```json\n{\"mcqs\":[{\"question\":\"What are cats?\",\
         \"options\":[\"Mammals\",\"Birds\",\"Fish\",\"Reptiles\"],\"answer\":0}]}\n```",
    ));
    let set = assistant(&mock).generate_mcqs(CATS_AND_DOGS).await.unwrap();

    assert_eq!(set.mcqs.len(), 1);
    assert_eq!(set.mcqs[0].answer, 0);
    assert_eq!(set.mcqs[0].options[0], "Mammals");
    assert_eq!(set.model, "gemini-1.5-flash");

    let prompts = mock.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].1.contains(CATS_AND_DOGS));
}

#[tokio::test]
async fn out_of_range_answer_rejects_whole_set() {
    let mock = Arc::new(MockProvider::new().respond(
        r#"{"mcqs":[
            {"question":"ok","options":["a","b","c","d"],"answer":2},
            {"question":"bad","options":["a","b","c","d"],"answer":7}]}"#,
    ));
    let err = assistant(&mock).generate_mcqs(CATS_AND_DOGS).await.unwrap_err();
    assert!(matches!(err, StudyAidError::Decode { task: TaskKind::Mcq, .. }), "got {err:?}");
    assert_eq!(err.category(), "decode");
}

#[tokio::test]
async fn bare_flashcard_array_accepted() {
    let mock = Arc::new(
        MockProvider::new().respond(r#"[{"front":"Mammal","back":"Warm-blooded vertebrate"}]"#),
    );
    let deck = assistant(&mock).generate_flashcards(CATS_AND_DOGS).await.unwrap();
    assert_eq!(deck.flashcards.len(), 1);
    assert_eq!(deck.flashcards[0].front, "Mammal");
}

#[tokio::test]
async fn question_count_reaches_prompt() {
    let mock = Arc::new(MockProvider::new().respond(r#"{"mcqs":[]}"#));
    let a = StudyAssistant::with_provider(config().question_count(3).build().unwrap(), mock.clone());
    let set = a.generate_mcqs(CATS_AND_DOGS).await.unwrap();
    assert!(set.mcqs.is_empty());
    assert!(mock.prompts()[0].1.contains("Generate 3 multiple choice"));
}

// ── Retry behaviour ──────────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limit_cleared_within_budget() {
    let mock = Arc::new(MockProvider::new().rate_limited(2).respond("Summary text"));
    let out = assistant(&mock).summarize(CATS_AND_DOGS).await.unwrap();
    assert_eq!(out.summary, "Summary text");
    assert_eq!(mock.generate_calls(), 3);
}

#[tokio::test]
async fn persistent_rate_limit_surfaces_after_budget() {
    let mock = Arc::new(MockProvider::new().rate_limited(10));
    let a = StudyAssistant::with_provider(config().max_attempts(4).build().unwrap(), mock.clone());
    let err = a.summarize(CATS_AND_DOGS).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert!(matches!(err, StudyAidError::Provider { attempts: 4, .. }));
    assert_eq!(mock.generate_calls(), 4);
}

#[tokio::test]
async fn permanent_failure_is_single_attempt() {
    let mock = Arc::new(MockProvider::new().fail(ProviderError::Api {
        status: 403,
        message: "API key not valid".into(),
    }));
    let err = assistant(&mock).generate_flashcards(CATS_AND_DOGS).await.unwrap_err();
    assert!(!err.is_rate_limited());
    assert!(matches!(err, StudyAidError::Provider { attempts: 1, .. }));
    assert_eq!(mock.generate_calls(), 1);
}

#[tokio::test]
async fn explicit_retry_policy_overrides_config() {
    let mock = Arc::new(MockProvider::new().rate_limited(1).respond("ok"));
    let a = assistant(&mock).with_retry_policy(RetryPolicy::immediate(1));
    assert!(a.summarize(CATS_AND_DOGS).await.unwrap_err().is_rate_limited());
}

// ── Model resolution ─────────────────────────────────────────────────────────

#[tokio::test]
async fn preferred_model_used_for_generation() {
    let mock = Arc::new(
        MockProvider::new()
            .with_models(["gemini-pro", "gemini-1.5-pro", "gemini-1.5-flash-latest"])
            .with_fallback("text"),
    );
    let a = assistant(&mock);
    assert_eq!(a.summarize("x").await.unwrap().model, "gemini-1.5-flash-latest");
    assert_eq!(mock.prompts()[0].0, "gemini-1.5-flash-latest");
}

#[tokio::test]
async fn listing_failure_still_generates_with_fallback() {
    let mock = Arc::new(
        MockProvider::new()
            .with_listing_error(ProviderError::Transport("dns failure".into()))
            .respond("fine"),
    );
    let out = assistant(&mock).summarize("x").await.unwrap();
    assert_eq!(out.model, "gemini-1.5-flash");
}

#[tokio::test]
async fn shared_assistant_resolves_once_under_concurrency() {
    let mock = Arc::new(MockProvider::new().with_fallback("answer"));
    let a = Arc::new(assistant(&mock));

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.chat("doc", &format!("question {i}"), &[]).await })
        })
        .collect();
    for t in tasks {
        assert_eq!(t.await.unwrap().unwrap().answer, "answer");
    }
    // Cold-cache racers may each list once; after that the cache serves.
    let listed = mock.list_calls();
    a.summarize("doc").await.unwrap();
    assert_eq!(mock.list_calls(), listed);
}

// ── Prompt shaping ───────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_history_is_bounded() {
    let mock = Arc::new(MockProvider::new().respond("It is in section 2."));
    let a = StudyAssistant::with_provider(config().history_turns(2).build().unwrap(), mock.clone());
    let history = vec![
        ChatTurn::user("first question"),
        ChatTurn::assistant("first answer"),
        ChatTurn::user("second question"),
        ChatTurn::assistant("second answer"),
    ];
    let out = a.chat("doc", "where?", &history).await.unwrap();
    assert_eq!(out.answer, "It is in section 2.");

    let prompt = &mock.prompts()[0].1;
    assert!(!prompt.contains("first question"));
    assert!(prompt.contains("User: second question\nAssistant: second answer"));
}

#[tokio::test]
async fn oversized_context_is_truncated_not_rejected() {
    let mock = Arc::new(MockProvider::new().respond("short"));
    let limits = ContextLimits {
        summary: 20,
        ..ContextLimits::default()
    };
    let a = StudyAssistant::with_provider(config().limits(limits).build().unwrap(), mock.clone());
    a.summarize(&"y".repeat(500)).await.unwrap();

    let prompt = &mock.prompts()[0].1;
    assert!(prompt.contains(&format!("{}...(truncated)", "y".repeat(20))));
    assert!(!prompt.contains(&"y".repeat(21)));
}

// ── File input ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_operations_extract_first() {
    let mut f = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
    f.write_all(b"# Biology\n\nCats are mammals.").unwrap();
    f.flush().unwrap();

    let mock = Arc::new(MockProvider::new().respond(r#"{"flashcards":[{"front":"Cat","back":"Mammal"}]}"#));
    let deck = assistant(&mock).generate_flashcards_file(f.path()).await.unwrap();
    assert_eq!(deck.flashcards[0].back, "Mammal");
    assert!(mock.prompts()[0].1.contains("# Biology"));
}

#[tokio::test]
async fn empty_file_is_reported_before_any_call() {
    let f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    let mock = Arc::new(MockProvider::new());
    let err = assistant(&mock).summarize_file(f.path()).await.unwrap_err();
    assert!(matches!(err, StudyAidError::EmptyDocument));
    assert_eq!(mock.list_calls(), 0);
    assert_eq!(mock.generate_calls(), 0);
}

#[tokio::test]
async fn unsupported_file_is_extraction_error() {
    let mock = Arc::new(MockProvider::new());
    let err = assistant(&mock)
        .chat_file("slides.pptx", "q", &[])
        .await
        .unwrap_err();
    assert_eq!(err.category(), "extraction");
}
