//! CLI binary for edgequake-studyaid.
//!
//! A thin shim over the library crate that maps subcommands to
//! `StudyAssistant` operations and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_studyaid::pipeline::resolve::select_model;
use edgequake_studyaid::{
    export_questions_to_file, extract_text, parse_quiz_text, ChatTurn, Mcq, StudyAssistant,
    StudyConfig, StudyConfigBuilder,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use rand::seq::SliceRandom;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise lecture notes
  studyaid summarize lecture.pdf

  # Fifteen quiz questions, also saved as a printable PDF
  studyaid mcq chapter3.docx --count 15 --pdf quiz.pdf

  # Flashcards as JSON for another tool
  studyaid --json flashcards notes.md > cards.json

  # Ask about a document, keeping the conversation in a file
  studyaid chat paper.pdf --query "What is the main result?" \
      --history chat.json --update-history

  # Take a saved quiz in random order (no API key needed)
  studyaid mcq notes.pdf -o quiz.txt && studyaid --json quiz quiz.txt --shuffle

  # Read text from stdin
  cat notes.txt | studyaid summarize -

  # Which models can this key use, and which one would be picked?
  studyaid models

SUPPORTED INPUTS:
  .pdf    text layer via pdfium (scanned pages without text are rejected)
  .docx   Word documents
  .txt    plain text
  .md     Markdown, sent as written
  -       plain text from stdin

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY      Gemini API key (GEMINI_API_KEY is also accepted)
  STUDYAID_MODEL      Fixed model ID; skips model discovery
  STUDYAID_BASE_URL   Alternative Gemini endpoint
  PDFIUM_LIB_PATH     Path to libpdfium (or its directory) for PDF input/output
  RUST_LOG            Log filter, overrides --verbose / --quiet

RATE LIMITS:
  A 429 from Gemini is retried with linear backoff (2s, 4s, ... plus up to
  1s of jitter), or after the server's Retry-After when longer (at most 30s).
  Other errors are reported immediately.
"#;

/// Summaries, quizzes, flashcards and document chat from your study material.
#[derive(Parser, Debug)]
#[command(
    name = "studyaid",
    version,
    about = "Summaries, quizzes, flashcards and document chat powered by Gemini",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini model ID; skips model discovery (e.g. gemini-1.5-pro).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Retries after a rate-limited call (total attempts = retries + 1).
    #[arg(long, global = true, default_value_t = 2)]
    max_retries: u32,

    /// Sampling temperature (0.0–2.0). Provider default when unset.
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, default_value_t = 60)]
    timeout: u64,

    /// Print results as JSON.
    #[arg(long, global = true, env = "STUDYAID_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STUDYAID_VERBOSE")]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true, env = "STUDYAID_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the extracted text of a document (no API key needed).
    Extract(InputArgs),

    /// Summarise a document as headed plain-text sections.
    Summarize(InputArgs),

    /// Generate multiple-choice questions.
    Mcq {
        #[command(flatten)]
        input: InputArgs,

        /// Number of questions to request.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Also export the questions as a PDF.
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// Title for the exported PDF.
        #[arg(long, default_value = "Multiple Choice Questions")]
        title: String,
    },

    /// Generate flashcards.
    Flashcards {
        #[command(flatten)]
        input: InputArgs,

        /// Number of cards to request.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Ask a question answered only from the document.
    Chat {
        #[command(flatten)]
        input: InputArgs,

        /// The question.
        #[arg(long)]
        query: String,

        /// JSON file holding earlier turns: [{"role":"user","content":"..."}, ...].
        #[arg(long)]
        history: Option<PathBuf>,

        /// Append this exchange to the --history file.
        #[arg(long, requires = "history")]
        update_history: bool,
    },

    /// Render a text file (e.g. saved quiz output) as a PDF.
    ExportPdf {
        /// Text file to render, or - for stdin.
        input: String,

        /// Output PDF path.
        #[arg(short, long)]
        output: PathBuf,

        /// Title printed on the first page.
        #[arg(long, default_value = "Multiple Choice Questions")]
        title: String,
    },

    /// Load questions from saved quiz text (the `mcq` output); no API key needed.
    Quiz {
        /// Quiz text file, or - for stdin.
        input: String,

        /// Present the questions in random order.
        #[arg(long)]
        shuffle: bool,
    },

    /// List generation-capable models and the one discovery would pick.
    Models,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Document path (.pdf, .docx, .txt, .md), or - for stdin.
    input: String,

    /// Write the result to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO lines would tear through the spinner; it gives the same feedback.
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Extract(args) => {
            let text = read_input(&args.input).await?;
            emit(&cli, args.output.as_deref(), &text, &serde_json::json!({ "text": text }))
                .await?;
        }

        Command::Summarize(args) => {
            let assistant = build_assistant(&cli, |b| b)?;
            let text = read_input(&args.input).await?;
            let spinner = spinner(&cli, "Summarising…");
            let out = assistant.summarize(&text).await;
            finish(spinner);
            let out = out.context("Summary failed")?;
            emit(&cli, args.output.as_deref(), &out.summary, &out).await?;
            done(&cli, &format!("summary by {}", out.model));
        }

        Command::Mcq {
            input,
            count,
            pdf,
            title,
        } => {
            let assistant = build_assistant(&cli, |b| b.question_count(*count))?;
            let text = read_input(&input.input).await?;
            let spinner = spinner(&cli, "Writing questions…");
            let out = assistant.generate_mcqs(&text).await;
            finish(spinner);
            let out = out.context("Question generation failed")?;

            let rendered = out.to_plain_text();
            emit(&cli, input.output.as_deref(), &rendered, &out).await?;
            if let Some(path) = pdf {
                let bytes = export_questions_to_file(&rendered, title, path)
                    .await
                    .context("PDF export failed")?;
                done(&cli, &format!("{} → {} ({} bytes)", title, path.display(), bytes));
            }
            done(&cli, &format!("{} questions by {}", out.mcqs.len(), out.model));
        }

        Command::Flashcards { input, count } => {
            let assistant = build_assistant(&cli, |b| b.flashcard_count(*count))?;
            let text = read_input(&input.input).await?;
            let spinner = spinner(&cli, "Writing flashcards…");
            let out = assistant.generate_flashcards(&text).await;
            finish(spinner);
            let out = out.context("Flashcard generation failed")?;

            let rendered: String = out
                .flashcards
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {}\n   {}\n", i + 1, c.front, c.back))
                .collect();
            emit(&cli, input.output.as_deref(), &rendered, &out).await?;
            done(&cli, &format!("{} flashcards by {}", out.flashcards.len(), out.model));
        }

        Command::Chat {
            input,
            query,
            history,
            update_history,
        } => {
            let assistant = build_assistant(&cli, |b| b)?;
            let text = read_input(&input.input).await?;
            let mut turns = match history {
                Some(path) => load_history(path).await?,
                None => Vec::new(),
            };

            let spinner = spinner(&cli, "Thinking…");
            let out = assistant.chat(&text, query, &turns).await;
            finish(spinner);
            let out = out.context("Chat failed")?;
            emit(&cli, input.output.as_deref(), &out.answer, &out).await?;

            if let (true, Some(path)) = (*update_history, history) {
                turns.push(ChatTurn::user(query.trim()));
                turns.push(ChatTurn::assistant(out.answer.clone()));
                let json =
                    serde_json::to_string_pretty(&turns).context("Failed to serialise history")?;
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("Failed to write history to {:?}", path))?;
            }
        }

        Command::ExportPdf {
            input,
            output,
            title,
        } => {
            let text = read_text_file(input).await?;
            let bytes = export_questions_to_file(&text, title, output)
                .await
                .context("PDF export failed")?;
            done(&cli, &format!("{} ({} bytes)", output.display(), bytes));
        }

        Command::Quiz { input, shuffle } => {
            let text = read_text_file(input).await?;
            let mut mcqs = parse_quiz_text(&text);
            if mcqs.is_empty() {
                anyhow::bail!("No valid questions found in {:?}", input);
            }
            if *shuffle {
                mcqs.shuffle(&mut rand::thread_rng());
            }
            let rendered = render_quiz(&mcqs);
            emit(&cli, None, &rendered, &serde_json::json!({ "mcqs": mcqs })).await?;
            done(&cli, &format!("{} questions loaded", mcqs.len()));
        }

        Command::Models => {
            let config = base_config(&cli)?.build().context("Invalid configuration")?;
            let preferences = config.preferences.clone();
            let assistant = StudyAssistant::new(config).context("Failed to create client")?;
            let models = assistant
                .list_models()
                .await
                .context("Failed to list models")?;
            let selected = select_model(&models, &preferences);

            if cli.json {
                let json = serde_json::to_string_pretty(&serde_json::json!({
                    "models": models,
                    "selected": selected,
                }))
                .context("Failed to serialise output")?;
                println!("{json}");
            } else {
                for id in &models {
                    if Some(id) == selected.as_ref() {
                        println!("{} {}", cyan("●"), bold(id));
                    } else {
                        println!("  {}", id);
                    }
                }
                if !cli.quiet {
                    eprintln!("{}", dim(&format!("{} models available", models.len())));
                }
            }
        }
    }

    Ok(())
}

/// Config from the environment with global flags applied.
fn base_config(cli: &Cli) -> Result<StudyConfigBuilder> {
    let mut builder = StudyConfig::from_env()
        .context("Gemini credentials are required for this command")?
        .max_attempts(cli.max_retries.saturating_add(1))
        .request_timeout_secs(cli.timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    Ok(builder)
}

fn build_assistant(
    cli: &Cli,
    customise: impl FnOnce(StudyConfigBuilder) -> StudyConfigBuilder,
) -> Result<StudyAssistant> {
    let config = customise(base_config(cli)?)
        .build()
        .context("Invalid configuration")?;
    StudyAssistant::new(config).context("Failed to create client")
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        return read_stdin().await;
    }
    extract_text(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))
}

/// Raw UTF-8 text from a file or stdin, without document extraction.
async fn read_text_file(input: &str) -> Result<String> {
    if input == "-" {
        return read_stdin().await;
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))
}

async fn read_stdin() -> Result<String> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Failed to read stdin")?;
    Ok(text)
}

/// Interactive-style listing: options, then the answer letter on its own line.
fn render_quiz(mcqs: &[Mcq]) -> String {
    let mut out = String::new();
    for (i, q) in mcqs.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, bold(&q.question)));
        for (j, opt) in q.options.iter().enumerate() {
            out.push_str(&format!("   {}) {}\n", (b'A' + j as u8) as char, opt));
        }
        out.push_str(&format!("   {}\n\n", dim(&format!("Answer: {}", q.answer_label()))));
    }
    out
}

async fn load_history(path: &Path) -> Result<Vec<ChatTurn>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) if json.trim().is_empty() => Ok(Vec::new()),
        Ok(json) => serde_json::from_str(&json)
            .with_context(|| format!("Invalid chat history in {:?}", path)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}

/// Write `text` (or `value` as JSON with `--json`) to `output` or stdout.
async fn emit<T: Serialize>(cli: &Cli, output: Option<&Path>, text: &str, value: &T) -> Result<()> {
    let body = if cli.json {
        serde_json::to_string_pretty(value).context("Failed to serialise output")?
    } else {
        text.to_string()
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &body)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            done(cli, &format!("wrote {}", path.display()));
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(body.as_bytes())
                .context("Failed to write to stdout")?;
            if !body.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}

fn spinner(cli: &Cli, message: &str) -> Option<ProgressBar> {
    if cli.quiet || cli.json {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn finish(spinner: Option<ProgressBar>) {
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}

fn done(cli: &Cli, message: &str) {
    if !cli.quiet && !cli.json {
        eprintln!("{} {}", green("✔"), dim(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mcq_with_export() {
        let cli = Cli::try_parse_from([
            "studyaid", "mcq", "notes.pdf", "--count", "5", "--pdf", "quiz.pdf", "--max-retries", "4",
        ])
        .unwrap();
        assert_eq!(cli.max_retries, 4);
        match cli.command {
            Command::Mcq { input, count, pdf, .. } => {
                assert_eq!(input.input, "notes.pdf");
                assert_eq!(count, 5);
                assert_eq!(pdf, Some(PathBuf::from("quiz.pdf")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn update_history_requires_history_file() {
        assert!(Cli::try_parse_from([
            "studyaid", "chat", "doc.txt", "--query", "why?", "--update-history"
        ])
        .is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["studyaid", "summarize", "a.md", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
    }

    #[tokio::test]
    async fn missing_history_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let turns = load_history(&dir.path().join("none.json")).await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn history_file_accepts_frontend_roles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        std::fs::write(&path, r#"[{"role":"user","content":"hi"},{"role":"ai","content":"hello"}]"#)
            .unwrap();
        let turns = load_history(&path).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "hello");
    }

    #[test]
    fn parses_quiz_with_shuffle() {
        let cli = Cli::try_parse_from(["studyaid", "quiz", "quiz.txt", "--shuffle"]).unwrap();
        match cli.command {
            Command::Quiz { input, shuffle } => {
                assert_eq!(input, "quiz.txt");
                assert!(shuffle);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn saved_quiz_file_renders_with_answers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiz.txt");
        std::fs::write(&path, "1. What are cats?\nA) Mammals\nB) Birds\nC) Fish\nD) Reptiles\nAnswer: A\n")
            .unwrap();
        let text = read_text_file(path.to_str().unwrap()).await.unwrap();
        let mcqs = parse_quiz_text(&text);
        assert_eq!(mcqs.len(), 1);

        let rendered = render_quiz(&mcqs);
        assert!(rendered.contains("   D) Reptiles\n"));
        assert!(rendered.contains("Answer: A"));
    }

    #[test]
    fn colour_helpers_wrap() {
        assert!(cyan("x").contains('x'));
        assert!(bold("x").starts_with("\x1b[1m"));
    }
}
