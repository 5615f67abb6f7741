//! `studyaid` binary commands that need no API key, driven through stdin.

#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_with_stdin(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_studyaid"))
        .args(args)
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn extract_reads_stdin() {
    let out = run_with_stdin(&["--json", "extract", "-"], "Cats are mammals.\n");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["text"], "Cats are mammals.\n");
}

#[test]
fn quiz_loads_saved_text_from_stdin() {
    let quiz = "1. What are cats?\nA) Mammals\nB) Birds\nC) Fish\nD) Reptiles\nAnswer: A\n\n\
                2. Broken?\nA) only one\nAnswer: A\n\n\
                3. What are dogs?\nA) Fish\nB) Mammals\nC) Birds\nD) Insects\nAnswer: b\n";
    let out = run_with_stdin(&["--json", "quiz", "-"], quiz);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let mcqs = value["mcqs"].as_array().unwrap();
    assert_eq!(mcqs.len(), 2);
    assert_eq!(mcqs[0]["question"], "What are cats?");
    assert_eq!(mcqs[1]["answer"], 1);
}

#[test]
fn quiz_without_valid_questions_fails() {
    let out = run_with_stdin(&["quiz", "-"], "no questions here\n");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("No valid questions"));
}
