use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docqa"))
}

/// Offline configuration: hashing embedder and extractive answers.
fn setup_test_env(generation_provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(
        files_dir.join("france.txt"),
        "Paris is the capital of France.\n\nThe Seine flows through Paris.",
    )
    .unwrap();
    fs::write(
        files_dir.join("nested").join("rust.txt"),
        "Rust is a systems programming language.\n\nCargo builds Rust crates.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.md"), "Markdown is not ingested.").unwrap();

    let config_content = format!(
        r#"[knowledge_base]
path = '{}'

[chunking]
chunk_size = 200
chunk_overlap = 40

[embedding]
provider = "hash"

[generation]
provider = "{}"
"#,
        root.join("data").join("kb.sqlite").display(),
        generation_provider
    );
    let config_path = root.join("config").join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_writes_config_once() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config").join("docqa.toml");

    let (stdout, stderr, success) = run_docqa(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Wrote"));
    let written = fs::read_to_string(&config_path).unwrap();
    assert!(written.contains("chunk_size = 1000"));
    assert!(written.contains("gemini-1.5-flash"));

    let (_, stderr, success) = run_docqa(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_ask_answers_from_manual_text() {
    let (_tmp, config) = setup_test_env("extractive");
    let (stdout, stderr, success) = run_docqa(
        &config,
        &[
            "ask",
            "What is the capital of France?",
            "--text",
            "doc1=Paris is the capital of France.",
            "--text",
            "doc2=Rust is a systems programming language.",
        ],
    );
    assert!(success, "ask failed: {}", stderr);
    let first_line = stdout.lines().next().unwrap_or_default();
    assert_eq!(first_line, "Paris is the capital of France.");
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("[1] doc1 (manual-text, passage 1)"));
}

#[test]
fn test_ask_json_without_documents() {
    let (_tmp, config) = setup_test_env("extractive");
    let (stdout, stderr, success) = run_docqa(
        &config,
        &["ask", "What is the capital of France?", "--json"],
    );
    assert!(success, "ask failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["outcome"], "no_documents");
    assert!(json["answer"]
        .as_str()
        .unwrap()
        .contains("No documents in knowledge base"));
    assert_eq!(json["cited_chunks"].as_array().unwrap().len(), 0);
}

#[test]
fn test_ask_blank_question_is_invalid() {
    let (_tmp, config) = setup_test_env("extractive");
    let (stdout, _, success) = run_docqa(
        &config,
        &["ask", "   ", "--json", "--text", "doc1=Some text."],
    );
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["outcome"], "invalid");
}

#[test]
fn test_ask_over_directory() {
    let (tmp, config) = setup_test_env("extractive");
    let dir = tmp.path().join("files");
    let (stdout, stderr, success) = run_docqa(
        &config,
        &[
            "ask",
            "Which language does Cargo build?",
            "--dir",
            dir.to_str().unwrap(),
            "--json",
        ],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stderr.contains("Ingested 2 file(s)"));

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["outcome"], "answered");
    let sources: Vec<&str> = json["cited_chunks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["source_name"].as_str().unwrap())
        .collect();
    assert_eq!(sources[0], "nested/rust.txt");
    assert!(!sources.contains(&"ignored.md"));
}

#[test]
fn test_ask_without_generator_reports_not_initialized() {
    let (_tmp, config) = setup_test_env("disabled");
    let (stdout, stderr, success) = run_docqa(
        &config,
        &["ask", "capital?", "--text", "doc1=Paris is the capital of France."],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("QA system not initialized"));
}

#[test]
fn test_ask_skips_unreadable_file() {
    let (tmp, config) = setup_test_env("extractive");
    let broken = tmp.path().join("files").join("broken.pdf");
    fs::write(&broken, b"this is not a pdf").unwrap();
    let good = tmp.path().join("files").join("france.txt");

    let (stdout, stderr, success) = run_docqa(
        &config,
        &[
            "ask",
            "What is the capital of France?",
            "--file",
            broken.to_str().unwrap(),
            "--file",
            good.to_str().unwrap(),
        ],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stderr.contains("Ingested 1 file(s)"));
    assert!(stderr.contains("skipped broken.pdf"));
    assert!(stdout.contains("france.txt"));
}

#[test]
fn test_ask_skips_missing_file() {
    let (tmp, config) = setup_test_env("extractive");
    let good = tmp.path().join("files").join("france.txt");
    let gone = tmp.path().join("files").join("gone.txt");

    let (stdout, stderr, success) = run_docqa(
        &config,
        &[
            "ask",
            "What is the capital of France?",
            "--file",
            good.to_str().unwrap(),
            "--file",
            gone.to_str().unwrap(),
        ],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stderr.contains("Ingested 1 file(s)"), "{}", stderr);
    assert!(stderr.contains("skipped gone.txt"), "{}", stderr);
    assert!(stdout.starts_with("Paris is the capital of France."), "{}", stdout);
}

#[test]
fn test_chat_session_commands() {
    let (tmp, config) = setup_test_env("extractive");
    let file = tmp.path().join("files").join("france.txt");

    let mut child = Command::new(docqa_binary())
        .arg("--config")
        .arg(&config)
        .args(["chat", "--file", file.to_str().unwrap()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b":stats\nWhat is the capital of France?\n:reset\n:stats\n:bogus\n:quit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("from 1 source(s)"));
    assert!(stdout.contains("Paris is the capital of France."));
    assert!(stdout.contains("Knowledge base cleared."));
    assert!(stdout.contains("0 chunk(s) from 0 source(s)"));
    assert!(stderr.contains("Unknown command :bogus"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("docqa.toml");
    fs::write(&config, "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n").unwrap();
    let (_, stderr, success) = run_docqa(&config, &["ask", "anything"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_docqa(&tmp.path().join("unused.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("docqa"));
}
