//! Integration tests for document formats and the on-disk knowledge base.
//!
//! Covers DOCX ingest and question answering, skipping of unreadable or
//! oversized uploads alongside good ones, and resuming a persisted index.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docqa"))
}

/// Minimal docx (ZIP) whose `word/document.xml` holds one paragraph per entry.
fn minimal_docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn setup_file_support_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[knowledge_base]
path = '{}'
{}

[chunking]
chunk_size = 300
chunk_overlap = 50

[embedding]
provider = "hash"

[generation]
provider = "extractive"

[ingest]
max_file_bytes = 4096
"#,
        root.join("data").join("kb.sqlite").display(),
        extra
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
        .unwrap_or_else(|e| panic!("Failed to run docqa: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ask_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["ask"];
    full.extend_from_slice(args);
    full.push("--json");
    let (stdout, stderr, success) = run_docqa(config_path, &full);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad json {}: {}", e, stdout))
}

#[test]
fn file_support_docx_ingest_and_answer() {
    let (tmp, config_path) = setup_file_support_env("");
    let docx = tmp.path().join("files").join("handbook.docx");
    fs::write(
        &docx,
        minimal_docx_with_paragraphs(&[
            "The notice period is thirty days.",
            "Holidays accrue monthly.",
        ]),
    )
    .unwrap();

    let json = ask_json(
        &config_path,
        &["How long is the notice period?", "--file", docx.to_str().unwrap()],
    );
    assert_eq!(json["outcome"], "answered");
    let answer = json["answer"].as_str().unwrap();
    assert!(answer.contains("The notice period is thirty days."), "{}", answer);
    assert!(answer.contains("Holidays accrue monthly."), "{}", answer);
    assert_eq!(json["cited_chunks"][0]["source_name"], "handbook.docx");
    assert_eq!(json["cited_chunks"][0]["file_type"], "docx");
}

#[test]
fn file_support_upper_case_extension() {
    let (tmp, config_path) = setup_file_support_env("");
    let path = tmp.path().join("files").join("NOTES.TXT");
    fs::write(&path, "The office opens at nine.").unwrap();

    let json = ask_json(
        &config_path,
        &["When does the office open?", "--file", path.to_str().unwrap()],
    );
    assert_eq!(json["outcome"], "answered");
    assert_eq!(json["cited_chunks"][0]["file_type"], "txt");
}

#[test]
fn file_support_skipped_on_failure() {
    let (tmp, config_path) = setup_file_support_env("");
    let files_dir = tmp.path().join("files");
    fs::write(files_dir.join("bad.pdf"), b"not a valid pdf").unwrap();
    fs::write(files_dir.join("bad.docx"), b"not a zip archive").unwrap();
    fs::write(files_dir.join("empty.txt"), "   \n").unwrap();
    fs::write(files_dir.join("good.txt"), "This is good.").unwrap();

    let (_, stderr, success) = run_docqa(
        &config_path,
        &["ask", "Is it good?", "--dir", files_dir.to_str().unwrap()],
    );
    assert!(success, "ask must succeed: {}", stderr);
    assert!(stderr.contains("Ingested 1 file(s)"), "{}", stderr);
    assert!(stderr.contains("skipped bad.pdf"), "{}", stderr);
    assert!(stderr.contains("skipped bad.docx"), "{}", stderr);
    assert!(stderr.contains("skipped empty.txt"), "{}", stderr);
}

#[test]
fn file_support_max_size_skipped() {
    let (tmp, config_path) = setup_file_support_env("");
    let files_dir = tmp.path().join("files");
    fs::write(files_dir.join("big.txt"), "word ".repeat(2000)).unwrap();
    fs::write(files_dir.join("small.txt"), "Small but fine.").unwrap();

    let (_, stderr, success) = run_docqa(
        &config_path,
        &["ask", "fine?", "--dir", files_dir.to_str().unwrap()],
    );
    assert!(success, "ask must succeed");
    assert!(stderr.contains("Ingested 1 file(s)"), "{}", stderr);
    assert!(stderr.contains("limit is 4096"), "big.txt should be skipped: {}", stderr);
}

#[test]
fn file_support_resume_persisted_knowledge_base() {
    let (tmp, config_path) = setup_file_support_env("fresh_start = false");
    let path = tmp.path().join("files").join("france.txt");
    fs::write(&path, "Paris is the capital of France.").unwrap();

    let first = ask_json(
        &config_path,
        &["What is the capital of France?", "--file", path.to_str().unwrap()],
    );
    assert_eq!(first["outcome"], "answered");

    // No sources this time: the answer must come from the stored index.
    let second = ask_json(&config_path, &["What is the capital of France?"]);
    assert_eq!(second["outcome"], "answered");
    assert_eq!(second["cited_chunks"][0]["source_name"], "france.txt");
}

#[test]
fn file_support_fresh_start_discards_previous_run() {
    let (tmp, config_path) = setup_file_support_env("fresh_start = true");
    let path = tmp.path().join("files").join("france.txt");
    fs::write(&path, "Paris is the capital of France.").unwrap();

    ask_json(
        &config_path,
        &["What is the capital of France?", "--file", path.to_str().unwrap()],
    );
    let second = ask_json(&config_path, &["What is the capital of France?"]);
    assert_eq!(second["outcome"], "no_documents");
}
