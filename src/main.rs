//! # docqa CLI
//!
//! Ask questions about your documents from the terminal, in an interactive
//! chat, or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Write a commented default configuration file |
//! | `docqa ask "<question>"` | Ingest the given files, answer one question |
//! | `docqa chat` | Interactive question loop over a knowledge base |
//! | `docqa serve` | Start the JSON HTTP API |
//! | `docqa completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! docqa init
//! export GOOGLE_API_KEY=...
//! docqa ask "What is the notice period?" --file contract.pdf --file handbook.docx
//! docqa chat --dir ./docs
//! docqa serve --dir ./docs
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `docqa=info,docqa_core=info`).

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docqa::config::{self, Config};
use docqa::files::Uploads;
use docqa::server;
use docqa::session::{build_session, Session};
use docqa_core::index::ClearOutcome;
use docqa_core::models::{IngestReport, QueryResult, EXCERPT_CHARS};

/// docqa: a document question-answering assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: ask questions about your PDF, DOCX and text documents",
    version,
    long_about = "docqa splits your documents into overlapping passages, embeds and indexes them, \
    and answers questions by retrieving the most relevant passages and handing them to a \
    language model. Every answer lists the passages it was based on."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. If the file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Documents to load before doing anything else.
#[derive(clap::Args, Debug, Default)]
struct Sources {
    /// A PDF, DOCX or TXT file to ingest. Repeatable.
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// A directory to ingest, filtered by `[ingest].include_globs`.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Text to ingest directly, as `NAME=TEXT`. Repeatable.
    #[arg(long = "text", value_parser = parse_key_val)]
    texts: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default configuration file.
    ///
    /// Refuses to overwrite an existing file.
    Init,

    /// Answer a single question.
    ///
    /// Ingests the given sources, asks the question, and prints the answer
    /// followed by the passages it was based on.
    Ask {
        /// The question to answer.
        question: String,

        #[command(flatten)]
        sources: Sources,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive question loop.
    ///
    /// Each line is a question. Lines starting with `:` are commands:
    /// `:add <path>`, `:stats`, `:docs`, `:reset`, `:help`, `:quit`.
    Chat {
        #[command(flatten)]
        sources: Sources,
    },

    /// Start the JSON HTTP API.
    Serve {
        #[command(flatten)]
        sources: Sources,

        /// Address to bind, overriding `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Parse a `NAME=TEXT` pair for `--text` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid NAME=TEXT: no '=' found in '{}'", s))?;
    let name = s[..pos].trim();
    if name.is_empty() {
        return Err(format!("invalid NAME=TEXT: empty name in '{}'", s));
    }
    Ok((name.to_string(), s[pos + 1..].to_string()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docqa=info,docqa_core=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    match &cli.command {
        Commands::Init => {
            config::write_default_config(&cli.config)?;
            println!("Wrote {}", cli.config.display());
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "docqa", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let cfg = load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            sources,
            json,
        } => {
            let session = build_session(&cfg).await?;
            load_sources(&session, &cfg, &sources).await?;
            let result = session.query(&question).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Chat { sources } => {
            let session = build_session(&cfg).await?;
            load_sources(&session, &cfg, &sources).await?;
            run_chat(&session, &cfg).await?;
        }
        Commands::Serve { sources, bind } => {
            let session = Arc::new(build_session(&cfg).await?);
            load_sources(&session, &cfg, &sources).await?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            server::run_server(session, &bind).await?;
        }
        Commands::Init | Commands::Completions { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}

async fn load_sources(session: &Session, cfg: &Config, sources: &Sources) -> Result<()> {
    let mut uploads = Uploads::default();
    for path in &sources.files {
        uploads.add_file(path);
    }
    if let Some(dir) = &sources.dir {
        uploads.add_dir(dir, &cfg.ingest.include_globs)?;
    }
    if !uploads.files.is_empty() || !uploads.unreadable.is_empty() {
        print_report(&ingest_uploads(session, uploads).await);
    }
    for (name, text) in &sources.texts {
        if !session.ingest_text(text, name).await {
            eprintln!("Skipped text '{}': nothing to index", name);
        }
    }
    Ok(())
}

/// Ingest what could be read; paths that could not are reported as skipped.
async fn ingest_uploads(session: &Session, uploads: Uploads) -> IngestReport {
    let mut report = session.ingest_new(&uploads.files).await;
    report.skipped.extend(uploads.unreadable);
    report
}

fn print_report(report: &IngestReport) {
    eprintln!(
        "Ingested {} file(s), {} chunk(s).",
        report.ingested, report.chunks_added
    );
    for skipped in &report.skipped {
        eprintln!("  skipped {}: {}", skipped.name, skipped.reason);
    }
    for name in &report.already_ingested {
        eprintln!("  already ingested: {}", name);
    }
}

fn print_result(result: &QueryResult) {
    println!("{}", result.answer);
    if result.cited_chunks.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, chunk) in result.cited_chunks.iter().enumerate() {
        println!(
            "  [{}] {} ({}, passage {})",
            i + 1,
            chunk.source_name,
            chunk.file_type,
            chunk.sequence_index + 1
        );
        println!("      {}", chunk.excerpt(EXCERPT_CHARS).replace('\n', " "));
    }
}

const CHAT_HELP: &str = "Type a question, or one of:
  :add <path>   ingest a file or directory
  :stats        chunk and source counts
  :docs         documents ingested this session
  :reset        empty the knowledge base
  :quit         leave";

async fn run_chat(session: &Session, cfg: &Config) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("{}", CHAT_HELP);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        if interactive {
            stdout.write_all(b"\n> ").await?;
            stdout.flush().await?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            (":quit" | ":q" | ":exit", _) => break,
            (":help", _) => println!("{}", CHAT_HELP),
            (":stats", _) => {
                let stats = session.stats().await;
                println!(
                    "{} chunk(s) from {} source(s)",
                    stats.total_chunks,
                    stats.distinct_sources.len()
                );
                for source in &stats.distinct_sources {
                    println!("  {}", source);
                }
            }
            (":docs", _) => {
                for doc in session.documents().await {
                    println!(
                        "  {} ({}, {} chunk(s), {})",
                        doc.source_name,
                        doc.file_type,
                        doc.chunk_count,
                        doc.ingested_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            (":reset", _) => match session.reset().await {
                Ok(ClearOutcome::Cleared) => println!("Knowledge base cleared."),
                Ok(ClearOutcome::Rebuilt { location, .. }) => {
                    println!("Knowledge base rebuilt empty at {}.", location)
                }
                Err(e) => eprintln!("Reset failed: {}", e),
            },
            (":add", path) => {
                if let Err(e) = add_path(session, cfg, Path::new(path.trim())).await {
                    eprintln!("{:#}", e);
                }
            }
            (cmd, _) if cmd.starts_with(':') => {
                eprintln!("Unknown command {}; try :help", cmd);
            }
            _ => print_result(&session.query(line).await),
        }
    }
    Ok(())
}

async fn add_path(session: &Session, cfg: &Config, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("usage: :add <path>");
    }
    let mut uploads = Uploads::default();
    if path.is_dir() {
        uploads
            .add_dir(path, &cfg.ingest.include_globs)
            .with_context(|| format!("Cannot add {}", path.display()))?;
    } else {
        uploads.add_file(path);
    }
    print_report(&ingest_uploads(session, uploads).await);
    Ok(())
}
