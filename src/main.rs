//! # Policy QA CLI (`pqa`)
//!
//! Ingest policy documents into the local index and ask questions about
//! them, one-shot or in an interactive chat.
//!
//! ## Usage
//!
//! ```bash
//! pqa --config ./config/pqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pqa ingest <paths…>` | Index files, or every pdf/txt/md under a directory |
//! | `pqa ask "<question>"` | Answer a single question |
//! | `pqa chat` | Interactive session with follow-up memory |
//! | `pqa stats` | Show index size |
//! | `pqa reset` | Delete the persisted index |
//!
//! `ingest`, `ask` and `chat` need the API credential (by default the
//! `OPENAI_API_KEY` environment variable); `stats` and `reset` do not.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use policy_qa::config;
use policy_qa::index::sqlite::SqliteStorage;
use policy_qa::index::IndexStorage;
use policy_qa::models::{format_sources, Answer, Document, DocumentFormat, Role};
use policy_qa::session::{IngestReport, Session};
use policy_qa::QaError;

/// Policy QA: conversational question answering over insurance policies.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pqa",
    about = "Policy QA: ask questions about your insurance policy documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/pqa.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add documents to the index.
    ///
    /// Accepts files and directories. Directories are walked recursively for
    /// `.pdf`, `.txt` and `.md` files. A file that cannot be read or parsed is
    /// reported and skipped; the rest are indexed together.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question and print the answer with its sources.
    Ask { question: String },

    /// Start an interactive chat.
    ///
    /// Type `/history` to show the conversation, `/stats` for index size,
    /// `/reset` to clear the index and memory, `/quit` to leave.
    Chat,

    /// Print the number of indexed chunks.
    Stats,

    /// Delete the persisted index.
    Reset,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,policy_qa=debug,pqa=debug"
    } else {
        "warn,policy_qa=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Stats => {
            let storage = SqliteStorage::new(&cfg.index.dir);
            let (chunks, sources) = match storage.open().await? {
                Some(index) => {
                    let stats = index.stats().await?;
                    index.close().await;
                    (stats.total_chunks, stats.total_sources)
                }
                None => (0, 0),
            };
            println!("Total chunks: {}", chunks);
            println!("Total documents: {}", sources);
        }
        Commands::Reset => {
            SqliteStorage::new(&cfg.index.dir).destroy().await?;
            println!("Index cleared.");
        }
        Commands::Ingest { paths } => {
            let mut session = Session::from_config(cfg).await?;
            let result = run_ingest(&mut session, &paths).await;
            session.close().await;
            result?;
        }
        Commands::Ask { question } => {
            let mut session = Session::from_config(cfg).await?;
            let result = session.ask(&question).await;
            session.close().await;
            print_answer(&result?);
        }
        Commands::Chat => {
            let mut session = Session::from_config(cfg).await?;
            let result = run_chat(&mut session).await;
            session.close().await;
            result?;
        }
    }

    Ok(())
}

async fn run_ingest(session: &mut Session, paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut documents = Vec::new();

    for path in collect_files(paths)? {
        match read_document(&path) {
            Ok(doc) => documents.push(doc),
            Err(e) => println!("  ✗ {}: {}", path.display(), e),
        }
    }

    if documents.is_empty() {
        bail!("no documents to ingest");
    }

    let report = session.ingest(documents).await?;
    print_report(&report);

    if let Some(e) = &report.batch_error {
        bail!("indexing failed, index unchanged: {}", e);
    }
    if report.failed_files().count() == report.files.len() {
        bail!("no documents could be ingested");
    }
    Ok(())
}

/// Expand directories into the supported files beneath them, sorted for a
/// stable ingestion order. Explicit file arguments are kept as given.
fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| DocumentFormat::from_filename(n).is_ok())
                        .unwrap_or(false)
                })
                .collect();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            bail!("path does not exist: {}", path.display());
        }
    }

    Ok(files)
}

fn read_document(path: &Path) -> policy_qa::Result<Document> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let format = DocumentFormat::from_filename(&name)?;
    let bytes = std::fs::read(path).map_err(|e| QaError::DocumentLoad {
        name: name.clone(),
        reason: e.to_string(),
    })?;
    Ok(Document::new(name, bytes, format))
}

fn print_report(report: &IngestReport) {
    for file in &report.files {
        match &file.result {
            Ok(chunks) => println!("  ✓ {} ({} chunks)", file.name, chunks),
            Err(e) => println!("  ✗ {}: {}", file.name, e),
        }
    }
    if report.duplicates_skipped > 0 {
        println!("Skipped {} duplicate chunks.", report.duplicates_skipped);
    }
    match &report.stats_error {
        None => println!(
            "Added {} chunks. Total chunks: {}",
            report.chunks_added, report.stats.total_chunks
        ),
        Some(e) => println!(
            "Added {} chunks. Total chunks unavailable: {}",
            report.chunks_added, e
        ),
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!("\nSources: {}", format_sources(&answer.sources));
    }
}

async fn run_chat(session: &mut Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask about your policies. /history, /stats, /reset, /quit");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/history" => print_history(session),
            "/stats" => match session.stats().await {
                Ok(stats) => println!(
                    "Total chunks: {} ({} documents)",
                    stats.total_chunks, stats.total_sources
                ),
                Err(e) => eprintln!("Error: {}", e),
            },
            "/reset" => match session.reset().await {
                Ok(()) => println!("Index and conversation cleared."),
                Err(e) => eprintln!("Error: {}", e),
            },
            question => match session.ask(question).await {
                Ok(answer) => {
                    print_answer(&answer);
                    println!();
                }
                Err(e) => eprintln!("Error: {}", e),
            },
        }
    }

    Ok(())
}

fn print_history(session: &Session) {
    let messages = session.history();
    if messages.is_empty() {
        println!("(no conversation yet)");
        return;
    }
    for message in messages {
        let who = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => continue,
        };
        println!("{}: {}", who, message.content);
    }
}
