//! # pyp CLI
//!
//! The `pyp` binary drives the past-paper archive from the terminal. Search
//! results are held in a session file between invocations, so `export` and
//! `marking-scheme` act on the most recent successful search.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pyp init` | Create the question-paper and marking-scheme directories |
//! | `pyp upload <file>` | Store a PDF under its canonical name |
//! | `pyp search` | Search one year's question papers for a topic |
//! | `pyp batch` | Search a 4-year window and compile one document |
//! | `pyp marking-scheme` | Show the marking schemes for the held results |
//! | `pyp export` | Save the held results as a Word document |
//! | `pyp list` | List archive entries, optionally filtered by glob |
//! | `pyp serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! pyp upload ~/Downloads/june23.pdf --year 2023 --session JUNE --paper 2 --variant 21 --kind qp
//! pyp search --topic network --year 2021 --paper 1 --variant 11
//! pyp marking-scheme
//! pyp batch --start 2019 --paper 1 --variant 11 --topic "expert system" --out bank.docx
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

use pyp_archive::config::{self, Config};
use pyp_archive::crossref::{cross_reference, CrossReference};
use pyp_archive::export::export_session;
use pyp_archive::extract::PdfPageExtractor;
use pyp_archive::models::{DocKind, ExamYear, Paper, Session};
use pyp_archive::naming::{ArchiveName, EntryKey};
use pyp_archive::search::{
    preview, BatchQuery, ReadFailure, SearchQuery, Searcher, BATCH_PREVIEW_CHARS,
    SEARCH_PREVIEW_CHARS,
};
use pyp_archive::server;
use pyp_archive::session::SessionState;
use pyp_archive::store::ArchiveStore;

/// Past-paper archive: upload, search, export and marking-scheme lookup.
#[derive(Parser)]
#[command(
    name = "pyp",
    about = "Store, search and repackage past-exam-paper PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply if it does not exist.
    #[arg(long, global = true, default_value = "./config/pyp.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the archive directories.
    Init,

    /// Store a PDF under its canonical name, replacing any existing copy.
    Upload {
        /// PDF file to store.
        file: PathBuf,
        #[arg(long)]
        year: ExamYear,
        /// MARCH, JUNE or NOVEMBER.
        #[arg(long)]
        session: Session,
        #[arg(long)]
        paper: Paper,
        /// Variant code; must belong to the chosen paper.
        #[arg(long)]
        variant: String,
        /// `qp` (question paper) or `ms` (marking scheme).
        #[arg(long, default_value = "qp")]
        kind: DocKind,
    },

    /// Search one year's question papers (all three sessions).
    Search {
        /// Topic keyword; omit to take every page.
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        year: ExamYear,
        #[arg(long)]
        paper: Paper,
        #[arg(long)]
        variant: String,
    },

    /// Search the 4-year window starting at `--start`.
    Batch {
        #[arg(long)]
        start: ExamYear,
        #[arg(long)]
        paper: Paper,
        #[arg(long)]
        variant: String,
        #[arg(long)]
        topic: Option<String>,
        /// Also write the compiled document here.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the marking schemes for the held results.
    MarkingScheme,

    /// Save the held results as a Word document.
    Export {
        /// Output path; defaults to the suggested file name in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List archive entries.
    List {
        /// Restrict to `qp` or `ms`.
        #[arg(long)]
        kind: Option<DocKind>,
        /// Glob over file names, e.g. `*_qp_11.pdf`.
        #[arg(long, default_value = "*.pdf")]
        pattern: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pyp_archive=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Init => {
            let (_, store) = open_archive(&cli.config)?;
            println!(
                "Archive directories ready: {} (question papers), {} (marking schemes)",
                store.dir(DocKind::QuestionPaper).display(),
                store.dir(DocKind::MarkingScheme).display()
            );
        }
        Commands::Upload {
            file,
            year,
            session,
            paper,
            variant,
            kind,
        } => {
            let (cfg, store) = open_archive(&cli.config)?;
            let key = EntryKey {
                session,
                year,
                variant: paper.require_variant(&variant).map_err(anyhow::Error::msg)?,
                kind,
            };
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = store.upload(&cfg.archive.subject_code, &key, &bytes)?;
            println!("Successfully saved as: {}", name);
        }
        Commands::Search {
            topic,
            year,
            paper,
            variant,
        } => {
            let query = SearchQuery {
                topic,
                year,
                variant: paper.require_variant(&variant).map_err(anyhow::Error::msg)?,
            };
            let (cfg, store) = open_archive(&cli.config)?;
            run_search(&cfg, &store, &query)?;
        }
        Commands::Batch {
            start,
            paper,
            variant,
            topic,
            out,
        } => {
            let variant = paper.require_variant(&variant).map_err(anyhow::Error::msg)?;
            let query = BatchQuery::new(topic, start, variant)?;
            let (cfg, store) = open_archive(&cli.config)?;
            run_batch(&cfg, &store, &query, out.as_deref())?;
        }
        Commands::MarkingScheme => {
            let (cfg, store) = open_archive(&cli.config)?;
            let state = SessionState::load(&cfg.session.path)?;
            show_marking_schemes(&state, &store);
        }
        Commands::Export { out } => {
            let (cfg, _) = open_archive(&cli.config)?;
            let state = SessionState::load(&cfg.session.path)?;
            match export_session(&state, &cfg.archive)? {
                None => println!("Nothing to export: run a search first."),
                Some(doc) => {
                    let path = out.unwrap_or_else(|| PathBuf::from(&doc.file_name));
                    write_output(&path, &doc.bytes)?;
                    println!(
                        "Exported {} result(s) to {}",
                        state.results().len(),
                        path.display()
                    );
                }
            }
        }
        Commands::List { kind, pattern } => {
            let (_, store) = open_archive(&cli.config)?;
            let kinds: Vec<DocKind> = match kind {
                Some(kind) => vec![kind],
                None => DocKind::ALL.to_vec(),
            };
            list_entries(&store, &kinds, &pattern)?;
        }
        Commands::Serve => {
            let cfg = config::load_or_default(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pyp", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Loads the configuration and makes sure both archive directories exist.
fn open_archive(config_path: &Path) -> Result<(Config, ArchiveStore)> {
    let cfg = config::load_or_default(config_path)?;
    let store = ArchiveStore::from_config(&cfg.archive);
    store.ensure_dirs()?;
    Ok((cfg, store))
}

fn run_search(cfg: &Config, store: &ArchiveStore, query: &SearchQuery) -> Result<()> {
    let searcher = Searcher::new(&cfg.archive.subject_code, store, &PdfPageExtractor);
    let report = searcher.search_year(query);
    report_failures(&report.failures);

    if report.is_empty() {
        println!(
            "No questions found for Variant {} in {}.",
            query.variant, query.year
        );
        return Ok(());
    }

    for result in &report.results {
        println!("{}\n", preview(&result.render(), SEARCH_PREVIEW_CHARS));
    }

    let mut state = SessionState::load(&cfg.session.path)?;
    if state.record_search(query, &report) {
        state.save(&cfg.session.path)?;
    }
    println!(
        "Held {} result(s). Use `pyp marking-scheme` or `pyp export`.",
        report.results.len()
    );
    Ok(())
}

fn run_batch(
    cfg: &Config,
    store: &ArchiveStore,
    query: &BatchQuery,
    out: Option<&Path>,
) -> Result<()> {
    let searcher = Searcher::new(&cfg.archive.subject_code, store, &PdfPageExtractor);
    let report = searcher.search_batch(query);
    report_failures(&report.failures);

    if report.is_empty() {
        println!(
            "No matching questions found in the {}-{} window.",
            query.start_year,
            query.end_year()
        );
        return Ok(());
    }

    println!(
        "Successfully compiled questions for {}-{}",
        query.start_year,
        query.end_year()
    );
    println!("{}", preview(&report.aggregate_text(), BATCH_PREVIEW_CHARS));

    let mut state = SessionState::load(&cfg.session.path)?;
    state.record_batch(&report);
    state.save(&cfg.session.path)?;

    match out {
        Some(path) => {
            if let Some(doc) = export_session(&state, &cfg.archive)? {
                write_output(path, &doc.bytes)?;
                println!("Saved {}", path.display());
            }
        }
        None => println!("Use `pyp export` to save as a Word document."),
    }
    Ok(())
}

fn show_marking_schemes(state: &SessionState, store: &ArchiveStore) {
    let outcome = cross_reference(state, store);
    match &outcome {
        CrossReference::NothingToShow => {
            println!("Nothing to show: run a search first.");
            return;
        }
        CrossReference::Unresolvable => {}
        CrossReference::Resolved { found, missing } => {
            for hit in found {
                println!(
                    "Displaying: {} ({})",
                    hit.marking_scheme,
                    hit.path.display()
                );
            }
            for name in missing {
                println!(
                    "Official Scheme {} is not in the '{}' folder yet.",
                    name,
                    store.dir(DocKind::MarkingScheme).display()
                );
            }
        }
    }
    if !outcome.any_found() {
        println!("No marking scheme files found matching your search.");
    }
}

fn list_entries(store: &ArchiveStore, kinds: &[DocKind], pattern: &str) -> Result<()> {
    println!("{:<24} {:<10} {:<6} {:<6} VARIANT", "FILE", "SESSION", "YEAR", "PAPER");
    for kind in kinds {
        for name in store.list_matching(*kind, pattern)? {
            match ArchiveName::parse(&name) {
                Some(parsed) => println!(
                    "{:<24} {:<10} {:<6} {:<6} {}",
                    name,
                    parsed.session,
                    format!("{:02}", parsed.year_short),
                    parsed.variant.paper(),
                    parsed.variant
                ),
                None => println!("{:<24} (not a canonical name)", name),
            }
        }
    }
    Ok(())
}

fn report_failures(failures: &[ReadFailure]) {
    for failure in failures {
        eprintln!(
            "Error reading PDF {}: {}",
            failure.source_file, failure.reason
        );
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}
