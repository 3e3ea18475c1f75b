// src/main.rs
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use dcmtree_lib::config::{
    app_config_dir, clear_last_opened_file, load_last_opened_file, save_last_opened_file, Settings,
};
use dcmtree_lib::dictionary::Dictionary;
use dcmtree_lib::file::open_record;
use dcmtree_lib::{search, ui, Browser, DisplayNode, SearchScheduler};

/// Terminal DICOM navigator
#[derive(Debug, Parser)]
#[command(name = "dcmtree", version, about)]
struct Cli {
    /// DICOM JSON file to open (defaults to the last opened file)
    file: Option<PathBuf>,

    /// Initial search query
    #[arg(short, long)]
    query: Option<String>,

    /// Print the tree to stdout instead of starting the interactive browser
    #[arg(long)]
    print: bool,

    /// With --print, emit the tree as JSON
    #[arg(long, requires = "print")]
    json: bool,

    /// Settings file (JSON)
    #[arg(long, env = "DCMTREE_CONFIG")]
    config: Option<PathBuf>,

    /// innolitics-style attributes.json used for attribute names
    #[arg(long)]
    dictionary: Option<PathBuf>,

    #[arg(long)]
    debounce_ms: Option<u64>,

    #[arg(long)]
    max_depth: Option<usize>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Forget the last opened file
    #[arg(long)]
    forget: bool,
}

fn init_logging(log_file: Option<&Path>, to_stderr: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("cannot create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn print_tree(out: &mut impl Write, root: &DisplayNode, color: bool) -> Result<()> {
    for (depth, node) in root.walk() {
        write!(out, "{}", "  ".repeat(depth))?;
        let mut at = 0;
        for span in node.label_highlights() {
            write!(out, "{}", &node.label[at..span.start])?;
            let hit = &node.label[span.clone()];
            if color {
                write!(out, "{}", hit.black().on_green().bold())?;
            } else {
                write!(out, "{hit}")?;
            }
            at = span.end;
        }
        writeln!(out, "{}", &node.label[at..])?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.print)?;

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(ms) = cli.debounce_ms {
        settings.debounce_ms = ms;
    }
    if let Some(depth) = cli.max_depth {
        settings.max_depth = depth;
    }
    if cli.dictionary.is_some() {
        settings.dictionary = cli.dictionary.clone();
    }

    let config_dir = match app_config_dir() {
        Ok(dir) => Some(dir),
        Err(e) => {
            warn!(error = %e, "last opened file will not be remembered");
            None
        }
    };
    if cli.forget {
        if let Some(dir) = &config_dir {
            clear_last_opened_file(dir)?;
        }
        if cli.file.is_none() {
            return Ok(());
        }
    }

    let path = match cli.file.clone() {
        Some(path) => path,
        None => {
            let dir = config_dir
                .as_deref()
                .context("no file given and no config directory to recall one from")?;
            load_last_opened_file(dir).context("no file given")?
        }
    };

    let dict = match &settings.dictionary {
        Some(p) => Dictionary::with_attributes_file(p)?,
        None => Dictionary::builtin(),
    };

    if cli.print {
        let record = open_record(&path, &dict, &settings.format_options())?;
        let query = cli.query.as_deref().unwrap_or("");
        let mut outcome = search(&record.root_label(), &record.elements, query, settings.limits());
        outcome.tree.root.set_expanded_recursive(true);

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if cli.json {
            serde_json::to_writer_pretty(&mut out, &outcome.tree.root)?;
            writeln!(out)?;
        } else {
            print_tree(&mut out, &outcome.tree.root, stdout.is_terminal())?;
        }
        if let Some(n) = outcome.match_count {
            writeln!(out, "{n} match(es)")?;
        }
        if let Some(t) = outcome.tree.truncation {
            writeln!(out, "warning: {t}")?;
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let (scheduler, ready) = SearchScheduler::new(runtime.handle().clone(), settings.debounce());
    let mut browser = Browser::open(
        &path,
        dict,
        settings.format_options(),
        settings.limits(),
        scheduler,
        ready,
    );
    if browser.load_error().is_none() {
        if let Some(dir) = &config_dir {
            let remembered = path.canonicalize().unwrap_or_else(|_| path.clone());
            save_last_opened_file(dir, &remembered)?;
        }
    }
    if let Some(q) = &cli.query {
        browser.search_now(q);
    }

    info!(file = %path.display(), "starting browser");
    ui::run(browser)
}
