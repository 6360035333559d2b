//! Command-line interface for mediacat.
//!
//! Provides commands for syncing the catalog against the library tree,
//! rescanning, inspecting single files and browsing catalogued rows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;

use crate::config::{self, ResolvedConfig};
use crate::core::{MediaContext, RescanMode, SyncEngine, SyncOutcome};
use crate::domain::workflow::{input_files, models_and_loras, summarize_nodes};
use crate::domain::{FileId, FileRecord, ProgressSink};
use crate::ingest::{walk_folder, walk_library};
use crate::library::Catalog;
use crate::media::{analyze, extract_workflow};

/// mediacat - Media catalog with embedded workflow recovery
#[derive(Parser, Debug)]
#[command(name = "mediacat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the catalog with the library on disk
    Sync {
        /// Only sync the direct children of this folder
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Re-run the pipeline over catalogued files regardless of mtime
    Rescan {
        /// Which files to revisit
        #[arg(short, long, value_enum, default_value = "recent")]
        mode: RescanArg,

        /// Only rescan the direct children of this folder
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// Cutoff for `recent`, in minutes
        #[arg(long, default_value = "60")]
        older_than: i64,
    },

    /// Analyze one file without touching the catalog
    Inspect {
        /// File to inspect
        file: PathBuf,
    },

    /// Show the active nodes of a file's embedded workflow
    Summary {
        /// File to summarize
        file: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Ensure a catalogued file has a thumbnail and print its path
    Thumb {
        /// File ID (prefix accepted)
        id: String,
    },

    /// Show one catalogued file
    Show {
        /// File ID (prefix accepted)
        id: String,
    },

    /// List catalogued files, most recently modified first
    List {
        /// Maximum number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Record that a catalogued file was moved or renamed
    Relocate {
        /// Current catalogued path
        from: PathBuf,

        /// New path
        to: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Rescan mode for CLI (maps to RescanMode)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RescanArg {
    /// Every catalogued file
    All,

    /// Files not scanned within the cutoff
    Recent,

    /// Files missing from the catalog or missing a thumbnail
    Missing,
}

impl RescanArg {
    fn into_mode(self, older_than_minutes: i64) -> RescanMode {
        match self {
            RescanArg::All => RescanMode::All,
            RescanArg::Recent => RescanMode::Recent {
                older_than: chrono::Duration::minutes(older_than_minutes.max(0)),
            },
            RescanArg::Missing => RescanMode::Missing,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::load()?;

        match self.command {
            Commands::Sync { folder } => sync(&cfg, folder).await,
            Commands::Rescan {
                mode,
                folder,
                older_than,
            } => rescan(&cfg, mode.into_mode(older_than), folder).await,
            Commands::Inspect { file } => inspect(&cfg, &file).await,
            Commands::Summary { file, json } => summary(&cfg, &file, json).await,
            Commands::Thumb { id } => thumb(&cfg, &id).await,
            Commands::Show { id } => show(&cfg, &id),
            Commands::List { limit } => list(&cfg, limit),
            Commands::Relocate { from, to } => relocate(&cfg, &from, &to),
            Commands::Config => show_config(&cfg),
        }
    }
}

async fn open_engine(cfg: &ResolvedConfig) -> Result<SyncEngine> {
    let ctx = Arc::new(MediaContext::from_config(cfg).await);
    let catalog = open_catalog(cfg)?;
    Ok(SyncEngine::new(ctx, catalog, cfg.lock_path(), &cfg.sync))
}

fn open_catalog(cfg: &ResolvedConfig) -> Result<Catalog> {
    let path = cfg.catalog_path();
    Catalog::open(&path).with_context(|| format!("Failed to open catalog: {}", path.display()))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Path not found: {}", path.display()))
}

/// Print progress to stderr until the sink is dropped
fn spawn_progress_printer() -> (ProgressSink, JoinHandle<()>) {
    let (sink, mut rx) = ProgressSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if event.total > 0 {
                eprintln!("[{}/{}] {}", event.current, event.total, event.message);
            } else {
                eprintln!("{}", event.message);
            }
        }
    });
    (sink, printer)
}

fn print_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::AlreadyRunning => {
            eprintln!("A sync is already running for this catalog");
        }
        SyncOutcome::UpToDate(_) => {
            println!("Catalog is up to date");
        }
        SyncOutcome::Completed(report) => {
            println!(
                "Pass {}: {} added, {} updated, {} deleted, {} written, {} skipped, {} thumbnails",
                report.pass_id,
                report.added,
                report.updated,
                report.deleted,
                report.processed,
                report.skipped,
                report.thumbnails_rendered
            );
        }
    }
}

/// Sync the whole library or one folder
async fn sync(cfg: &ResolvedConfig, folder: Option<PathBuf>) -> Result<()> {
    let mut engine = open_engine(cfg).await?;
    let (sink, printer) = spawn_progress_printer();

    let outcome = match folder {
        Some(folder) => {
            let folder = absolute(&folder)?;
            let on_disk = walk_folder(&folder);
            engine.sync_folder(&folder, on_disk, &sink).await?
        }
        None => {
            let root = absolute(&cfg.library)?;
            let on_disk = walk_library(&root, Some(&cfg.home));
            engine.sync(on_disk, &sink).await?
        }
    };

    drop(sink);
    let _ = printer.await;
    print_outcome(&outcome);
    Ok(())
}

async fn rescan(cfg: &ResolvedConfig, mode: RescanMode, folder: Option<PathBuf>) -> Result<()> {
    let mut engine = open_engine(cfg).await?;
    let (sink, printer) = spawn_progress_printer();

    let folder = folder.as_deref().map(absolute).transpose()?;
    let on_disk = match (&folder, mode) {
        (Some(dir), RescanMode::Missing) => walk_folder(dir),
        (None, RescanMode::Missing) => walk_library(&absolute(&cfg.library)?, Some(&cfg.home)),
        _ => Default::default(),
    };

    let outcome = engine
        .rescan(mode, folder.as_deref(), &on_disk, &sink)
        .await?;

    drop(sink);
    let _ = printer.await;
    print_outcome(&outcome);
    Ok(())
}

/// Analyze and extract a single file
async fn inspect(cfg: &ResolvedConfig, file: &Path) -> Result<()> {
    let path = absolute(file)?;
    let ctx = MediaContext::from_config(cfg).await;
    let probe = ctx.probe.as_ref();

    let info = analyze(&path, &ctx.media, probe).await;
    let workflow = extract_workflow(&path, info.kind, info.container.as_ref()).await;

    println!("File:        {}", path.display());
    println!("ID:          {}", FileId::from_path(&path));
    println!("Kind:        {}", info.kind);
    println!("Dimensions:  {}", or_dash(&info.dimensions));
    println!("Duration:    {}", or_dash(&info.duration));
    println!(
        "Captured:    {}",
        info.media_created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );

    match workflow {
        Some(found) => {
            let (models, loras) = models_and_loras(&found.document);
            println!("Workflow:    {} ({:?})", found.format(), found.source);
            println!("Models:      {}", join_or_dash(&models));
            println!("LoRAs:       {}", join_or_dash(&loras));
            println!("Inputs:      {}", join_or_dash(&input_files(&found.document)));
        }
        None => println!("Workflow:    -"),
    }

    Ok(())
}

/// Print the node summary of a file's workflow
async fn summary(cfg: &ResolvedConfig, file: &Path, json: bool) -> Result<()> {
    let path = absolute(file)?;
    let ctx = MediaContext::from_config(cfg).await;
    let info = analyze(&path, &ctx.media, ctx.probe.as_ref()).await;

    let found = extract_workflow(&path, info.kind, info.container.as_ref())
        .await
        .ok_or_else(|| anyhow::anyhow!("No workflow found in {}", path.display()))?;

    let nodes = summarize_nodes(&found.document, ctx.input_root.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }

    println!("{:<8} {:<12} {:<32} {:<8}", "ID", "CATEGORY", "TYPE", "COLOR");
    println!("{}", "-".repeat(64));
    for node in &nodes {
        println!(
            "{:<8} {:<12} {:<32} {:<8}",
            node.id,
            format!("{:?}", node.category).to_lowercase(),
            node.node_type,
            node.color
        );
        for param in &node.params {
            let value = match &param.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let marker = if param.is_input_file { " (input file)" } else { "" };
            println!("         {} = {}{}", param.name, value, marker);
        }
    }

    Ok(())
}

/// Find a row by exact ID or unique prefix
fn find_record(catalog: &Catalog, id: &str) -> Result<FileRecord> {
    if let Some(record) = catalog.get(&FileId::from_raw(id))? {
        return Ok(record);
    }

    let mut matches: Vec<FileRecord> = catalog
        .list(None)?
        .into_iter()
        .filter(|r| r.id.as_str().starts_with(id))
        .collect();

    match matches.len() {
        0 => anyhow::bail!("File not found: {}", id),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!("ID prefix {} is ambiguous ({} matches)", id, n),
    }
}

async fn thumb(cfg: &ResolvedConfig, id: &str) -> Result<()> {
    let record = find_record(&open_catalog(cfg)?, id)?;
    let ctx = MediaContext::from_config(cfg).await;

    match ctx.thumbnails.ensure(&record, ctx.probe.as_ref()).await {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => anyhow::bail!("No thumbnail could be produced for {}", record.path.display()),
    }
}

fn show(cfg: &ResolvedConfig, id: &str) -> Result<()> {
    let catalog = open_catalog(cfg)?;
    let record = find_record(&catalog, id)?;

    println!("  ID:          {}", record.id);
    println!("  Path:        {}", record.path.display());
    println!("  Kind:        {}", record.kind);
    println!("  Size:        {} bytes", record.size);
    println!("  Dimensions:  {}", or_dash(&record.dimensions));
    println!("  Duration:    {}", or_dash(&record.duration));
    println!("  Workflow:    {}", if record.has_workflow { "yes" } else { "no" });
    println!("  Models:      {}", join_or_dash(&record.models));
    println!("  LoRAs:       {}", join_or_dash(&record.loras));
    println!("  Inputs:      {}", join_or_dash(&record.input_files));
    if let Some(created) = record.media_created_at {
        println!("  Captured:    {}", created.to_rfc3339());
    }
    println!("  Scanned:     {}", record.last_scanned.to_rfc3339());

    let history = catalog.move_history(&record.id)?;
    if !history.is_empty() {
        println!("  Moves:");
        for entry in history {
            println!(
                "    {} {} -> {}",
                entry.moved_at.to_rfc3339(),
                entry.from_path.display(),
                entry.to_path.display()
            );
        }
    }

    Ok(())
}

fn list(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let catalog = open_catalog(cfg)?;

    if catalog.is_empty()? {
        println!("Catalog is empty. Use 'mediacat sync' to add files.");
        return Ok(());
    }

    println!("{:<34} {:<15} {:<4} {:<40}", "ID", "KIND", "WF", "NAME");
    println!("{}", "-".repeat(95));

    for record in catalog.list(Some(limit))? {
        let name = if record.name.chars().count() > 40 {
            let short: String = record.name.chars().take(37).collect();
            format!("{}...", short)
        } else {
            record.name.clone()
        };
        println!(
            "{:<34} {:<15} {:<4} {:<40}",
            record.id.as_str(),
            record.kind.as_str(),
            if record.has_workflow { "yes" } else { "" },
            name
        );
    }

    println!("\nTotal: {} files", catalog.count()?);

    Ok(())
}

fn relocate(cfg: &ResolvedConfig, from: &Path, to: &Path) -> Result<()> {
    let mut catalog = open_catalog(cfg)?;
    let to = absolute(to)?;
    let record = catalog.relocate(from, &to)?;
    println!("{} -> {} ({})", from.display(), to.display(), record.id);
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("mediacat configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (state):   {}", cfg.home.display());
    println!("  Library:        {}", cfg.library.display());
    println!(
        "  Input root:     {}",
        cfg.input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Catalog:        {}", cfg.catalog_path().display());
    println!("  Thumbnails:     {}", cfg.thumbnail_dir().display());
    println!();
    println!("Tools:");
    println!("  ffprobe:        {}", cfg.tools.ffprobe.display());
    println!("  ffmpeg:         {}", cfg.tools.ffmpeg.display());
    println!("  Timeout:        {}s", cfg.tools.timeout_seconds);
    println!();
    println!("Sync:");
    println!("  Workers:        {}", cfg.sync.workers);
    println!("  Batch size:     {}", cfg.sync.batch_size);
    println!();
    println!("Thumbnails:");
    println!("  Width:          {}", cfg.thumbnails.width);
    println!("  Format:         {}", cfg.thumbnails.format.extension());
    println!("  Quality:        {}", cfg.thumbnails.quality);
    println!("  WebP frame rate: {}", cfg.webp_fps);

    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}
