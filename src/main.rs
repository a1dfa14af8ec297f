//! Scanbase CLI - Scan Data Management

use clap::{Parser, Subcommand};
use scanbase::{Error, ImportMilestone, ImportOptions, Project};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scanbase")]
#[command(about = "A file-backed scan data manager for imaging projects", long_about = None)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new scanbase project
    Init {
        /// Project name (defaults to the directory name)
        name: Option<String>,
    },

    /// Import scans described by an export log
    Import {
        /// Path to the export log JSON
        log: PathBuf,
    },

    /// Register scan files already placed under data/raw_data; with no
    /// keys, registers every unregistered .nii file found there
    Add {
        /// Project-relative scan keys (e.g. data/raw_data/scan.nii)
        keys: Vec<String>,
    },

    /// Remove scans from both collections
    Remove {
        /// Project-relative scan keys
        keys: Vec<String>,
    },

    /// Rapid search across the visible tags of the current collection
    Search {
        /// Text to look for ("*Not Defined*" matches empty cells)
        text: String,
    },

    /// Start an interactive session (undo/redo live here)
    Repl,

    /// Verify stored checksums against the scan files on disk
    Verify,

    /// List the visible tags
    Tags,

    /// Show project status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        if let Some(hint) = err.downcast_ref::<Error>().and_then(Error::suggestion) {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { name } => init_project(&cli.project, name).await,
        Commands::Import { log } => import_log(&cli.project, &log).await,
        Commands::Add { keys } => add_scans(&cli.project, keys).await,
        Commands::Remove { keys } => remove_scans(&cli.project, keys).await,
        Commands::Search { text } => search(&cli.project, &text).await,
        Commands::Repl => run_repl(&cli.project).await,
        Commands::Verify => verify(&cli.project).await,
        Commands::Tags => list_tags(&cli.project).await,
        Commands::Status => show_status(&cli.project).await,
    }
}

async fn init_project(path: &Path, name: Option<String>) -> anyhow::Result<()> {
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    });

    println!("Initializing project '{}' at {:?}...", name, path);
    Project::create(path, &name).await?;

    println!("Project initialized successfully!");
    println!();
    println!("Directory structure:");
    println!("  properties/          - Project properties");
    println!("  database/schemas/    - Collection schemas (YAML)");
    println!("  database/documents/  - Collection rows (JSON)");
    println!("  filters/             - Saved filters");
    println!("  data/raw_data/       - Scan files");
    println!();
    println!("Get started:");
    println!("  scanbase import <export_log.json>");
    println!("  scanbase search T1");

    Ok(())
}

async fn import_log(path: &Path, log: &Path) -> anyhow::Result<()> {
    let mut project = Project::open(path).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(milestone) = rx.recv().await {
            match milestone {
                ImportMilestone::FieldsRegistered => println!("  fields registered"),
                ImportMilestone::DocumentsAdded => println!("  documents added"),
                ImportMilestone::ValuesFlushed => println!("  values flushed"),
            }
        }
    });

    println!("Importing {:?}...", log);
    let options = ImportOptions {
        progress: Some(tx),
        cancel: None,
    };
    let report = project.import_export_log(log, options).await?;
    printer.await?;
    project.save().await?;

    println!(
        "Imported {} scan(s), {} new tag(s).",
        report.added_keys.len(),
        report.fields_registered.len()
    );
    if !report.skipped.is_empty() {
        println!("Skipped (export not ok):");
        for name in &report.skipped {
            println!("  - {}", name);
        }
    }
    Ok(())
}

async fn add_scans(path: &Path, keys: Vec<String>) -> anyhow::Result<()> {
    let mut project = Project::open(path).await?;
    let keys = if keys.is_empty() {
        project.unregistered_scans()?
    } else {
        keys
    };
    if keys.is_empty() {
        println!("Nothing to add.");
        return Ok(());
    }
    let added = project.add_scans(&keys).await?;
    project.save().await?;
    println!("Added {} scan(s).", added.len());
    Ok(())
}

async fn remove_scans(path: &Path, keys: Vec<String>) -> anyhow::Result<()> {
    let mut project = Project::open(path).await?;
    project.remove_scans(&keys)?;
    project.save().await?;
    println!("Removed {} scan(s).", keys.len());
    Ok(())
}

async fn search(path: &Path, text: &str) -> anyhow::Result<()> {
    let project = Project::open(path).await?;
    let keys = project.search_rapid(text)?;

    if keys.is_empty() {
        println!("No scans match.");
    } else {
        for key in &keys {
            println!("{}", key);
        }
        println!("({} scan(s))", keys.len());
    }
    Ok(())
}

async fn run_repl(path: &Path) -> anyhow::Result<()> {
    use std::io::{self, BufRead, Write};

    println!("Scanbase Interactive Shell");
    println!("Type 'help' for commands, 'exit' to quit.");
    println!();

    let mut project = Project::open(path).await?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("scanbase> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command.to_lowercase().as_str() {
            "exit" | "quit" | "\\q" => break,
            "help" | "\\h" => {
                println!("Commands:");
                println!("  search <text>      - Rapid search across visible tags");
                println!("  add <keys...>      - Register scans under data/raw_data");
                println!("  remove <keys...>   - Remove scans from both collections");
                println!("  tags               - List visible tags");
                println!("  verify             - Check stored checksums");
                println!("  undo, redo         - Walk the operation log");
                println!("  save               - Write the project to disk");
                println!();
                println!("Special:");
                println!("  help, \\h  - Show this help");
                println!("  exit, \\q  - Exit (unsaved changes are dropped)");
                continue;
            }
            _ => {}
        }

        let result = repl_command(&mut project, command, rest).await;
        if let Err(err) = result {
            println!("Error: {}", err);
            if let Some(hint) = err.suggestion() {
                println!("Hint: {}", hint);
            }
        }
        println!();
    }

    if project.has_unsaved_changes() {
        println!("Unsaved changes dropped.");
    }
    println!("Goodbye!");
    Ok(())
}

async fn repl_command(project: &mut Project, command: &str, rest: &str) -> scanbase::Result<()> {
    match command.to_lowercase().as_str() {
        "search" => {
            let keys = project.search_rapid(rest)?;
            if keys.is_empty() {
                println!("(0 scans)");
            } else {
                for key in &keys {
                    println!("{}", key);
                }
                println!("({} scan(s))", keys.len());
            }
        }
        "add" => {
            let keys: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            let added = project.add_scans(&keys).await?;
            println!("Added {} scan(s).", added.len());
        }
        "remove" => {
            let keys: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            project.remove_scans(&keys)?;
            println!("Removed {} scan(s).", keys.len());
        }
        "tags" => {
            for tag in project.visible_tags()? {
                println!("  {}", tag);
            }
        }
        "verify" => {
            let flagged = project.verify_scans().await?;
            if flagged.is_empty() {
                println!("All checksums match.");
            } else {
                for key in &flagged {
                    println!("  ! {}", key);
                }
            }
        }
        "undo" => {
            let kind = project.undo()?;
            println!("Undid {}.", kind);
        }
        "redo" => {
            let kind = project.redo()?;
            println!("Redid {}.", kind);
        }
        "save" => {
            project.save().await?;
            println!("Saved.");
        }
        other => {
            println!("Unknown command '{}'. Type 'help'.", other);
        }
    }
    Ok(())
}

async fn verify(path: &Path) -> anyhow::Result<()> {
    let project = Project::open(path).await?;
    let flagged = project.verify_scans().await?;

    if flagged.is_empty() {
        println!("All scan files match their stored checksums.");
    } else {
        println!("Checksum mismatches or missing files:");
        for key in &flagged {
            println!("  - {}", key);
        }
    }
    Ok(())
}

async fn list_tags(path: &Path) -> anyhow::Result<()> {
    let project = Project::open(path).await?;

    println!("Visible tags:");
    for tag in project.visible_tags()? {
        println!("  {}", tag);
    }
    Ok(())
}

async fn show_status(path: &Path) -> anyhow::Result<()> {
    let project = Project::open(path).await?;
    let db = project.database();

    println!("Scanbase Project Status");
    println!("=======================");
    println!("Name: {}", project.properties.name);
    println!("Created: {}", project.properties.date);
    println!("Scans: {}", db.document_count(scanbase::project::COLLECTION_CURRENT)?);
    println!("Bricks: {}", db.document_count(scanbase::project::COLLECTION_BRICK)?);
    println!("Saved filters: {}", project.filters().count());

    if project.has_unsaved_changes() {
        println!("\nUnsaved changes detected.");
    } else {
        println!("\nNo unsaved changes.");
    }
    Ok(())
}
