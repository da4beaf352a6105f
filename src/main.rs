use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use linepatch::{load_from_path, BatchFile, Engine, EngineError, WorkspaceGuard};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "linepatch")]
#[command(about = "Fuzzy line-oriented diff application", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply batch files to a workspace
    Apply {
        /// Path to workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific batch file to apply (otherwise applies all in batches/)
        #[arg(short, long)]
        batch: Option<PathBuf>,

        /// Dry run - show what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Skip the confirmation prompt for low-confidence matches
        #[arg(short, long)]
        yes: bool,
    },

    /// Check whether batch files would apply cleanly, without writing
    Check {
        /// Path to workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific batch file to check
        #[arg(short, long)]
        batch: Option<PathBuf>,
    },

    /// List available batch files and their edit counts
    List {
        /// Path to workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            batch,
            dry_run,
            diff,
            yes,
        } => cmd_apply(workspace, batch, dry_run, diff, yes),

        Commands::Check { workspace, batch } => cmd_check(workspace, batch),

        Commands::List { workspace } => cmd_list(workspace),
    }
}

/// Resolve workspace path: explicit flag, then LINEPATCH_WORKSPACE, then the
/// current directory.
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var("LINEPATCH_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: LINEPATCH_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Discover all .toml batch files.
///
/// Discovery order:
/// 1. `<workspace>/batches` (batch files kept alongside the target).
/// 2. `./batches` relative to the current working directory.
fn discover_batch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_batches_dir = env::current_dir().ok().map(|cwd| cwd.join("batches"));
    let workspace_batches_dir = workspace.join("batches");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(workspace_batches_dir)
        .chain(cwd_batches_dir)
        .collect();

    for batches_dir in candidate_dirs {
        if !batches_dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&batches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml batch files found in either ./batches or {}/batches",
        workspace.display()
    )
}

fn batch_files_to_process(
    workspace: &Path,
    explicit: Option<PathBuf>,
) -> Result<Vec<PathBuf>> {
    match explicit {
        Some(path) => Ok(vec![path]),
        None => discover_batch_files(workspace),
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

fn batch_label(batch: &BatchFile, path: &Path) -> String {
    if batch.meta.name.trim().is_empty() {
        path.display().to_string()
    } else {
        batch.meta.name.clone()
    }
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    batch: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    yes: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let batch_files = batch_files_to_process(&workspace, batch)?;

    let engine = Engine::new().with_workspace(WorkspaceGuard::new(&workspace)?);

    println!("Workspace: {}", workspace.display());
    println!();

    let mut total_applied = 0;
    let mut total_failed = 0;
    let mut total_skipped = 0;

    for batch_file in batch_files {
        println!("Loading edits from {}...", batch_file.display());

        let batch = match load_from_path(&batch_file) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                total_failed += 1;
                continue;
            }
        };

        let label = batch_label(&batch, &batch_file);
        let target = workspace.join(&batch.meta.file);

        let resolved = match engine.resolve_diff(
            &target,
            batch.edits.clone(),
            batch.meta.partial_success,
        ) {
            Ok(r) => r,
            Err(e) => {
                report_engine_error(&label, &e);
                total_failed += 1;
                continue;
            }
        };

        if dry_run {
            println!(
                "{} {}: would apply {} edit(s) to {}",
                "✓".green(),
                label,
                resolved.edits.len(),
                target.display()
            );
            for failure in &resolved.failed {
                println!(
                    "{} {}: edit #{} would fail - {}",
                    "⊙".yellow(),
                    label,
                    failure.index,
                    failure.reason
                );
            }
            if show_diff {
                print!("{}", resolved.preview());
            }
            continue;
        }

        if show_diff {
            print!("{}", resolved.preview());
        }

        if resolved.requires_confirmation() && !yes {
            println!(
                "{}",
                "Some edits matched fuzzily and need confirmation:".yellow()
            );
            if !show_diff {
                print!("{}", resolved.preview());
            }
            if !confirm(&format!("Apply '{label}'?")) {
                println!("{} {}: skipped by user", "⊘".cyan(), label);
                total_skipped += 1;
                continue;
            }
        }

        match engine.commit(&resolved) {
            Ok(outcome) => {
                if outcome.is_total_success() {
                    println!(
                        "{} {}: {} ({})",
                        "✓".green(),
                        label,
                        outcome,
                        target.display()
                    );
                } else {
                    println!("{} {}: {}", "⊙".yellow(), label, outcome);
                    total_failed += outcome.failed.len();
                }
                total_applied += outcome.applied;
            }
            Err(e) => {
                report_engine_error(&label, &e);
                total_failed += 1;
            }
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} edits applied", format!("{}", total_applied).green());
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(workspace: Option<PathBuf>, batch: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let batch_files = batch_files_to_process(&workspace, batch)?;

    let engine = Engine::new().with_workspace(WorkspaceGuard::new(&workspace)?);

    println!("{}", "Batch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut clean = 0;
    let mut degraded = 0;
    let mut broken = 0;

    for batch_file in batch_files {
        let batch = match load_from_path(&batch_file) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                broken += 1;
                continue;
            }
        };

        let label = batch_label(&batch, &batch_file);
        let target = workspace.join(&batch.meta.file);

        match engine.resolve_diff(&target, batch.edits.clone(), batch.meta.partial_success) {
            Ok(resolved) if resolved.failed.is_empty() && !resolved.requires_confirmation() => {
                println!(
                    "{} {}: {} edit(s) resolve cleanly",
                    "✓".green(),
                    label,
                    resolved.edits.len()
                );
                clean += 1;
            }
            Ok(resolved) => {
                println!(
                    "{} {}: {} edit(s) resolve, {} fail, confirmation {}",
                    "⊙".yellow(),
                    label,
                    resolved.edits.len(),
                    resolved.failed.len(),
                    if resolved.requires_confirmation() {
                        "needed"
                    } else {
                        "not needed"
                    }
                );
                for failure in &resolved.failed {
                    println!("    edit #{}: {}", failure.index, failure.reason.dimmed());
                }
                degraded += 1;
            }
            Err(e) => {
                report_engine_error(&label, &e);
                broken += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} clean", format!("{}", clean).green());
    println!("  {} degraded", format!("{}", degraded).yellow());
    println!("  {} broken", format!("{}", broken).red());

    if broken > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let batch_files = discover_batch_files(&workspace)?;

    for batch_file in batch_files {
        match load_from_path(&batch_file) {
            Ok(batch) => {
                let description = batch
                    .meta
                    .description
                    .as_deref()
                    .unwrap_or("(no description)");
                println!(
                    "{}  {} edit(s)  -> {}",
                    batch_label(&batch, &batch_file).bold(),
                    batch.edits.len(),
                    batch.meta.file
                );
                println!("  {}", description.dimmed());
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), batch_file.display(), e);
            }
        }
    }

    Ok(())
}

fn report_engine_error(label: &str, error: &EngineError) {
    eprintln!("{} {}: {}", "✗".red(), label, error);

    // Targeted hints for the common failure shapes.
    match error {
        EngineError::Apply(linepatch::ApplyError::ContentNotFound { fragment, hint }) => {
            eprintln!("  {}", "Content not found in the target file".red());
            eprintln!("  Searched near line {hint} for:");
            for line in fragment.lines() {
                eprintln!("    | {line}");
            }
            eprintln!("  Possible causes:");
            eprintln!("    - The file changed since the batch was written");
            eprintln!("    - The fragment was already replaced");
        }
        EngineError::Apply(linepatch::ApplyError::Conflict(conflict)) => {
            eprintln!("  {}", "Overlapping edits in one batch".red());
            for pair in &conflict.conflicts {
                eprintln!("    {pair}");
            }
            eprintln!("  Action: merge or re-range the overlapping edits");
        }
        _ => {}
    }
}
