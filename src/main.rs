use anyhow::{Context, Result};
use camcull::core::history::read_records;
use camcull::{BatchRunner, CullConfig, RunPhase, RunReport};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "camcull",
    version,
    about = "Cull near-duplicate frames from fixed cameras"
)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },

    /// Work with deletion history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// List the frames a run would delete, without touching any file
    Scan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Rename, compare and permanently delete duplicate frames
    Delete {
        #[command(flatten)]
        run: RunArgs,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Append the deleted files to `<dir>/.history.jsonl`
        #[arg(long)]
        record_history: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory holding the camera frames
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,
    /// JSON file with run settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Image extension to consider
    #[arg(long)]
    extension: Option<String>,
    /// Same-hour duplicate threshold
    #[arg(long)]
    intra_threshold: Option<f64>,
    /// Near-hour duplicate threshold
    #[arg(long)]
    cross_threshold: Option<f64>,
    /// Hours either side compared by the near-hour pass
    #[arg(long)]
    window: Option<u8>,
    /// Compare cameras in parallel
    #[arg(long)]
    parallel: bool,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn load_config(&self) -> Result<CullConfig> {
        let mut config = match &self.config {
            Some(path) => CullConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => CullConfig::default(),
        };
        if let Some(extension) = &self.extension {
            config.extension = extension.trim_start_matches('.').to_string();
        }
        if let Some(threshold) = self.intra_threshold {
            config.intra_hour_threshold = threshold;
        }
        if let Some(threshold) = self.cross_threshold {
            config.cross_hour_threshold = threshold;
        }
        if let Some(window) = self.window {
            config.hour_window = window;
        }
        config.parallel |= self.parallel;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List all deletion history records
    List {
        /// Directory containing the photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Duplicates { command } => match command {
            Dups::Scan { run } => {
                println!("▶ Scanning for duplicates in: {}", run.path.display());
                let config = run.load_config()?;
                let spinner = spinner()?;
                let report = runner(config, &spinner)
                    .scan(&run.path)
                    .with_context(|| format!("Failed to scan {:?}", run.path))?;
                spinner.finish_and_clear();
                print_report(&report, run.json)?;
            }

            Dups::Delete {
                run,
                yes,
                record_history,
            } => {
                println!("▶ Deleting duplicates in: {}", run.path.display());
                let config = run.load_config()?;
                if !yes && !confirm(&run.path)? {
                    println!("Aborted; no files were changed.");
                    return Ok(());
                }

                let spinner = spinner()?;
                let report = runner(config, &spinner)
                    .with_history(record_history)
                    .run(&run.path)
                    .with_context(|| format!("Failed to cull {:?}", run.path))?;
                spinner.finish_and_clear();
                print_report(&report, run.json)?;

                if record_history {
                    println!(
                        "\n✅ Recorded cull history in {}",
                        run.path.join(".history.jsonl").display()
                    );
                }
            }
        },

        Commands::History { command } => match command {
            HistoryCmd::List { path } => {
                let records = read_records(&path)
                    .with_context(|| format!("Could not read history in {:?}", path))?;

                println!("🗂️  Cull History:");
                for (i, rec) in records.iter().enumerate() {
                    println!(
                        "[{}] {}\n     directory: {}\n     deleted: {:?}\n     action: {}\n",
                        i, rec.timestamp, rec.directory, rec.deleted, rec.action
                    );
                }
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn runner(
    config: CullConfig,
    spinner: &ProgressBar,
) -> BatchRunner<camcull::ChangeDetectionScorer> {
    let spinner = spinner.clone();
    BatchRunner::with_change_detection(config).with_progress(Box::new(move |progress| {
        if progress.phase == RunPhase::Complete {
            spinner.finish_with_message(progress.message);
        } else {
            spinner.set_message(progress.message);
        }
    }))
}

fn confirm(dir: &Path) -> Result<bool> {
    let prompt = format!(
        "Frames in {} will be renamed, resized and duplicates deleted. Continue?",
        dir.display()
    );
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Compared {} images from {} camera(s) in {} ms",
        report.images,
        report.cameras.len(),
        report.elapsed_ms
    );
    for camera in &report.cameras {
        println!(
            "\n✨ Camera {}: {} images in {} hour(s), {} comparisons, {} duplicates",
            camera.camera_id,
            camera.images,
            camera.buckets,
            camera.comparisons,
            camera.removed.len()
        );
        for path in &camera.removed {
            if report.dry_run {
                println!("   🗑️  [dry-run] DELETE {}", path.display());
            } else {
                println!("   🗑️  Deleted {}", path.display());
            }
        }
    }

    if !report.malformed.is_empty() {
        println!("\n⚠️  {} malformed file name(s):", report.malformed.len());
        for file in &report.malformed {
            println!("   {}", file);
        }
    }

    if !report.errors.is_empty() {
        println!("\n⚠️  {} file(s) skipped:", report.errors.len());
        for error in &report.errors {
            println!("   {}", error);
        }
    }

    if report.dry_run {
        println!("\n⚠️  Dry-run only; no files were changed.");
    } else {
        println!(
            "\n✅ Deleted {} duplicate(s), restored {} image(s)",
            report.deleted, report.restored
        );
    }
    Ok(())
}
