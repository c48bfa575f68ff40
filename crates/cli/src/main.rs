//! gitolite-sync command-line management tool.
//!
//! Provides subcommands for previewing the reconciliation plan between two
//! settings files (a dry run against a recording control plane), generating
//! a default settings file, and validating one.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gitolite_sync_core::models::{Project, ProjectId, ProjectStatus};
use gitolite_sync_core::resync::{ControlPlaneEvent, RecordingControlPlane};
use gitolite_sync_core::settings::{PluginSettings, ReconcileRequest};
use gitolite_sync_core::SettingsReconciler;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// gitolite-sync command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "gitolite-sync",
    version,
    about = "Preview and manage Gitolite settings reconciliation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the resync plan for a settings change (dry run).
    Plan {
        /// Settings file before the change.
        #[arg(long)]
        old: PathBuf,

        /// Settings file after the change.
        #[arg(long)]
        new: PathBuf,

        /// Request a forced resync of all projects.
        #[arg(long)]
        resync_projects: bool,

        /// Request a forced resync of all SSH keys.
        #[arg(long)]
        resync_ssh_keys: bool,

        /// Request a full git-cache flush.
        #[arg(long)]
        flush_cache: bool,

        /// Recycle-bin repositories to purge (repeatable).
        #[arg(long = "purge-trash", value_name = "REPO")]
        trash_repo_ids: Vec<String>,

        /// Number of root projects on the target instance; a storage-layout
        /// change moves one repository tree per root.
        #[arg(long, default_value_t = 1)]
        root_projects: usize,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Generate a default settings file.
    Init {
        /// Output path for the generated settings file.
        #[arg(short, long, default_value = "./gitolite-sync.toml")]
        output: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Validate a settings file.
    Validate {
        /// Path to the settings file.
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Table,
    Json,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", console::style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Plan {
            old,
            new,
            resync_projects,
            resync_ssh_keys,
            flush_cache,
            trash_repo_ids,
            root_projects,
            format,
        } => {
            let request = ReconcileRequest {
                resync_projects,
                resync_ssh_keys,
                flush_cache,
                trash_repo_ids,
            };
            run_plan(&old, &new, &request, root_projects, format)
        }
        Commands::Init { output, force } => run_init(&output, force),
        Commands::Validate { file } => run_validate(&file),
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

fn run_plan(
    old: &PathBuf,
    new: &PathBuf,
    request: &ReconcileRequest,
    root_projects: usize,
    format: OutputFormat,
) -> Result<()> {
    let old_settings = PluginSettings::load(old)
        .with_context(|| format!("loading old settings from {}", old.display()))?;
    let new_settings = PluginSettings::load(new)
        .with_context(|| format!("loading new settings from {}", new.display()))?;
    debug!(old = %old.display(), new = %new.display(), "settings files loaded");

    let roots: Vec<Project> = (1..=root_projects as i64)
        .map(|id| Project {
            id: ProjectId(id),
            identifier: format!("root-{id}"),
            parent_id: None,
            status: ProjectStatus::Active,
        })
        .collect();

    let plane = Arc::new(RecordingControlPlane::with_root_projects(roots));
    let reconciler =
        SettingsReconciler::new(plane.clone(), plane.clone(), plane.clone(), plane.clone());
    reconciler
        .reconcile(&old_settings.snapshot(), &new_settings.snapshot(), request)
        .context("reconciliation dry run failed")?;

    let events = plane.events();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Table => print_plan_table(&events),
    }
    Ok(())
}

fn print_plan_table(events: &[ControlPlaneEvent]) {
    if events.is_empty() {
        println!(
            "{} no reconciliation work required",
            console::style("✓").green().bold()
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Collaborator", "Effect", "Scope", "Options"]);

    for (index, event) in events.iter().enumerate() {
        let row = match event {
            ControlPlaneEvent::Issued { command } => vec![
                Cell::new(index + 1),
                Cell::new("control plane"),
                Cell::new(command.action.to_string()),
                Cell::new(command.scope.to_string()),
                Cell::new(describe_options(command.options.force, command.options.flush_cache)),
            ],
            ControlPlaneEvent::HookInstallChecked => vec![
                Cell::new(index + 1),
                Cell::new("hooks"),
                Cell::new("check_install"),
                Cell::new("-"),
                Cell::new("-"),
            ],
            ControlPlaneEvent::HookParamsVerified => vec![
                Cell::new(index + 1),
                Cell::new("hooks"),
                Cell::new("verify_config_params"),
                Cell::new("-"),
                Cell::new("-"),
            ],
            ControlPlaneEvent::CachePurgedStale { max_age_secs } => vec![
                Cell::new(index + 1),
                Cell::new("cache"),
                Cell::new("purge_stale"),
                Cell::new(format!("entries older than {max_age_secs}s")),
                Cell::new("-"),
            ],
            ControlPlaneEvent::CacheTruncated => vec![
                Cell::new(index + 1),
                Cell::new("cache"),
                Cell::new("truncate_all"),
                Cell::new("everything"),
                Cell::new("-"),
            ],
        };
        table.add_row(row);
    }

    println!("{table}");
    println!(
        "{} {} effect(s) would be issued",
        console::style("→").cyan().bold(),
        events.len()
    );
}

fn describe_options(force: bool, flush_cache: bool) -> String {
    match (force, flush_cache) {
        (true, true) => "force, flush_cache".into(),
        (true, false) => "force".into(),
        (false, true) => "flush_cache".into(),
        (false, false) => "-".into(),
    }
}

// ---------------------------------------------------------------------------
// init / validate
// ---------------------------------------------------------------------------

fn run_init(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let rendered = PluginSettings::default().to_toml()?;
    std::fs::write(output, rendered)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{} wrote default settings to {}",
        console::style("✓").green().bold(),
        output.display()
    );
    Ok(())
}

fn run_validate(file: &PathBuf) -> Result<()> {
    let settings = PluginSettings::load(file)
        .with_context(|| format!("loading settings from {}", file.display()))?;

    println!(
        "{} {} is valid",
        console::style("✓").green().bold(),
        file.display()
    );
    println!("  gitolite user     {}", settings.gitolite_user);
    println!("  config file       {}", settings.gitolite_config_file);
    println!("  storage dir       {}", settings.gitolite_global_storage_dir);
    println!(
        "  hierarchical      {}",
        if settings.hierarchical_organisation { "yes" } else { "no" }
    );
    println!("  cache max age     {}s", settings.gitolite_cache_max_time);
    Ok(())
}
