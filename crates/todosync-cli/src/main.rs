//! todosync CLI
//!
//! Command-line interface for todosync - a local-first task client.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use todosync_core::{cancellation, Cancellation, Config, ProjectUpdate, Repository};

mod commands;
mod output;

use commands::task::{AddArgs, UpdateArgs};
use commands::Repo;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "todosync")]
#[command(about = "todosync - Local-first tasks backed by a remote sync service")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull remote changes into the local cache
    Sync {
        /// Replace the cache with a full snapshot
        #[arg(long)]
        full: bool,
    },
    /// Show sync status and cache contents
    Status,
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage sections
    Section {
        #[command(subcommand)]
        command: SectionCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List all projects
    #[command(alias = "ls")]
    List,
    /// Show project details (path and sections)
    Show {
        /// Project name or id
        project: String,
    },
    /// Create a new project
    #[command(alias = "add")]
    Create {
        name: String,
        /// Parent project name or id
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        favorite: bool,
    },
    /// Rename or restyle a project
    Update {
        /// Project name or id
        project: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        favorite: Option<bool>,
    },
    /// Delete a project with all its tasks
    #[command(alias = "rm")]
    Delete {
        /// Project name or id
        project: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SectionCommands {
    /// List sections
    #[command(alias = "ls")]
    List {
        /// Only sections of this project
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Create a section in a project
    #[command(alias = "add")]
    Create {
        /// Project name or id
        project: String,
        name: String,
    },
    /// Delete a section
    #[command(alias = "rm")]
    Delete {
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List active tasks
    #[command(alias = "ls")]
    List {
        /// Project name or id
        #[arg(short, long)]
        project: Option<String>,
        /// Only tasks with this label
        #[arg(short, long)]
        label: Option<String>,
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },
    /// Show task details
    Show { id: String },
    /// Create a new task
    #[command(alias = "create")]
    Add(AddArgs),
    /// Change a task
    #[command(alias = "edit")]
    Update(UpdateArgs),
    /// Mark a task completed
    #[command(alias = "close")]
    Done { id: String },
    /// Mark a completed task active again
    Reopen { id: String },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove all cached data and sync state
    Reset {
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, api_url, api_token, cache_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the repository
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load().context("Failed to load configuration")?;
    let mut repo = Repository::open(config).context("Failed to open todosync")?;

    let (cancel_handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_handle.cancel();
        }
    });

    let result = run(cli.command, &mut repo, &cancel, &output).await;

    if let Err(e) = repo.close().await {
        tracing::warn!("Failed to close repository: {}", e);
    }
    result
}

async fn run(command: Commands, repo: &mut Repo, cancel: &Cancellation, output: &Output) -> Result<()> {
    // Sync bootstraps on its own; status and reset must not download first
    if !matches!(
        command,
        Commands::Sync { .. } | Commands::Status | Commands::Cache { .. }
    ) {
        if let Some(report) = repo.initialize(cancel).await? {
            tracing::info!(
                "Downloaded {} projects and {} tasks",
                report.projects.upserted,
                report.tasks.upserted
            );
        }
    }

    match command {
        Commands::Sync { full } => commands::sync::sync(repo, full, cancel, output).await,
        Commands::Status => commands::status::show(repo, output),
        Commands::Project { command } => handle_project_command(command, repo, cancel, output).await,
        Commands::Section { command } => handle_section_command(command, repo, cancel, output).await,
        Commands::Task { command } => handle_task_command(command, repo, cancel, output).await,
        Commands::Cache {
            command: CacheCommands::Reset { yes },
        } => commands::cache::reset(repo, yes, output),
        Commands::Config { .. } => unreachable!(), // Handled in main
    }
}

async fn handle_project_command(
    command: ProjectCommands,
    repo: &mut Repo,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    match command {
        ProjectCommands::List => commands::project::list(repo, cancel, output).await,
        ProjectCommands::Show { project } => {
            commands::project::show(repo, project, cancel, output).await
        }
        ProjectCommands::Create {
            name,
            parent,
            color,
            favorite,
        } => commands::project::create(repo, name, parent, color, favorite, cancel, output).await,
        ProjectCommands::Update {
            project,
            name,
            color,
            favorite,
        } => {
            let update = ProjectUpdate {
                name,
                color,
                is_favorite: favorite,
            };
            commands::project::update(repo, project, update, cancel, output).await
        }
        ProjectCommands::Delete { project, yes } => {
            commands::project::delete(repo, project, yes, cancel, output).await
        }
    }
}

async fn handle_section_command(
    command: SectionCommands,
    repo: &mut Repo,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    match command {
        SectionCommands::List { project } => {
            commands::section::list(repo, project, cancel, output).await
        }
        SectionCommands::Create { project, name } => {
            commands::section::create(repo, project, name, cancel, output).await
        }
        SectionCommands::Delete { id, yes } => {
            commands::section::delete(repo, id, yes, cancel, output).await
        }
    }
}

async fn handle_task_command(
    command: TaskCommands,
    repo: &mut Repo,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    match command {
        TaskCommands::List {
            project,
            label,
            all,
        } => commands::task::list(repo, project, label, all, cancel, output).await,
        TaskCommands::Show { id } => commands::task::show(repo, id, cancel, output).await,
        TaskCommands::Add(args) => commands::task::add(repo, args, cancel, output).await,
        TaskCommands::Update(args) => commands::task::update(repo, args, cancel, output).await,
        TaskCommands::Done { id } => commands::task::done(repo, id, cancel, output).await,
        TaskCommands::Reopen { id } => commands::task::reopen(repo, id, cancel, output).await,
        TaskCommands::Delete { id, yes } => {
            commands::task::delete(repo, id, yes, cancel, output).await
        }
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Log to stderr; `RUST_LOG` overrides the `-v` level
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("todosync_core={},todosync_cli={}", level, level))
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
