use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether::api::{self, AppContext};
use tether::backup;
use tether::client::{AgentClient, ClientError};
use tether::config::StorePaths;
use tether::continuity::SessionTracker;
use tether::db::Database;
use tether::models::{CreateSkillInput, CreateTaskInput};
use tether::projects::{self, ProjectHub, StartOutcome, StopOutcome};

const DEFAULT_PORT: u16 = 8765;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Local-first continuity agent: task memory, skills, and session restore")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (the continuity policy runs first)
    Serve {
        /// Port for the HTTP API
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Store directory (defaults to TETHER_DIR or the platform data dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Check whether a service instance is running
    Status {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Stop the instance owning the store
    Stop {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Run the session continuity policy and print the report
    Resume {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Create a snapshot archive of the store
    Backup {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// List snapshot archives, newest first
    Backups {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Restore an archive (the most recent one if none is named)
    Restore {
        /// Archive file name or path
        archive: Option<PathBuf>,

        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Add a task via a running instance
    AddTask {
        title: String,

        #[arg(long)]
        priority: Option<i32>,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Add or replace a skill via a running instance
    AddSkill {
        name: String,

        #[arg(long)]
        command: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Manage registered projects
    #[command(subcommand)]
    Project(ProjectCommands),
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Register a project path (derives its port and namespace)
    Register {
        path: PathBuf,

        /// Registration name (defaults to the path's final segment)
        #[arg(long)]
        name: Option<String>,

        /// Declared project type, folded into the namespace
        #[arg(long, default_value = "app")]
        kind: String,
    },
    /// List registered projects with live status
    List,
    /// Start a project's service instance (idempotent)
    Start { name: String },
    /// Stop a project's service instance
    Stop { name: String },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tether=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port, dir }) => serve(port, dir).await?,
        Some(Commands::Status { port }) => status(port).await,
        Some(Commands::Stop { dir }) => {
            let paths = StorePaths::resolve(dir)?;
            match projects::stop_instance(&paths)? {
                StopOutcome::Stopped => println!("Stopped the instance at {}", paths.store_dir().display()),
                StopOutcome::NotRunning => println!("No instance is running at {}", paths.store_dir().display()),
            }
        }
        Some(Commands::Resume { dir }) => {
            let paths = StorePaths::resolve(dir)?;
            paths.ensure_dirs()?;
            let db = Database::open(paths.db_file())?;
            db.migrate()?;
            let report = SessionTracker::new(paths, db).resume(Utc::now());
            print_report(&report);
        }
        Some(Commands::Backup { dir }) => {
            let paths = StorePaths::resolve(dir)?;
            let db = Database::open(paths.db_file())?;
            db.migrate()?;
            let archive = backup::create_backup(&paths, &db)?;
            println!("Created {}", archive.display());
        }
        Some(Commands::Backups { limit, dir }) => {
            let paths = StorePaths::resolve(dir)?;
            let backups = backup::list_backups(&paths, limit)?;
            if backups.is_empty() {
                println!("No backup archives found");
            }
            for meta in backups {
                println!(
                    "{}  {:>10}  {} ago",
                    meta.file_name,
                    fmt_size(meta.size_bytes),
                    meta.age
                );
            }
        }
        Some(Commands::Restore { archive, dir }) => {
            let paths = StorePaths::resolve(dir)?;
            // Restoring under a live instance would race its writes
            if paths.instance_running() {
                anyhow::bail!(
                    "an instance is still running against {}; stop it first with `tether stop`",
                    paths.store_dir().display()
                );
            }
            let restored = backup::restore_backup(&paths, archive.as_deref())?;
            println!("Restored {}", restored.display());
        }
        Some(Commands::AddTask {
            title,
            priority,
            port,
        }) => {
            let input = CreateTaskInput {
                title,
                status: None,
                priority,
                due_at: None,
                metadata: None,
            };
            match AgentClient::for_port(port).add_task(&input).await {
                Ok(added) => println!("Added task #{}: {}", added.id, added.added),
                Err(e) => report_client_error(e, port),
            }
        }
        Some(Commands::AddSkill {
            name,
            command,
            description,
            port,
        }) => {
            let input = CreateSkillInput {
                name,
                command,
                description,
                prompt: None,
                code: None,
                tags: None,
            };
            match AgentClient::for_port(port).add_skill(&input).await {
                Ok(added) => println!("Saved skill #{}: {}", added.id, added.added),
                Err(e) => report_client_error(e, port),
            }
        }
        Some(Commands::Project(cmd)) => project_command(cmd)?,
        None => serve(DEFAULT_PORT, None).await?,
    }

    Ok(())
}

async fn serve(port: u16, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = StorePaths::resolve(dir)?;
    paths.ensure_dirs()?;

    let db = Database::open(paths.db_file())?;
    db.migrate()?;

    // Continuity policy runs at process start
    let report = SessionTracker::new(paths.clone(), db.clone()).resume(Utc::now());
    tracing::info!(
        class = report.class.as_str(),
        action = report.action.as_str(),
        session = report.session_count,
        "{}",
        report.message
    );

    paths.write_pid()?;

    let app = api::create_router(AppContext {
        db,
        paths: paths.clone(),
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("tether listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    paths.remove_pid()?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn status(port: u16) {
    match AgentClient::for_port(port).health().await {
        Ok(health) => {
            println!(
                "tether v{} is running on port {} (ok: {})",
                health.version, port, health.ok
            );
        }
        Err(ClientError::Unavailable(_)) => {
            println!("tether is not running on port {}", port);
            println!("Start it with: tether serve --port {}", port);
        }
        Err(e) => println!("The service answered with an error: {}", e),
    }
}

fn project_command(cmd: ProjectCommands) -> anyhow::Result<()> {
    let mut hub = ProjectHub::open_default()?;

    match cmd {
        ProjectCommands::Register { path, name, kind } => {
            let registration = hub.register_project(&path, name, &kind)?;
            println!(
                "Registered {} -> port {}, namespace {}",
                registration.name, registration.port, registration.namespace
            );
        }
        ProjectCommands::List => {
            let projects = hub.list_projects()?;
            if projects.is_empty() {
                println!("No projects registered");
            }
            for project in projects {
                println!(
                    "{:<8} {} ({}) port {} [{}]",
                    project.status.as_str(),
                    project.name,
                    project.kind,
                    project.port,
                    project.path
                );
            }
        }
        ProjectCommands::Start { name } => match hub.start_project(&name)? {
            StartOutcome::Started => println!("Started {}", name),
            StartOutcome::AlreadyRunning => println!("{} is already running", name),
        },
        ProjectCommands::Stop { name } => match hub.stop_project(&name)? {
            StopOutcome::Stopped => println!("Stopped {}", name),
            StopOutcome::NotRunning => println!("{} was not running", name),
        },
    }

    Ok(())
}

fn report_client_error(e: ClientError, port: u16) {
    match e {
        ClientError::Unavailable(_) => {
            println!("tether is not running on port {}", port);
            println!("Start it with: tether serve --port {}", port);
        }
        other => println!("Request failed: {}", other),
    }
}

fn print_report(report: &tether::continuity::RestoreReport) {
    println!(
        "{} [{} -> {}]",
        report.message,
        report.class.as_str(),
        report.action.as_str()
    );
    if let Some(hours) = report.gap_hours {
        println!("  gap: {:.1}h", hours);
    }
    if report.restored_tasks > 0 {
        println!("  entries read back: {}", report.restored_tasks);
    }
    if report.log_lines > 0 {
        println!("  log lines in window: {}", report.log_lines);
    }
    if !report.recent_backups.is_empty() {
        println!("  recent backups: {}", report.recent_backups.join(", "));
    }
    if let Some(summary) = &report.summary {
        println!("  {}", summary);
    }
    if let Some(failure) = &report.failure {
        println!("  restore action failed: {}", failure);
    }
    println!("  session #{}", report.session_count);
}

fn fmt_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
