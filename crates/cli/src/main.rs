mod config;
mod render;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use db::{RecordStore, SqliteStore};
use devloop_core::Project;
use orchestrator::{Controller, EngineContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::{DevloopConfig, DEVLOOP_DIR};

#[derive(Parser)]
#[command(name = "devloop")]
#[command(about = "Drive developer and reviewer agents through a plan", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `orchestrator=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and create the database
    Init,
    /// Create a project from a markdown plan
    Import {
        plan: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// List projects
    List,
    /// Show the detected state of a project
    Status { project: String },
    /// Run a project's tasks, resuming after an interruption
    Run {
        project: String,
        /// Wait for Enter after each task
        #[arg(long)]
        pause: bool,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// A positive value keeps going past failed tasks
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Put every task back to pending
    Reset { project: String },
    /// Put failed and escalated tasks back to pending
    Retry { project: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let root = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init => init_project(&root).await,
        Commands::Import { plan, name } => import(&root, &plan, name).await,
        Commands::List => list(&root).await,
        Commands::Status { project } => status(&root, &project).await,
        Commands::Run {
            project,
            pause,
            max_iterations,
            max_retries,
        } => {
            let mut config = DevloopConfig::read(&root).await;
            if pause {
                config.engine.pause_after_task = true;
            }
            if let Some(max) = max_iterations {
                config.engine = config.engine.with_max_iterations(max);
            }
            if let Some(retries) = max_retries {
                config.engine.max_retries = retries;
            }
            let app = App::open(&root, config).await?;
            let project = app.resolve(&project).await?;
            run::run_project(&app, &project).await
        }
        Commands::Reset { project } => {
            let app = App::open(&root, DevloopConfig::read(&root).await).await?;
            let project = app.resolve(&project).await?;
            app.controller.detector().reset_project(project.id).await?;
            println!("Reset '{}': all tasks pending", project.name);
            Ok(())
        }
        Commands::Retry { project } => {
            let app = App::open(&root, DevloopConfig::read(&root).await).await?;
            let project = app.resolve(&project).await?;
            let count = app
                .controller
                .detector()
                .retry_failed_tasks(project.id)
                .await?;
            println!("Queued {count} failed task(s) of '{}' for retry", project.name);
            Ok(())
        }
    }
}

/// Store and controller for one repository.
pub struct App {
    pub root: PathBuf,
    pub store: Arc<dyn RecordStore>,
    pub controller: Controller,
}

impl App {
    async fn open(root: &Path, config: DevloopConfig) -> Result<Self> {
        let database_url = config.database_url(root);
        tracing::debug!(url = %database_url, "Opening database");
        if let Some(dir) = database_dir(&database_url) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let store: Arc<dyn RecordStore> = Arc::new(
            SqliteStore::connect(&database_url)
                .await
                .context("Failed to open database")?,
        );

        let agents = Arc::new(agent::CliAgent::new(
            config.agent.developer_command.clone(),
            config.agent.reviewer_command.clone(),
        ));
        let changes = vcs::detect(root, config.vcs.backend);
        let mut engine = config.engine.clone();
        engine.working_dir = root.to_path_buf();

        let ctx = EngineContext::new(store.clone(), agents, changes).with_config(engine);
        Ok(Self {
            root: root.to_path_buf(),
            store,
            controller: Controller::new(ctx),
        })
    }

    /// Find a project by id or by name.
    async fn resolve(&self, reference: &str) -> Result<Project> {
        if let Ok(id) = Uuid::parse_str(reference) {
            return self
                .store
                .get_project(id)
                .await
                .with_context(|| format!("Project {id} not found"));
        }

        let mut matches: Vec<Project> = self
            .store
            .list_projects()
            .await?
            .into_iter()
            .filter(|p| p.name == reference)
            .collect();
        match matches.len() {
            0 => bail!("No project named '{reference}'"),
            1 => Ok(matches.remove(0)),
            n => bail!("{n} projects are named '{reference}'; use the project id"),
        }
    }
}

fn database_dir(url: &str) -> Option<&Path> {
    let path = url.strip_prefix("sqlite:")?;
    let path = path.trim_start_matches("//");
    if path.contains(":memory:") {
        return None;
    }
    let path = path.split('?').next()?;
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}

async fn init_project(root: &Path) -> Result<()> {
    let config_path = DevloopConfig::path(root);
    if config_path.exists() {
        println!("Already initialized at {}", config_path.display());
        return Ok(());
    }

    let config = DevloopConfig::default();
    config.write(root).await?;
    App::open(root, config).await?;

    println!("Initialized devloop in {}", root.display());
    println!();
    println!("Created:");
    println!("  {DEVLOOP_DIR}/");
    println!("  ├── {}", config::CONFIG_FILE);
    println!("  └── {}", config::DEFAULT_DB_NAME);
    println!();
    println!("Next: devloop import <plan.md>");
    Ok(())
}

async fn import(root: &Path, plan: &Path, name: Option<String>) -> Result<()> {
    let plan_text = tokio::fs::read_to_string(plan)
        .await
        .with_context(|| format!("Failed to read {}", plan.display()))?;
    let name = match name {
        Some(name) => name,
        None => plan
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("plan")
            .to_string(),
    };

    let app = App::open(root, DevloopConfig::read(root).await).await?;
    let (project, tasks) = app.controller.import_plan(&name, &plan_text).await?;

    println!("Imported '{}' ({})", project.name, project.id);
    for task in &tasks {
        println!("  {}. {}", task.sequence, task.title);
    }
    Ok(())
}

async fn list(root: &Path) -> Result<()> {
    let app = App::open(root, DevloopConfig::read(root).await).await?;
    let projects = app.store.list_projects().await?;

    if projects.is_empty() {
        println!("No projects yet.");
        return Ok(());
    }
    for project in &projects {
        println!(
            "{}  {:<12} {}",
            project.id,
            render::project_status(project.status),
            project.name
        );
    }
    Ok(())
}

async fn status(root: &Path, reference: &str) -> Result<()> {
    let app = App::open(root, DevloopConfig::read(root).await).await?;
    let project = app.resolve(reference).await?;
    let state = app.controller.detector().detect_state(project.id).await?;

    println!();
    render::print_state(&state);
    println!();
    for task in app.store.list_tasks(project.id).await? {
        println!(
            "  {} {:>2}. {} [{}]",
            render::task_icon(task.status),
            task.sequence,
            task.title,
            task.status
        );
    }
    println!();
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "devloop=info,orchestrator=info,agent=warn,vcs=warn,db=warn".into()),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
