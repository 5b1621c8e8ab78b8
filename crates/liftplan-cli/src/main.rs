//! LiftPlan - workout plan editor
//!
//! Command-line front end for the plan engine:
//! - CSV import and export
//! - Plan and catalog inspection
//! - Crash-recovery backups

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use liftplan_core::plan::{new_id, Exercise, PlanTree};
use liftplan_core::storage::{Database, LocalBackupStore, SqlitePlanStore};
use liftplan_core::sync::{PlanEdit, PlanEditor, SyncError};
use liftplan_core::{paths, transfer, CatalogEntry, SyncConfig};

/// LiftPlan - Workout Plan Editor
#[derive(Parser)]
#[command(name = "liftplan")]
#[command(about = "Edit, sync and exchange workout plans", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.liftplan/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV file as the client's plan and save it
    Import {
        file: PathBuf,
        #[arg(short, long)]
        client: String,
    },

    /// Export the client's plan as CSV
    Export {
        #[arg(short, long)]
        client: String,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the client's plan
    Show {
        #[arg(short, long)]
        client: String,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the exercise catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogCommands,
    },

    /// Inspect or restore a crash-recovery backup
    Recover {
        #[arg(short, long)]
        client: String,
        /// Save the recovered plan
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List catalog exercises
    List,
    /// Add an exercise to the catalog
    Add {
        name: String,
        #[arg(long)]
        motion: Option<String>,
        #[arg(long)]
        target_area: Option<String>,
    },
}

/// Open stores and build an editor for `client`
struct Workspace {
    config: SyncConfig,
    store: SqlitePlanStore,
    backup: LocalBackupStore,
}

impl Workspace {
    fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => SyncConfig::load_from_path(&path)?,
            None => SyncConfig::load()?,
        };
        let plans = Database::new(&paths::plans_db_path()).context("opening plan store")?;
        let backups = Database::new(&paths::backup_db_path()).context("opening backup store")?;
        Ok(Self {
            config,
            store: SqlitePlanStore::new(plans.shared()),
            backup: LocalBackupStore::new(backups.shared()),
        })
    }

    fn editor(&self, client: &str) -> PlanEditor {
        let editor = PlanEditor::new(client, Arc::new(self.store.clone()), &self.config);
        if self.config.backup_enabled {
            editor.with_backup(self.backup.clone())
        } else {
            editor
        }
    }

    async fn load(&self, client: &str) -> Result<PlanEditor> {
        let mut editor = self.editor(client);
        let report = editor.load().await?;
        if report.recovered {
            println!("Recovered unsaved changes for {} from local backup.", client);
        }
        Ok(editor)
    }
}

fn init_logging() {
    let log_dir = paths::logs_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let writer: Box<dyn Write + Send> = match std::fs::File::create(log_dir.join("liftplan.log")) {
        Ok(file) => Box::new(file),
        Err(_) => Box::new(std::io::sink()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(writer))
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let workspace = Workspace::open(cli.config)?;

    match cli.command {
        Commands::Import { file, client } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut editor = workspace.load(&client).await?;
            let report = transfer::import(&text, editor.catalog())?;

            println!(
                "Imported {} phase(s), {} exercise(s) from {}",
                report.tree.phases.len(),
                report.rows(),
                file.display()
            );
            for row in &report.unresolved {
                println!(
                    "  ⚠ line {}: '{}' ({} / {}) is not in the catalog",
                    row.line, row.description, row.phase, row.session
                );
            }

            editor.apply(PlanEdit::ReplaceTree { tree: report.tree })?;
            match editor.save().await {
                Ok(saved) => {
                    if let Some(receipt) = saved.receipt {
                        println!("Saved plan {} at {}", receipt.plan_id, receipt.updated_at);
                    }
                }
                Err(SyncError::Validation(err)) => {
                    println!();
                    println!("Not saved: {}", err);
                    println!("Add the missing exercises with `liftplan catalog add`, then re-import.");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Export { client, out } => {
            let editor = workspace.load(&client).await?;
            let text = transfer::export(editor.tree())?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported {} exercise(s) to {}", editor.tree().exercise_count(), path.display());
                }
                None => print!("{}", text),
            }
        }
        Commands::Show { client, json } => {
            let editor = workspace.load(&client).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(editor.tree())?);
                return Ok(());
            }
            match editor.plan_id() {
                Some(plan_id) => println!("Plan {} ({})", plan_id, editor.status()),
                None => println!("No saved plan for {}", client),
            }
            print_tree(editor.tree());
        }
        Commands::Catalog { action } => match action {
            CatalogCommands::List => {
                let entries = workspace.store.list_catalog()?;
                if entries.is_empty() {
                    println!("Catalog is empty. Add exercises with `liftplan catalog add <name>`.");
                }
                for entry in &entries {
                    let detail: Vec<&str> = [entry.motion.as_deref(), entry.target_area.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect();
                    if detail.is_empty() {
                        println!("  {}  {}", entry.catalog_id, entry.name);
                    } else {
                        println!("  {}  {} ({})", entry.catalog_id, entry.name, detail.join(", "));
                    }
                }
            }
            CatalogCommands::Add {
                name,
                motion,
                target_area,
            } => {
                if name.trim().is_empty() {
                    bail!("exercise name cannot be empty");
                }
                let entry = CatalogEntry {
                    catalog_id: new_id(),
                    name: name.trim().to_string(),
                    motion,
                    target_area,
                };
                workspace.store.upsert_catalog_entry(&entry)?;
                println!("Added {} ({})", entry.name, entry.catalog_id);
            }
        },
        Commands::Recover { client, apply } => {
            let Some(record) = workspace.backup.read(&client) else {
                println!("No backup for {}", client);
                return Ok(());
            };
            let saved_at = format_millis(record.timestamp);
            println!("Backup from {} (schema {})", saved_at, record.version);
            print_tree(&record.phases);

            if apply {
                let mut editor = workspace.editor(&client);
                if !editor.load().await?.recovered {
                    println!("Server already has a plan for {}; backup not applied.", client);
                    return Ok(());
                }
                let saved = editor.save().await?;
                if let Some(receipt) = saved.receipt {
                    println!("Saved recovered plan {}", receipt.plan_id);
                }
            }
        }
    }

    Ok(())
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

fn range(min: Option<u32>, max: Option<u32>) -> Option<String> {
    match (min, max) {
        (Some(a), Some(b)) if a == b => Some(a.to_string()),
        (Some(a), Some(b)) => Some(format!("{}-{}", a, b)),
        (Some(v), None) | (None, Some(v)) => Some(v.to_string()),
        (None, None) => None,
    }
}

fn describe(exercise: &Exercise) -> String {
    let mut parts = vec![format!("{:<4}{}", exercise.order_marker, exercise.description)];
    match (
        range(exercise.sets_min, exercise.sets_max),
        range(exercise.reps_min, exercise.reps_max),
    ) {
        (Some(sets), Some(reps)) => parts.push(format!("{} x {}", sets, reps)),
        (Some(sets), None) => parts.push(format!("{} sets", sets)),
        (None, Some(reps)) => parts.push(format!("{} reps", reps)),
        (None, None) => {}
    }
    if let Some(tempo) = &exercise.tempo {
        parts.push(format!("tempo {}", tempo));
    }
    if let Some(rest) = range(exercise.rest_min, exercise.rest_max) {
        parts.push(format!("rest {}s", rest));
    }
    if let Some(tut) = exercise.tut {
        parts.push(format!("TUT {}s", tut));
    }
    if !exercise.is_resolved() {
        parts.push("[unresolved]".to_string());
    }
    parts.join("  ")
}

fn print_tree(tree: &PlanTree) {
    if tree.is_empty() {
        println!("  (empty)");
        return;
    }
    for phase in &tree.sorted().phases {
        let marker = if phase.is_active { " [active]" } else { "" };
        println!("{}{}", phase.name, marker);
        for session in &phase.sessions {
            println!("  {} ({} min)", session.name, session.duration_minutes);
            for exercise in &session.exercises {
                println!("    {}", describe(exercise));
            }
        }
    }
}
