use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qdg_core::analysis::parse_task_analysis;
use qdg_core::config::{load_settings, save_settings, ConfigError, SettingsPatch};
use qdg_core::environment::{resolve_project_path, Environment};
use qdg_core::identity::{config_path, TaskId};
use qdg_core::record::{find_existing_task, list_task_records, load_task_record, save_task_record};
use qdg_core::store::initialize_store;

#[derive(Parser)]
#[command(name = "qdg", version, about = "Task dimension store CLI")]
struct Cli {
    /// Project directory (defaults to QDG_PROJECT_PATH, then the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create .qdg/config and .qdg/tasks with default settings
    Init,
    /// Show or change dimension settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the content fingerprint of a TaskAnalysis JSON file
    Fingerprint {
        #[arg(long)]
        analysis: PathBuf,
    },
    /// Find a stored task by fingerprint
    Find {
        #[arg(long)]
        fingerprint: String,
    },
    /// List stored task records
    List,
    /// Print a stored task record
    Show { task_id: String },
    /// Save a refined description and dimensions for a task id
    Save {
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        task_name: String,
        #[arg(long)]
        description_file: PathBuf,
        #[arg(long)]
        dimensions_file: PathBuf,
        /// TaskAnalysis JSON file to include as record metadata
        #[arg(long)]
        analysis: Option<PathBuf>,
    },
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    Set {
        #[arg(long, allow_hyphen_values = true)]
        dimension_count: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        expected_score: Option<f64>,
    },
}

fn init_logging() {
    let filter = std::env::var("QDG_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn project_dir(env: &Environment, requested: Option<&Path>) -> Result<PathBuf> {
    let requested = requested.map(|path| path.to_string_lossy().into_owned());
    Ok(resolve_project_path(env, requested.as_deref(), None)?)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let env = Environment::capture();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Command::Version => {
            println!("qdg {}", qdg_core::version());
        }
        Command::Init => {
            let project = project_dir(&env, cli.project.as_deref())?;
            let layout = initialize_store(&project);
            if cli.json {
                print_json(&serde_json::to_value(&layout)?)?;
            } else {
                for path in &layout.created {
                    println!("created {}", path.display());
                }
                for path in &layout.existed {
                    println!("exists  {}", path.display());
                }
                for failed in &layout.failed {
                    eprintln!("failed  {}: {}", failed.path.display(), failed.error);
                }
            }
            if !layout.is_complete() {
                bail!("store at {} is incomplete", layout.root.display());
            }
        }
        Command::Config { command } => {
            let project = project_dir(&env, cli.project.as_deref())?;
            let settings = match command {
                ConfigCommand::Show => load_settings(&project),
                ConfigCommand::Set {
                    dimension_count,
                    expected_score,
                } => {
                    let patch = SettingsPatch {
                        dimension_count,
                        expected_score,
                    };
                    if patch.is_empty() {
                        bail!("pass --dimension-count and/or --expected-score");
                    }
                    match save_settings(&project, &patch) {
                        Ok(settings) => settings,
                        Err(ConfigError::Validation(errors)) => {
                            bail!("invalid settings:\n  {}", errors.join("\n  "))
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            };
            if cli.json {
                print_json(&serde_json::json!({
                    "settings": settings,
                    "path": config_path(&project),
                }))?;
            } else {
                println!("dimensionCount: {}", settings.dimension_count);
                println!("expectedScore: {}", settings.expected_score);
            }
        }
        Command::Fingerprint { analysis } => {
            let analysis = parse_task_analysis(&read_file(&analysis)?)?;
            let fingerprint = analysis.fingerprint();
            if cli.json {
                print_json(&serde_json::json!({
                    "fingerprint": fingerprint,
                    "task_name": analysis.task_name,
                }))?;
            } else {
                println!("{}", fingerprint);
            }
        }
        Command::Find { fingerprint } => {
            let project = project_dir(&env, cli.project.as_deref())?;
            let found = find_existing_task(&project, &fingerprint);
            if cli.json {
                print_json(&serde_json::json!({
                    "fingerprint": fingerprint.trim(),
                    "found": found.is_some(),
                    "task_id": found,
                }))?;
            } else {
                match found {
                    Some(task_id) => println!("{}", task_id),
                    None => bail!("no stored task with fingerprint {}", fingerprint.trim()),
                }
            }
        }
        Command::List => {
            let project = project_dir(&env, cli.project.as_deref())?;
            let records = list_task_records(&project);
            if cli.json {
                print_json(&serde_json::to_value(&records)?)?;
            } else {
                for record in records {
                    println!(
                        "{}\t{}\t{}",
                        record.task_id,
                        record.task_name.as_deref().unwrap_or("(legacy)"),
                        record.path.display()
                    );
                }
            }
        }
        Command::Show { task_id } => {
            let project = project_dir(&env, cli.project.as_deref())?;
            let task_id = TaskId::parse(&task_id)?;
            let Some(record) = load_task_record(&project, &task_id)? else {
                bail!("task not found: {}", task_id);
            };
            if cli.json {
                print_json(&serde_json::to_value(&record)?)?;
            } else {
                print!("{}", record.content);
            }
        }
        Command::Save {
            task_id,
            task_name,
            description_file,
            dimensions_file,
            analysis,
        } => {
            let project = project_dir(&env, cli.project.as_deref())?;
            let task_id = TaskId::parse(&task_id)?;
            let description = read_file(&description_file)?;
            let dimensions = read_file(&dimensions_file)?;
            let analysis = match analysis {
                Some(path) => Some(parse_task_analysis(&read_file(&path)?)?),
                None => None,
            };
            let path = save_task_record(
                &project,
                &task_id,
                &task_name,
                analysis.as_ref(),
                &description,
                &dimensions,
            )?;
            if cli.json {
                print_json(&serde_json::json!({
                    "ok": true,
                    "task_id": task_id,
                    "path": path,
                }))?;
            } else {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
