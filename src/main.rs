//! Genie - personal task assistant
//!
//! CLI entry point: wires the store, clients and pipeline, then dispatches
//! the requested command.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use genied::calendar::GoogleCalendarClient;
use genied::cli::{BackupCommand, Cli, Command};
use genied::config::Config;
use genied::domain::{FeedbackRecord, TaskStatus};
use genied::llm::create_client;
use genied::pipeline::{Pipeline, PipelineOptions};
use genied::prompts::PromptLoader;
use genied::research::PerplexityClient;
use genied::store::{StoreManager, SystemSettings};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genie")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("genied.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

fn spawn_store(config: &Config) -> Result<StoreManager> {
    StoreManager::spawn(
        &config.storage.storage_path,
        &config.storage.backup_dir,
        SystemSettings {
            auto_backup: config.storage.auto_backup,
            backup_retention_days: config.storage.backup_retention_days,
        },
    )
}

fn build_pipeline(config: &Config, store: StoreManager) -> Result<Pipeline> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let research: Arc<dyn genied::research::ResearchClient> =
        Arc::new(PerplexityClient::from_config(&config.research).context("Failed to create research client")?);
    let calendar: Arc<dyn genied::calendar::CalendarClient> =
        Arc::new(GoogleCalendarClient::from_config(&config.calendar).context("Failed to create calendar client")?);
    let prompts = Arc::new(PromptLoader::new("prompts"));

    Ok(Pipeline::new(
        store,
        llm,
        research,
        calendar,
        prompts,
        PipelineOptions {
            overall_deadline: Duration::from_millis(config.pipeline.overall_deadline_ms),
            summary_prefix: config.calendar.summary_prefix.clone(),
        },
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "Genie loaded config: provider={}, model={}, storage={}",
        config.llm.provider,
        config.llm.model,
        config.storage.storage_path.display()
    );

    let store = spawn_store(&config)?;

    match cli.command {
        Command::Utter { user, text } => {
            let pipeline = build_pipeline(&config, store.clone())?;
            let outcome = pipeline.handle_utterance(&user, &text).await?;

            for result in &outcome.applied {
                let marker = if result.ok { "ok" } else { "FAILED" };
                println!("[{}] {}: {}", marker, result.kind, result.message);
            }
            for warning in &outcome.warnings {
                println!("warning: {}", warning);
            }
            if let Some(rec) = &outcome.recommendation {
                print_recommendation(rec);
            }
            if outcome.timed_out {
                println!("note: deadline exceeded, partial result");
            }
        }

        Command::Tasks { user, status } => {
            let status = match status {
                Some(raw) => Some(raw.parse::<TaskStatus>().map_err(|e| eyre::eyre!(e))?),
                None => None,
            };
            // Task queries only need the store
            store.get_or_create_user(&user).await?;
            let tasks = store.list_tasks(&user, status).await?;
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in tasks {
                let deadline = task
                    .deadline
                    .map(|d| format!(" (due {})", d.format("%Y-%m-%d")))
                    .unwrap_or_default();
                println!("{} [{}]{} - {}", task.id, task.status, deadline, task.heading);
                for subtask in &task.subtasks {
                    let scheduled = if subtask.event_id.is_some() { " *scheduled*" } else { "" };
                    println!(
                        "    {} [{}] {} ({}min){}",
                        subtask.id,
                        subtask.status,
                        subtask.heading,
                        subtask.effective_estimate(),
                        scheduled
                    );
                }
            }
        }

        Command::Next { user } => {
            let pipeline = build_pipeline(&config, store.clone())?;
            let rec = pipeline.recommendation(&user).await?;
            print_recommendation(&rec);
        }

        Command::Feedback {
            user,
            kind,
            task,
            subtask,
            actual_minutes,
            difficulty,
            energy,
        } => {
            let kind = kind.parse().map_err(|e: String| eyre::eyre!(e))?;
            let mut record = FeedbackRecord::new(kind);
            if let Some(task) = task {
                record = record.for_task(task.parse().context("invalid task id")?);
            }
            if let Some(subtask) = subtask {
                record = record.for_subtask(subtask.parse().context("invalid subtask id")?);
            }
            if let Some(minutes) = actual_minutes {
                record = record.with_actual_minutes(minutes);
            }
            if let Some(difficulty) = difficulty {
                record = record.with_difficulty(difficulty);
            }
            if let Some(energy) = energy {
                record = record.with_energy(energy);
            }
            store.add_feedback(&user, record).await?;
            println!("feedback recorded");
        }

        Command::Analytics { user } => {
            store.get_or_create_user(&user).await?;
            let view = store.analytics(&user).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }

        Command::Health => {
            let pipeline = build_pipeline(&config, store.clone())?;
            let report = pipeline.health().await;
            for component in &report.components {
                let marker = if component.ok { "ok" } else { "DOWN" };
                println!("[{}] {}: {}", marker, component.name, component.detail);
            }
            if !report.healthy() {
                std::process::exit(1);
            }
        }

        Command::Backup { command } => match command {
            BackupCommand::Create { reason } => {
                let name = store.create_backup(&reason).await?;
                println!("created {}", name);
            }
            BackupCommand::List => {
                for backup in store.list_backups().await? {
                    println!(
                        "{}  {}  {} bytes  ({})",
                        backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                        backup.filename,
                        backup.size,
                        backup.reason
                    );
                }
            }
            BackupCommand::Restore { name } => {
                store.restore_backup(&name).await?;
                println!("restored {}", name);
            }
        },

        Command::Export { user, path } => {
            let export = store.export_user(&user).await?;
            fs::write(&path, serde_json::to_string_pretty(&export)?)
                .context(format!("Failed to write {}", path.display()))?;
            println!("exported {} to {}", user, path.display());
        }

        Command::Import { path } => {
            let raw = fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?;
            let export = serde_json::from_str(&raw).context("Failed to parse export payload")?;
            store.import_user(export).await?;
            println!("imported from {}", path.display());
        }
    }

    store.shutdown().await.ok();
    Ok(())
}

fn print_recommendation(rec: &genied::domain::Recommendation) {
    match (rec.task_id, rec.subtask_id) {
        (Some(task_id), Some(subtask_id)) => {
            println!("next: subtask {} of task {}", subtask_id, task_id);
            println!("  why: {}", rec.reasoning);
            println!("  fit: {}", rec.psychological_fit);
            match &rec.scheduled {
                Some(window) => println!(
                    "  scheduled: {} - {}",
                    window.start.format("%H:%M"),
                    window.end.format("%H:%M")
                ),
                None => println!("  scheduled: no (advisory only)"),
            }
        }
        _ => println!("next: {}", rec.reasoning),
    }
}
