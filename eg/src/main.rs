//! eg - exgen command-line entry point

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::mpsc;
use tracing::{debug, info};

use exgen::agent::{AgentEvent, EventSink};
use exgen::cli::{Cli, Command, ExerciseCommand, OutputFormat};
use exgen::config::Config;
use exgen::domain::GenerationStatus;
use exgen::guard::Namespace;
use exgen::llm::Message;
use exgen::server;
use exgen::service::{GenerationService, TurnOutcome};
use exgen::snapshot::{DiskSnapshots, extract_or_empty};
use exgen::state::StateManager;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("exgen")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("exgen.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching");
    match cli.command {
        Command::Serve { bind, port } => cmd_serve(config, bind, port).await,
        Command::Submit { slug, prompt } => cmd_submit(&config, &slug, &prompt).await,
        Command::Exercise { command } => cmd_exercise(&config, command).await,
        Command::History { slug, format } => cmd_history(&config, &slug, format).await,
        Command::Show { slug, generation, path } => {
            cmd_show(&config, &slug, generation.as_deref(), path.as_deref()).await
        }
    }
}

async fn cmd_serve(mut config: Config, bind: Option<String>, port: Option<u16>) -> Result<()> {
    config.validate()?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let service = Arc::new(GenerationService::from_config(&config)?);
    println!("{} listening on http://{}", "exgen".bold(), config.server.address());
    server::serve(service, &config.server).await
}

async fn cmd_submit(config: &Config, slug: &str, prompt: &str) -> Result<()> {
    config.validate()?;
    let service = GenerationService::from_config(config)?;

    let (tx, mut rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let result = service
        .submit(slug, vec![Message::user(prompt)], &EventSink::new(tx))
        .await;
    let _ = printer.await;

    let report = result.context("Turn failed")?;
    println!();
    match report.outcome {
        TurnOutcome::Completed { snapshot_ref, summary } => {
            println!("{} {}", "Completed".green().bold(), summary);
            println!("  snapshot: {}", snapshot_ref);
        }
        TurnOutcome::AwaitingInput { .. } => {
            println!("{}", "Waiting for your reply (generation still open)".yellow());
        }
        TurnOutcome::Failed { reason } => {
            println!("{} {}", "Failed".red().bold(), reason);
        }
    }
    println!(
        "  generation {} (seq {}), {} capability call(s), {} model turn(s)",
        report.generation.id,
        report.generation.seq,
        report.call_log.len(),
        report.stats.turns
    );
    Ok(())
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Started { seq, created, .. } => {
            let verb = if *created { "Opened" } else { "Continuing" };
            println!("{} generation {}", verb.cyan(), seq);
        }
        AgentEvent::Text { text } => print!("{}", text),
        AgentEvent::CapabilityCalled { name, .. } => println!("\n{} {}", "→".dimmed(), name.bold()),
        AgentEvent::CapabilityResult { name, is_error, .. } => {
            if *is_error {
                println!("  {} {}", name, "error".red());
            }
        }
        AgentEvent::Error { message } => println!("{} {}", "Error:".red().bold(), message),
        AgentEvent::Completed { .. } | AgentEvent::Failed { .. } | AgentEvent::AwaitingInput { .. } => {}
    }
}

async fn cmd_exercise(config: &Config, command: ExerciseCommand) -> Result<()> {
    let state = StateManager::spawn(config.storage.database_path())?;

    match command {
        ExerciseCommand::Add { slug, title } => {
            let title = title.unwrap_or_else(|| slug.clone());
            let exercise = state.create_exercise(&slug, &title).await?;
            println!("{} {} ({})", "Added".green(), exercise.slug.bold(), exercise.id);
            println!("  files: {}", Namespace::for_exercise(&exercise.slug));
        }
        ExerciseCommand::List { format } => {
            let exercises = state.list_exercises().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&exercises)?),
                OutputFormat::Text if exercises.is_empty() => println!("No exercises registered"),
                OutputFormat::Text => {
                    for exercise in exercises {
                        println!("{:<32} {}", exercise.slug.bold(), exercise.title);
                    }
                }
            }
        }
    }

    state.shutdown().await?;
    Ok(())
}

async fn cmd_history(config: &Config, slug: &str, format: OutputFormat) -> Result<()> {
    let state = StateManager::spawn(config.storage.database_path())?;
    let exercise = state.get_exercise_required(slug).await?;
    let generations = state.list_generations(&exercise.id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&generations)?),
        OutputFormat::Text if generations.is_empty() => println!("No generations for {}", slug),
        OutputFormat::Text => {
            for g in &generations {
                let status = match g.status {
                    GenerationStatus::Generating => g.status.as_str().yellow(),
                    GenerationStatus::Completed => g.status.as_str().green(),
                    GenerationStatus::Failed => g.status.as_str().red(),
                };
                println!(
                    "{:>3}  {:<10}  {}  {}",
                    g.seq,
                    status,
                    g.created_at.format("%Y-%m-%d %H:%M"),
                    g.snapshot_ref.as_deref().unwrap_or("-")
                );
                println!("     {}", g.prompt.lines().next().unwrap_or_default().dimmed());
                if let Some(failure) = &g.failure {
                    println!("     {}", failure.red());
                }
            }
        }
    }

    state.shutdown().await?;
    Ok(())
}

async fn cmd_show(config: &Config, slug: &str, generation: Option<&str>, path: Option<&str>) -> Result<()> {
    let state = StateManager::spawn(config.storage.database_path())?;
    let snapshots = DiskSnapshots::open(config.storage.snapshot_dir())?;
    let exercise = state.get_exercise_required(slug).await?;

    let snapshot_ref = match generation {
        Some(id) => state
            .get_generation(id)
            .await?
            .filter(|g| g.exercise_id == exercise.id)
            .ok_or_else(|| eyre!("Generation {} not found for {}", id, slug))?
            .snapshot_ref
            .ok_or_else(|| eyre!("Generation {} has no snapshot", id))?,
        None => state
            .latest_snapshot_ref(&exercise.id)
            .await?
            .ok_or_else(|| eyre!("{} has no completed generation", slug))?,
    };

    let namespace = Namespace::for_exercise(slug);
    let mut files = extract_or_empty(&snapshots, Some(&snapshot_ref)).await?;
    if let Some(path) = path {
        let relative = namespace
            .to_relative(path)
            .ok_or_else(|| eyre!("{} is outside {}", path, namespace))?;
        files.retain(|f| f.path == relative);
        if files.is_empty() {
            return Err(eyre!("File not found in snapshot: {}", path));
        }
    }

    for file in files {
        println!("{}", format!("==> {} <==", namespace.to_repo_path(&file.path)).bold());
        println!("{}", file.content);
    }

    state.shutdown().await?;
    Ok(())
}
