//! CropBot - crop disease diagnosis conversations
//!
//! CLI entry point for interactive chat and one-shot commands.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use cropbot::cli::{Cli, Command, DiagnoseArgs, OutputFormat, generate_after_help};
use cropbot::config::Config;
use cropbot::domain::DiagnosisResponse;
use cropbot::engine::ConversationEngine;
use cropbot::llm::create_client;
use cropbot::repl;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cropbot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
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

    let log_file = fs::File::create(log_dir.join("cropbot.log")).context("Failed to create log file")?;

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
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // A missing .env is normal; the key may already be in the environment
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("{} Ignoring unreadable .env file: {}", "warning:".yellow(), e);
    }

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "CropBot loaded config");

    let llm = create_client(&config.llm).map_err(|e| eyre::eyre!("Failed to create LLM client: {}", e))?;
    let engine = Arc::new(ConversationEngine::from_config(&config, llm));

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Chat { session }) => repl::run_interactive(engine, session).await,
        Some(Command::Diagnose(args)) => cmd_diagnose(&engine, &args).await,
        Some(Command::Advise { question, format }) => cmd_advise(&engine, question.as_deref(), format).await,
        Some(Command::Ping) => cmd_ping(&engine).await,
        None => {
            debug!("main: no command specified, launching chat");
            repl::run_interactive(engine, None).await
        }
    }
}

/// Run one diagnosis turn and print the result
async fn cmd_diagnose(engine: &ConversationEngine, args: &DiagnoseArgs) -> Result<()> {
    debug!(?args, "cmd_diagnose: called");
    let request = args.to_request()?;
    let response = engine.diagnose(request).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text => print_diagnosis(&response),
    }
    Ok(())
}

fn print_diagnosis(response: &DiagnosisResponse) {
    println!("{}", response.response);
    println!();
    if let Some(name) = &response.disease_name {
        println!("Disease:    {}", name);
    }
    if let Some(confidence) = response.confidence {
        println!("Confidence: {:.2}", confidence);
    }
    println!("Session:    {}", response.session_id);
}

/// Field advice for the configured location
async fn cmd_advise(engine: &ConversationEngine, question: Option<&str>, format: OutputFormat) -> Result<()> {
    debug!(?question, %format, "cmd_advise: called");
    let advice = engine.advise(question).await?;

    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({ "question": question, "response": advice });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => println!("{}", advice),
    }
    Ok(())
}

/// Check the model answers
async fn cmd_ping(engine: &ConversationEngine) -> Result<()> {
    debug!("cmd_ping: called");
    let reply = engine.ping().await?;
    println!("Model {} is reachable", engine.model());
    println!("{}", reply);
    Ok(())
}
