//! jimaku - translated subtitles for video files
//!
//! Entry point: parses the command line, sets up logging, resolves the
//! configuration and hands off to the workflow.

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use jimaku::cli::{Args, Commands};
use jimaku::config::{Config, WorkflowKind};
use jimaku::workflow::Workflow;

const LOG_FILE: &str = "jimaku.log";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting jimaku - subtitle translation pipeline");

    let mut config = Config::load_or_default(args.config.as_deref())?;

    match args.command {
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("Default configuration written to {}", output.display());
        }
        Commands::Process { input, overrides } => {
            overrides.apply(&mut config);
            let workflow = Workflow::new(config)?;
            workflow.check_dependencies().await?;

            let srt_path = workflow.process_single_file(&input, None).await?;
            println!("Subtitles written to {}", srt_path.display());
        }
        Commands::Batch { input_dir, overrides } => {
            overrides.apply(&mut config);
            let workflow = Workflow::new(config)?;
            workflow.check_dependencies().await?;

            let report = workflow.process_directory(&input_dir, None).await?;
            println!("Processed {} files", report.written.len());
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input);
            let workflow = Workflow::new(config)?;
            workflow.extract_audio(&input, &output).await?;
        }
        Commands::Transcribe {
            input,
            output,
            language,
        } => {
            info!("Transcribing: {}", input);
            if language.is_some() {
                config.transcriber.language = language;
            }
            config.output.workflow = WorkflowKind::Transcribe;
            let workflow = Workflow::new(config)?;
            workflow.transcribe(&input, &output).await?;
        }
    }

    info!("jimaku completed successfully");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".jimaku").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive every log call
    let file_appender = rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join(LOG_FILE).display()
    );

    Ok(())
}
