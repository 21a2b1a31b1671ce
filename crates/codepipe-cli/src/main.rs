//! Codepipe CLI
//!
//! Serves interactive code execution over TCP, or runs a single file locally
//! through the same session machinery.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codepipe::{
    Config, ConnectionId, EXAMPLE_CONFIG, ExitReport, Language, Server, SessionEvent,
    SessionManager,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codepipe")]
#[command(about = "A server for interactive remote code execution")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: codepipe.toml)
        #[arg(short, long, default_value = "codepipe.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Accept clients until interrupted
    Serve {
        /// Address to listen on (overrides the configuration)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Run a file interactively in this terminal
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language (javascript, js, python, py)
        #[arg(short, long)]
        language: String,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Run { source, language } => run_file(config, &source, &language).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.listen = listen;
    }

    let manager = SessionManager::new(config)
        .await
        .context("failed to prepare workspace")?;
    let server = Server::bind(manager)
        .await
        .context("failed to start server")?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("server stopped");
    Ok(())
}

async fn run_file(config: Config, source: &Path, language: &str) -> Result<()> {
    let language = SessionManager::parse_language(language)?;
    let source = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let manager = SessionManager::new(config)
        .await
        .context("failed to prepare workspace")?;
    let connection = ConnectionId::new();
    let (sink, mut events) = mpsc::unbounded_channel();

    info!(%language, "running program");
    manager
        .run(&connection, language, &source, sink)
        .await
        .context("execution failed")?;

    // Terminal lines become program input
    let input_manager = manager.clone();
    let input_connection = connection.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(mut line)) = lines.next_line().await {
            line.push('\n');
            input_manager.send_input(&input_connection, line);
        }
    });

    // The channel closes once the session is cleaned up
    let mut stdout = std::io::stdout();
    let mut report = None;
    while let Some(event) = events.recv().await {
        if let SessionEvent::Output(text) = event {
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            // The status line is the last chunk of a session
            report = ExitReport::from_status_line(&text);
        }
    }

    let code = report.map_or(1, |report| report.shell_code());
    debug!(code, "program finished");

    // The stdin reader may still be parked on a blocking read
    std::process::exit(code);
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for language in Language::ALL {
        match config.launch_config(language) {
            Ok(launch) => println!(
                "  {:<12} {} ({})",
                language.id(),
                launch.name,
                launch.command.join(" ")
            ),
            Err(_) => println!("  {:<12} (not configured)", language.id()),
        }
    }
}

fn show_config(config: &Config) {
    println!("Listen address: {}", config.listen);
    println!("Workspace: {}", config.workspace_dir.display());
    println!("Channel capacity: {}", config.channel_capacity);
    println!();
    println!("Languages configured: {}", config.languages.len());

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);
    for (id, launch) in languages {
        println!(
            "  {id}: .{} -> {}",
            launch.extension,
            launch.command.join(" ")
        );
        for (key, value) in &launch.env {
            println!("    {key}={value}");
        }
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
