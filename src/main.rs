use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;
use visionloop::app::{RunOverrides, run_classify, run_pipeline};
use visionloop::cli::{Cli, Commands, ConfigAction};
use visionloop::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);
    tracing::debug!(
        "visionloop {} (inference backend: {})",
        visionloop::version_string(),
        visionloop::defaults::inference_backend()
    );

    let overrides = RunOverrides {
        model: cli.model,
        labels: cli.labels,
        threshold: cli.threshold,
        width: cli.width,
        height: cli.height,
        image: cli.image,
        report_endpoint: cli.report_endpoint,
        no_report: cli.no_report,
        status: cli.status,
    };

    match cli.command {
        None => {
            let config = overrides.apply(load_config(cli.config.as_deref())?);
            run_pipeline(config).await?;
        }
        Some(Commands::Classify { image, report }) => {
            let config = overrides.apply(load_config(cli.config.as_deref())?);
            let prediction = run_classify(config, &image, report).await?;
            let line = prediction.status_text();
            if std::io::stdout().is_terminal() {
                if prediction.is_no_prediction() {
                    println!("{}", line.dimmed());
                } else {
                    println!("{}", line.green());
                }
            } else {
                println!("{line}");
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "visionloop",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the -q/-v flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("visionloop={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/visionloop/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            let toml = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{toml}");
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
