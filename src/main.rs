//! sliceflow - Main Entry Point
//!
//! Loads a toolbox configuration, wires the processor graph and runs it to
//! completion. Ctrl-C requests cancellation.
//!
//! ```bash
//! sliceflow pipeline.toml
//! sliceflow pipeline.toml --log-file run.log
//! sliceflow --list-processors
//! ```

use clap::Parser;
use sliceflow::{
    config::ToolboxConfig,
    error::{Error, Result, ResultExt},
    pipeline::Toolbox,
    processors,
    registry::ProcessorRegistry,
    types::RunStatus,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sliceflow")]
#[command(about = "Run a slice processing pipeline from a configuration file", long_about = None)]
struct Cli {
    /// Pipeline configuration (.toml or .json)
    #[arg(required_unless_present = "list_processors")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List registered processor types and their ports, then exit
    #[arg(long)]
    list_processors: bool,
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sliceflow=debug"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&directory)
                .with_context(|| format!("creating log directory {}", directory.display()))?;
            let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| "sliceflow.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn list_processors(registry: &ProcessorRegistry) -> Result<()> {
    for key in registry.keys() {
        let processor = registry.create(key)?;
        println!("{} ({:?})", key, processor.role());
        for port in processor.ports().descriptors() {
            println!("    {}", port);
        }
    }
    Ok(())
}

fn run(config_path: &Path, registry: ProcessorRegistry) -> Result<RunStatus> {
    let config = ToolboxConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let mut toolbox = Toolbox::from_config(Arc::new(registry), &config)?;

    let token = toolbox.cancel_token();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupt received; cancelling run");
        token.cancel();
    })
    .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    Ok(toolbox.run()?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut registry = ProcessorRegistry::new("processor");
    if let Err(e) = processors::register_builtin(&mut registry) {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }

    if cli.list_processors {
        return match list_processors(&registry) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(config_path) = cli.config else {
        tracing::error!("No configuration file given");
        return ExitCode::FAILURE;
    };

    tracing::info!("Starting sliceflow with {:?}", config_path);
    match run(&config_path, registry) {
        Ok(RunStatus::Completed) => {
            tracing::info!("Run completed");
            ExitCode::SUCCESS
        }
        Ok(RunStatus::Aborted(reason)) => {
            tracing::error!("{}", Error::Aborted(reason));
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
