use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use hasher_cli::commands;
use hasher_cli::config::{self, AppPaths};
use hasher_cli::training::HashMethod;
use hasher_cli::tui;

/// HASHER - distributed training pipeline with evolutionary seed search
#[derive(Parser)]
#[command(name = "hasher")]
#[command(about = "Training pipeline orchestrator with ASIC-backed seed search")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full training workflow headless
    RunWorkflow {
        /// Pipeline mode: goat, arxiv or demo (default from DATAMINER_MODE)
        #[arg(long)]
        pipeline: Option<String>,
    },
    /// Validate the workflow configuration without launching stages
    TestWorkflow,
    /// Run seed training with the batch-optimized hash backend
    RunOptimized {
        #[arg(long, default_value_t = 1)]
        epochs: u32,
    },
    /// Run seed training, reporting ASIC host availability first
    RunHybrid {
        #[arg(long, default_value_t = 1)]
        epochs: u32,
    },
    /// Launch the interactive terminal UI
    Run,
    /// List pipeline and training modes
    ListModes,
    /// Stage workflow binaries into app-data
    Build,
    /// Report the presence of stage binaries and native libraries
    Deps,
    /// Remove logs, staged binaries and the port advertisement
    Clean,
    /// Terminate the host service and stage processes
    Kill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::resolve()?;
    paths.ensure()?;
    // the TUI owns the terminal, so its session logs to a file
    let log_to_file = matches!(cli.command, Commands::Run);
    config::init_logging(&paths, log_to_file)?;

    if cli.verbose {
        info!("verbose mode enabled");
    }
    if let Some(term) = config::term_emulator() {
        info!(term = %term, "terminal emulator override");
    }

    match cli.command {
        Commands::RunWorkflow { pipeline } => {
            commands::workflow::run_workflow(&paths, pipeline).await
        }
        Commands::TestWorkflow => commands::workflow::test_workflow(&paths).await,
        Commands::RunOptimized { epochs } => {
            commands::training::run_training(&paths, HashMethod::Optimized, epochs, cli.verbose)
                .await
        }
        Commands::RunHybrid { epochs } => {
            commands::training::run_hybrid(&paths, epochs, cli.verbose).await
        }
        Commands::Run => tui::run_tui(paths).await,
        Commands::ListModes => {
            commands::modes::list_modes();
            Ok(())
        }
        Commands::Build => commands::maintenance::build(&paths),
        Commands::Deps => commands::maintenance::deps(&paths),
        Commands::Clean => commands::maintenance::clean(&paths),
        Commands::Kill => commands::maintenance::kill(),
    }
}
