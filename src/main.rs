// ABOUTME: CLI entrypoint for penzu-export command
// ABOUTME: Handles logging setup, error exit codes and command dispatch

use clap::Parser;
use penzu_export::{
    api::PenzuClient,
    cli::{Cli, Commands},
    config::ExportConfig,
    enex::Transcoder,
    export::Exporter,
    session::SessionContext,
    storage::{load_checkpoint, Paths},
    Result,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("penzu-export: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ExportConfig::default().with_debug_port(cli.debug_port);
    let paths = Paths::new(&cli.out_dir);

    match cli.command() {
        Commands::Export {
            journal_id,
            entry_id,
        } => {
            let session =
                SessionContext::from_browser(&config)?.with_overrides(journal_id, entry_id);
            let client = PenzuClient::new(config, session)?;
            let summary = Exporter::new(&client, &paths).run()?;
            println!(
                "Exported {} entries to {}",
                summary.entries.len(),
                paths.export_dir.display()
            );
        }
        Commands::Convert => {
            let entries = load_checkpoint(&paths.checkpoint_path)?;
            info!(entries = entries.len(), "Loaded checkpoint");
            Transcoder::new(&paths.export_dir).write(
                &paths.enex_path,
                &entries,
                &chrono::Utc::now(),
            )?;
            println!(
                "Created {} with {} entries",
                paths.enex_path.display(),
                entries.len()
            );
        }
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
