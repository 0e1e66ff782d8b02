// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines the export and convert subcommands and global flags

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "penzu-export")]
#[command(about = "Export a Penzu journal from a logged-in browser and convert it to ENEX", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory receiving exported-entries/, the JSON checkpoint and the ENEX file
    #[arg(long, global = true, default_value = ".")]
    pub out_dir: PathBuf,

    /// Chrome remote debugging port
    #[arg(long, global = true, default_value_t = 9222)]
    pub debug_port: u16,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Walk the journal from the newest entry backwards (default)
    Export {
        /// Journal ID (overrides the one in the browser URL)
        #[arg(long)]
        journal_id: Option<String>,

        /// Entry to start from (overrides the browser URL and latest-entry lookup)
        #[arg(long)]
        entry_id: Option<String>,
    },

    /// Convert the JSON checkpoint into an ENEX file
    Convert,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Export {
            journal_id: None,
            entry_id: None,
        })
    }
}
