use anyhow::Result;
use clap::{Parser, Subcommand};

// CLI Commands (cmd_ prefix)
mod cmd_run;
mod cmd_status;

// Helper modules (no cmd_ prefix)
mod logger;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(bin_name = "profilesync")]
#[command(version = VERSION)]
#[command(about = concat!(
    "profilesync v",
    env!("CARGO_PKG_VERSION"),
    " - reconcile profile snapshot captures into a tabular store"
))]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass from a capture file
    Run(cmd_run::RunCommand),

    /// Show a summary of the store's tables
    Status(cmd_status::StatusCommand),
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(cmd) => cmd_run::run(cmd, cli.verbose, cli.quiet),
        Commands::Status(cmd) => cmd_status::run(cmd),
    }
}
