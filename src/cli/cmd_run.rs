use anyhow::Result;
use clap::Args;
use profilesync::{
    CliLogger, JsonStore, JsonlSource, Schema, SyncConfig, SyncEngine, UpdatePlacement,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct RunCommand {
    /// Capture file: one JSON profile object per line
    pub capture: PathBuf,

    /// Store file
    #[arg(short, long, default_value = "profilesync.json")]
    pub store: PathBuf,

    /// Maximum records to process (0 = all)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Update existing rows in place instead of moving them to the head
    #[arg(long)]
    pub in_place: bool,

    /// Source tag recorded in timing rows
    #[arg(long, default_value = "Online")]
    pub source: String,

    /// Lower pacing bound between store writes (seconds)
    #[arg(long, default_value = "1.0")]
    pub min_delay: f64,

    /// Upper pacing bound between store writes (seconds)
    #[arg(long, default_value = "2.0")]
    pub max_delay: f64,
}

pub fn run(cmd: RunCommand, verbose: bool, quiet: bool) -> Result<()> {
    tokio::runtime::Runtime::new()?.block_on(async {
        if !quiet {
            println!("Store:   {}", cmd.store.display());
            println!("Capture: {}", cmd.capture.display());
            println!();
        }

        let schema = Schema::profile_default();
        let store = Arc::new(JsonStore::open(&cmd.store)?);
        let mut source = JsonlSource::open(&cmd.capture, schema.clone())?;

        let config = SyncConfig {
            max_records: cmd.limit,
            placement: if cmd.in_place {
                UpdatePlacement::InPlace
            } else {
                UpdatePlacement::MoveToHead
            },
            source_tag: cmd.source.clone(),
            base_min_delay: cmd.min_delay,
            base_max_delay: cmd.max_delay,
            ..SyncConfig::default()
        };

        let mut engine =
            SyncEngine::new(store, schema, config).with_logger(CliLogger::new(verbose));
        let stats = engine.run(&mut source).await?;

        if !quiet {
            println!();
            println!(
                "✓ Run {} complete: {} processed, {} new, {} updated, {} unchanged, {} failed",
                stats.run_number,
                stats.processed,
                stats.new_profiles,
                stats.updated,
                stats.unchanged,
                stats.failed
            );
        }
        Ok(())
    })
}
