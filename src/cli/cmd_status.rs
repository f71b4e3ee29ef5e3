use anyhow::Result;
use clap::Args;
use profilesync::{constants, JsonStore, ProfileStore};
use std::path::PathBuf;

#[derive(Args)]
pub struct StatusCommand {
    /// Store file
    #[arg(short, long, default_value = "profilesync.json")]
    pub store: PathBuf,
}

pub fn run(cmd: StatusCommand) -> Result<()> {
    tokio::runtime::Runtime::new()?.block_on(async {
        let store = JsonStore::open(&cmd.store)?;

        println!("Store: {}", cmd.store.display());
        println!();

        let names = store.table_names();
        if names.is_empty() {
            println!("(empty store)");
            return Ok(());
        }

        println!("Tables:");
        for name in &names {
            println!("  {:<16} {} row(s)", name, store.row_count(name));
        }

        let dashboard = store.read_all(constants::DASHBOARD_TABLE).await?;
        if !dashboard.is_empty() {
            println!();
            println!("Dashboard:");
            for row in dashboard {
                let name = row.first().map(String::as_str).unwrap_or("");
                let value = row.get(1).map(String::as_str).unwrap_or("");
                println!("  {:<20} {}", name, value);
            }
        }

        Ok(())
    })
}
