use anyhow::Result;
use clap::Parser;
use linkup::{
    constants::MATCHMAKER_POLL_INTERVAL,
    db::{DatabaseConfig, get_db_pool},
    services::matchmaker::run_matchmaker_once,
    store::PgStore,
    utils::init_logging,
};
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(about = "Pairs compatible searching requests into active connections")]
struct Args {
    /// Seconds between matchmaking sweeps.
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let interval = args
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or(MATCHMAKER_POLL_INTERVAL);

    info!("🔗 Starting Linkup Matchmaker...");

    // Connect to database
    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;
    let store = PgStore::new(pool);

    run_matchmaker(store, interval).await
}

async fn run_matchmaker(store: PgStore, poll_interval: Duration) -> Result<()> {
    let mut interval = time::interval(poll_interval);
    let mut iter_count: usize = 0;

    loop {
        interval.tick().await;
        iter_count += 1;

        match run_matchmaker_once(&store).await {
            Ok(created) => {
                if created > 0 {
                    info!("🎯 Created {} connections this sweep", created);
                } else if iter_count % 12 == 0 {
                    // Log every minute when nothing is pairing up
                    info!("📊 No compatible searching requests found");
                }
            }
            Err(e) => {
                error!("❌ Matchmaker sweep failed: {}", e);
            }
        }
    }
}
