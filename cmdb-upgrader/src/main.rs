//! CMDB upgrade entry point
//!
//! Opens the document store named by the environment and applies every
//! pending upgrade step. Ctrl-C cancels the run; the step in flight stops at
//! its next storage call.

use cmdb_core::{CmdbResult, StoreConfig, UpgradeConfig, UpgradeContext};
use cmdb_storage::LmdbRdb;
use cmdb_upgrader::{init_logging, LogConfig, Upgrader};

#[tokio::main]
async fn main() -> CmdbResult<()> {
    let log_config = LogConfig::from_env()?;
    init_logging(&log_config)?;

    let upgrade_config = UpgradeConfig::from_env()?;
    let store_config = StoreConfig::from_env()?;
    let db = LmdbRdb::from_config(&store_config)?;

    let (ctx, cancel) = UpgradeContext::cancellable();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Shutdown signal received, cancelling upgrade");
            cancel.cancel();
        }
    });

    tracing::info!(
        run_id = %ctx.run_id(),
        store = %store_config.path.display(),
        owner_id = %upgrade_config.owner_id,
        "Starting CMDB upgrade"
    );

    let upgrader = Upgrader::<LmdbRdb>::with_default_steps();
    let report = upgrader.run(&ctx, &db, &upgrade_config).await?;

    tracing::info!(
        applied = ?report.applied,
        skipped = ?report.skipped,
        "CMDB upgrade finished"
    );
    Ok(())
}
