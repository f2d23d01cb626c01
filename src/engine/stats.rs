use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::repositories::{LogRepository, StatsRepository};

/// Rebuilds the hourly stats table from scratch by replaying the full event
/// log through the same upsert the dispatcher uses per outcome. Because the
/// upsert is a pure fold over log rows, the rebuilt table matches whatever
/// incremental updates produced.
pub async fn rebuild(pool: &PgPool) -> Result<u64> {
    let stats = StatsRepository::new(pool);
    let logs = LogRepository::new(pool).list_all().await?;

    stats.truncate().await?;
    for log in &logs {
        stats.record(log).await?;
    }

    info!("Rebuilt queue stats from {} log row(s)", logs.len());

    Ok(logs.len() as u64)
}
