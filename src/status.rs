//! `artsync status`: row and entity counts.
//!
//! The two numbers should match once every cycle has caught up. A lower
//! index count means records still waiting for (or failing) first-time
//! indexing; a higher one means duplicate index entries.

use anyhow::Result;

use crate::config::Config;
use crate::context::SyncContext;

pub async fn run_status(config: &Config) -> Result<()> {
    let ctx = SyncContext::open(config).await?;
    let mirror = ctx.mirror.count().await;
    let index = ctx.index.count().await;
    ctx.close().await;

    let mirror = mirror?;
    let index = index?;

    println!("article-sync status");
    println!("===================");
    println!();
    println!("  Mirror:      {} ({} rows)", config.mirror_table(), mirror);
    println!(
        "  Index:       {} ({} entities)",
        config.index.collection, index
    );
    println!("  Difference:  {}", describe_gap(mirror, index));
    Ok(())
}

fn describe_gap(mirror: i64, index: i64) -> String {
    match index - mirror {
        0 => "none".to_string(),
        d if d < 0 => format!("{} rows not yet indexed", -d),
        d => format!("{} more index entities than mirror rows", d),
    }
}
