//! `artsync inspect <id>`: one record across the mirror and the index.

use anyhow::{bail, Result};
use article_sync_core::reconcile::{check_record, Check};

use crate::config::Config;
use crate::context::SyncContext;

pub async fn run_inspect(config: &Config, id: i64) -> Result<()> {
    let ctx = SyncContext::open(config).await?;
    let result = inspect(&ctx, id).await;
    ctx.close().await;
    result
}

async fn inspect(ctx: &SyncContext, id: i64) -> Result<()> {
    let Some(rec) = ctx.mirror.fetch_one(id).await? else {
        bail!("record not found in mirror: {}", id);
    };

    println!("--- Mirror ---");
    println!("id:           {}", rec.id);
    println!("title:        {}", rec.title.as_deref().unwrap_or("(untitled)"));
    println!("link:         {}", rec.link.as_deref().unwrap_or(""));
    if let Some(ref category) = rec.category_name {
        println!("category:     {}", category);
    }
    if let Some(ref author) = rec.author {
        println!("author:       {}", author);
    }
    if let Some(ts) = rec.updated_at {
        println!("updated_at:   {}", ts.to_rfc3339());
    }
    println!("related:      {}", rec.related.len());
    println!();

    println!("--- Index ---");
    match ctx.index.lookup_by_source_id(id).await? {
        Some(doc) => {
            println!(
                "pk:           {}",
                doc.pk.map(|pk| pk.to_string()).unwrap_or_default()
            );
            println!("text:         {} chars", doc.text.chars().count());
        }
        None => println!("(not indexed)"),
    }
    println!();

    let status = match check_record(ctx.index.as_ref(), &ctx.renderer, &rec).await? {
        Check::Missing => "missing from index".to_string(),
        Check::InSync => "in sync".to_string(),
        Check::Drifted(drift) => format!("drifted ({})", drift.reason),
    };
    println!("status:       {}", status);
    Ok(())
}
