//! The two scheduled jobs and the one-shot commands built on them.
//!
//! | Job | Steps | Default period |
//! |-----|-------|----------------|
//! | [`SyncJob`] | extract → mirror → index new | 60 s, plus once at startup |
//! | [`ReconcileJob`] | diff → patch | 2 days |
//!
//! Jobs never return errors to the scheduler: a failed cycle is logged and
//! the next tick simply tries again.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use article_sync_core::pipeline::{SyncOutcome, SyncReport};
use article_sync_core::reconcile::ReconcileReport;

use crate::config::Config;
use crate::context::SyncContext;
use crate::scheduler::{ScheduledJob, Scheduler, Trigger};

pub struct SyncJob {
    ctx: Arc<SyncContext>,
}

impl SyncJob {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScheduledJob for SyncJob {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn run(&self) {
        tracing::info!("sync cycle started");
        match self.ctx.sync_once().await {
            Ok(SyncOutcome::Empty) => tracing::info!("sync cycle finished; source was empty"),
            Ok(SyncOutcome::Completed(report)) => tracing::info!(
                extracted = report.extracted,
                skipped = report.skipped.len(),
                new = report.new_ids.len(),
                indexed = report.index.indexed,
                index_failures = report.index.failed.len(),
                "sync cycle finished"
            ),
            Err(e) => tracing::error!(error = %e, "sync cycle failed"),
        }
    }
}

pub struct ReconcileJob {
    ctx: Arc<SyncContext>,
}

impl ReconcileJob {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScheduledJob for ReconcileJob {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    async fn run(&self) {
        tracing::info!("reconciliation pass started");
        match self.ctx.reconcile(false).await {
            Ok(report) => tracing::info!(
                examined = report.diff.examined,
                drifted = report.diff.drifts.len(),
                patched = report.patch.as_ref().map(|p| p.patched).unwrap_or(0),
                "reconciliation pass finished"
            ),
            Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
        }
    }
}

/// `artsync sync`
pub async fn run_sync(config: &Config) -> Result<()> {
    let ctx = SyncContext::open(config).await?;
    let result = ctx.sync_once().await;
    ctx.close().await;

    match result? {
        SyncOutcome::Empty => println!("Source returned no articles; nothing to do."),
        SyncOutcome::Completed(report) => print_sync_report(&report),
    }
    Ok(())
}

/// `artsync reconcile [--dry-run]`
pub async fn run_reconcile(config: &Config, dry_run: bool) -> Result<()> {
    let ctx = SyncContext::open(config).await?;
    let result = ctx.reconcile(dry_run).await;
    ctx.close().await;

    print_reconcile_report(&result?, dry_run);
    Ok(())
}

/// `artsync run`: the long-running process.
pub async fn run_scheduler(config: &Config) -> Result<()> {
    let ctx = Arc::new(SyncContext::open(config).await?);
    let schedule = &config.schedule;

    let mut scheduler = Scheduler::new(schedule.poll_interval());
    scheduler.add(
        Trigger::immediate(schedule.sync_interval()),
        Box::new(SyncJob::new(ctx.clone())),
    );
    let reconcile_trigger = if schedule.reconcile_on_startup {
        Trigger::immediate(schedule.reconcile_interval())
    } else {
        Trigger::after(schedule.reconcile_interval())
    };
    scheduler.add(reconcile_trigger, Box::new(ReconcileJob::new(ctx.clone())));

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C; stopping");
            }
        })
        .await;

    drop(scheduler);
    match Arc::try_unwrap(ctx) {
        Ok(ctx) => ctx.close().await,
        Err(_) => tracing::warn!("sync context still shared at shutdown; not closed"),
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!("Sync complete:");
    println!("  extracted:   {}", report.extracted);
    println!("  skipped:     {}", report.skipped.len());
    println!("  mirrored:    {}", report.mirrored);
    println!("  new:         {}", report.new_ids.len());
    println!("  indexed:     {}", report.index.indexed);
    println!("  failed:      {}", report.index.failed.len());
    if !report.skipped.is_empty() {
        println!("  skipped ids (unresolvable category): {:?}", report.skipped);
    }
    if !report.index.failed.is_empty() {
        println!("  failed ids: {:?}", report.index.failed);
    }
}

fn print_reconcile_report(report: &ReconcileReport, dry_run: bool) {
    let diff = &report.diff;
    println!("Reconciliation{}:", if dry_run { " (dry run)" } else { "" });
    println!("  examined:    {}", diff.examined);
    println!("  missing:     {}", diff.missing.len());
    println!("  in sync:     {}", diff.in_sync);
    println!("  drifted:     {}", diff.drifts.len());
    println!("  failed:      {}", diff.failed.len());
    match &report.patch {
        Some(patch) => {
            println!("  patched:     {}", patch.patched);
            println!("  patch failed: {}", patch.failed.len());
        }
        None => {
            for drift in &diff.drifts {
                println!("  {:>10}  {}", drift.source_id, drift.reason);
            }
        }
    }
}
