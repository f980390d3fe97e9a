//! Harvest command handlers.
//!
//! Each handler turns persisted rows into targets, runs them through one
//! worker pool and records the whole batch as a collection run. Single
//! target failures are reported and counted; the run only fails when every
//! target failed.

use std::sync::Arc;

use clap::Subcommand;

use hvst_core::{AppConfig, HarvestTarget, TargetKind, TargetReport};
use hvst_scraper::{
    BrowserProfile, ChromiumLauncher, HarvestOrchestrator, HarvestSettings, HumanDelay,
    SelectorTable, SessionFactory, WorkerPool,
};

/// Sub-commands available under `harvest`.
#[derive(Debug, Subcommand)]
pub enum HarvestCommands {
    /// Harvest merchants from the persisted category listings
    Merchants {
        /// Restrict to one category (by slug)
        #[arg(long)]
        category: Option<String>,
        /// Harvest at most this many categories
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Harvest menus of persisted merchants, best rated first
    Items {
        /// Maximum number of merchants to visit
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

/// Builds the browser-backed pool used by every harvest command.
async fn build_worker_pool(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<WorkerPool> {
    let table = SelectorTable::load(config.selectors_path.as_deref()).await?;
    let sessions = SessionFactory::new(
        Arc::new(ChromiumLauncher::from_app_config(config)),
        BrowserProfile::default(),
        HumanDelay::from_app_config(config),
    );
    let orchestrator = HarvestOrchestrator::new(
        Arc::new(sessions),
        Arc::new(hvst_db::PgIdentityStore::new(pool.clone())),
        Arc::new(table),
        HarvestSettings::from_app_config(config),
    )?;
    Ok(WorkerPool::new(Arc::new(orchestrator), config.workers))
}

/// Listing page that exposes the category tiles once a location is set.
fn category_index_url(base_url: &str) -> String {
    format!("{}/restaurantes", base_url.trim_end_matches('/'))
}

/// Harvests the category index of the configured city.
///
/// # Errors
///
/// Returns an error if the collection run cannot be recorded or the
/// category index target fails.
pub(crate) async fn run_discover(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let target = HarvestTarget::new(
        TargetKind::Category,
        category_index_url(&config.base_url),
        format!("Categorias {}", config.city),
        config.city.clone(),
    );
    run_targets(pool, config, "categories", vec![target]).await
}

/// Harvests merchants for every persisted category of the configured city,
/// or for the one named by `category`.
///
/// # Errors
///
/// Returns an error if `category` is unknown, the collection run cannot be
/// recorded, or every target failed.
pub(crate) async fn run_harvest_merchants(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    category: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let categories = hvst_db::list_categories(pool, &config.city, category).await?;
    if let (Some(slug), true) = (category, categories.is_empty()) {
        anyhow::bail!("category '{slug}' not found for {}; run `discover` first", config.city);
    }

    let targets: Vec<HarvestTarget> = categories
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|c| {
            HarvestTarget::new(TargetKind::RestaurantList, c.url, c.name, c.city).with_parent(c.id)
        })
        .collect();
    run_targets(pool, config, "merchants", targets).await
}

/// Harvests the menus of up to `limit` persisted merchants.
///
/// # Errors
///
/// Returns an error if the collection run cannot be recorded or every
/// target failed.
pub(crate) async fn run_harvest_items(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    limit: i64,
) -> anyhow::Result<()> {
    let merchants = hvst_db::list_merchants(pool, &config.city, limit).await?;
    let targets: Vec<HarvestTarget> = merchants
        .into_iter()
        .filter_map(|m| {
            let url = m.url?;
            Some(HarvestTarget::new(TargetKind::ProductList, url, m.name, m.city).with_parent(m.id))
        })
        .collect();
    run_targets(pool, config, "items", targets).await
}

/// Runs `targets` as one collection run (create, start, harvest, then
/// complete or fail).
async fn run_targets(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    run_type: &'static str,
    targets: Vec<HarvestTarget>,
) -> anyhow::Result<()> {
    if targets.is_empty() {
        println!("nothing to harvest for {run_type}");
        return Ok(());
    }

    let workers = build_worker_pool(pool, config).await?;
    let target_count = i32::try_from(targets.len()).unwrap_or(i32::MAX);
    let run = hvst_db::create_collection_run(pool, run_type, "cli", target_count).await?;
    if let Err(e) = hvst_db::start_collection_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, run_type, format!("{e:#}")).await;
        return Err(e.into());
    }

    let total = targets.len();
    let mut done = 0usize;
    let outcome = workers
        .run(&targets, |report| {
            done += 1;
            println!("[{done}/{total}] {}", progress_line(report));
        })
        .await;
    let summary = outcome.summary;

    println!(
        "{run_type}: {} targets, {} succeeded, {} failed, {} records ({} new, {} duplicates) in {:.1}s",
        summary.processed,
        summary.succeeded,
        summary.failed,
        summary.total_records,
        summary.total_new,
        summary.total_duplicates,
        summary.duration.as_secs_f64()
    );

    if summary.failed == summary.processed {
        let message = format!("all {} {run_type} targets failed", summary.failed);
        fail_run_best_effort(pool, run.id, run_type, message.clone()).await;
        anyhow::bail!("{message}");
    }

    let records = i32::try_from(summary.total_records).unwrap_or(i32::MAX);
    if let Err(err) = hvst_db::complete_collection_run(pool, run.id, records).await {
        fail_run_best_effort(pool, run.id, run_type, format!("{err:#}")).await;
        return Err(err.into());
    }
    Ok(())
}

fn progress_line(report: &TargetReport) -> String {
    let stats = &report.stats;
    match &stats.failure {
        None => format!(
            "{}: {}/{} records ({} new, {} price changes)",
            report.target.display_name, stats.success, stats.total, stats.new, stats.price_changes
        ),
        Some(failure) => {
            let mut line = format!(
                "{}: failed ({}): {}",
                report.target.display_name, failure.kind, failure.message
            );
            if let Some(path) = failure
                .diagnostics
                .as_ref()
                .and_then(|d| d.screenshot_path.as_ref())
            {
                line.push_str(&format!(" [screenshot: {}]", path.display()));
            }
            line
        }
    }
}

/// Attempt to mark a collection run as failed, logging any secondary error.
async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    context: &'static str,
    message: String,
) {
    if let Err(mark_err) = hvst_db::fail_collection_run(pool, run_id, &message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark {context} run as failed"
        );
    }
}
