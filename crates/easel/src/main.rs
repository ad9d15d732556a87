//! Easel entry point.
//!
//! Boot order: config, logging, store, renderer probe, catalog resolution,
//! template validation, recovery sweep, purge scheduler, runner. The chat
//! platform adapter drives `Router::handle`; without one linked in, posts
//! go through the logging notifier.

use anyhow::{bail, Context, Result};
use clap::Parser;
use easel::config::Config;
use easel::drafts::DraftStore;
use easel::gateway::LogNotifier;
use easel::guard::ContentGuard;
use easel::metadata::MetadataCache;
use easel::purge::spawn_purge_scheduler;
use easel::queue::{job_queue, recover_queued};
use easel::{Router, Runner};
use easel_db::EaselDb;
use easel_renderer::{resolve_catalog, CivitaiClient, RendererClient};
use easel_workflow::TemplateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "easel", about = "Chat front-end for a local image renderer")]
struct Args {
    /// Override DB_PATH from the environment.
    #[arg(long)]
    db_path: Option<String>,

    /// Override WORKFLOW_DIR from the environment.
    #[arg(long)]
    workflow_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env().context("Configuration error")?;
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(workflow_dir) = args.workflow_dir {
        config.workflow_dir = workflow_dir;
    }

    let log_path = easel_logging::default_log_path(std::path::Path::new(&config.db_path));
    easel_logging::init_logging(easel_logging::LogConfig {
        filter: config.log_level.as_deref(),
        file: Some(&log_path),
    })?;

    info!("Starting easel");
    info!("  Renderer: {}", config.backend_base_url);
    info!("  Database: {}", config.db_path);

    let db = EaselDb::open(&config.db_path)
        .await
        .context("Failed to open database")?;

    let renderer = Arc::new(RendererClient::new(&config.backend_base_url)?);
    if !renderer.ping().await {
        bail!(
            "Renderer is unreachable at {}; is it running?",
            config.backend_base_url
        );
    }
    let catalog = Arc::new(
        resolve_catalog(&renderer)
            .await
            .context("Failed to resolve the renderer's node catalog")?,
    );
    info!(
        "Catalog: {} model(s), {} sampler(s), {} scheduler(s), {} adapter(s)",
        catalog.models.len(),
        catalog.samplers.len(),
        catalog.schedulers.len(),
        catalog.adapters.len()
    );

    let templates = Arc::new(
        TemplateStore::load(&config.workflow_dir, config.upscale_workflow)
            .context("Failed to load workflow templates")?,
    );

    let (queue, rx) = job_queue();
    let queue = Arc::new(queue);
    let recovered = recover_queued(&db, &queue)
        .await
        .context("Recovery sweep failed")?;
    if recovered > 0 {
        info!("Re-enqueued {recovered} job(s) left over from the last run");
    }

    let purge_handle =
        spawn_purge_scheduler(db.clone(), config.purge_max_age, config.purge_interval);

    let config = Arc::new(config);
    let metadata = Arc::new(MetadataCache::new());
    let notifier = Arc::new(LogNotifier);
    let runner = Runner::new(
        db.clone(),
        renderer.clone(),
        templates.clone(),
        notifier.clone(),
        queue.clone(),
        metadata.clone(),
        config.backend_timeout,
        config.upscale_enabled,
    );
    let runner_handle = tokio::spawn(runner.run(rx));

    let civitai = Arc::new(CivitaiClient::new(config.civitai_api_key.clone()));
    let guard = Arc::new(ContentGuard::new(db.clone()));
    let _router = Router::new(
        config.clone(),
        db,
        catalog,
        templates,
        Arc::new(DraftStore::new()),
        guard,
        queue,
        metadata,
        renderer.clone(),
        civitai,
        renderer,
    );
    // The platform adapter takes `_router` from here and feeds it events.

    info!("Easel is up; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    purge_handle.abort();
    runner_handle.abort();
    Ok(())
}
