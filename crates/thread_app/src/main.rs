mod config;
mod progress;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use engine_logging::{engine_error, engine_info, engine_warn};
use thread_core::{ThreadId, ThreadSnapshot};
use thread_engine::{
    HtmlRenderer, HttpPageFetcher, JsonPersistence, Persistence, RenderOptions, Scheduler,
    SchedulerError,
};

use crate::config::{AppConfig, CliArgs};
use crate::progress::LoggingProgress;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = AppConfig::resolve(&args)?;
    engine_logging::initialize(config.log_destination(), config.log_level());

    let threads: Vec<&str> = config.threads().collect();
    let mut failed = 0;
    for raw in &threads {
        if let Err(err) = harvest_thread(&config, raw).await {
            engine_error!("{}: {:#}", raw, err);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} threads failed", failed, threads.len());
    }
    Ok(())
}

async fn harvest_thread(config: &AppConfig, raw: &str) -> anyhow::Result<()> {
    let thread = ThreadId::parse(raw)?;
    let decoder = config.wire_format.decoder(config.like_count_baseline);
    let fetcher = HttpPageFetcher::new(config.fetch_settings(), thread.clone(), decoder)
        .context("configuring the page fetcher")?;
    let progress = Arc::new(LoggingProgress::new(thread.clone()));
    let scheduler = Scheduler::new(Arc::new(fetcher), config.scheduler_config())
        .with_progress(progress.clone());

    engine_info!("Harvesting thread {}", thread);
    match scheduler.run().await {
        Ok(harvest) => {
            for warning in &harvest.report.warnings {
                engine_warn!("[{}] incomplete: {}", thread, warning);
            }
            let snapshot = harvest.store.into_snapshot();
            save(config, &thread, &snapshot)?;
            engine_info!(
                "[{}] done: {} comments, {} replies, {} reply pages, peak {} concurrent, {} abandoned streams",
                thread,
                snapshot.top_level_count(),
                snapshot.child_count(),
                harvest.report.child_jobs_executed,
                harvest.report.peak_concurrency,
                progress.abandoned()
            );
            Ok(())
        }
        Err(SchedulerError::TopLevelFetch {
            cursor,
            source,
            partial,
        }) => {
            // Keep what was fetched before the stream broke.
            if partial.total_count() > 0 {
                save(config, &thread, &partial)?;
            }
            let at = cursor
                .as_ref()
                .map(|cursor| cursor.as_str().to_string())
                .unwrap_or_else(|| "<start>".to_string());
            Err(anyhow!(source).context(format!(
                "top-level stream stopped at cursor {at} after {} comments",
                partial.top_level_count()
            )))
        }
        Err(err) => Err(err.into()),
    }
}

fn save(config: &AppConfig, thread: &ThreadId, snapshot: &ThreadSnapshot) -> anyhow::Result<()> {
    let json = JsonPersistence::new(config.output_dir.clone(), thread);
    let path = json
        .save(snapshot)
        .with_context(|| format!("saving {}", json.target().display()))?;
    engine_info!("[{}] wrote {}", thread, path.display());

    if config.render_html {
        write_html(&config.output_dir, thread, snapshot)?;
    }
    Ok(())
}

fn write_html(dir: &Path, thread: &ThreadId, snapshot: &ThreadSnapshot) -> anyhow::Result<()> {
    let path = HtmlRenderer::new(dir, RenderOptions::default())
        .write(snapshot, thread)
        .context("rendering html")?;
    engine_info!("[{}] wrote {}", thread, path.display());
    Ok(())
}
