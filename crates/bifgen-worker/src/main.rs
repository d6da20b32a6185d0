//! Scrubbing-preview generation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bifgen_models::JobStatus;
use bifgen_pool::{ChannelSink, FanoutSink, FfmpegPipeline, JobController, ProgressSink};
use bifgen_worker::{
    load_manifest, parse_accel_spec, spawn_feed_writer, ConsoleSink, GenerateConfig,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("bifgen=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting bifgen-worker");

    let config = GenerateConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    match bifgen_media::check_ffmpeg() {
        Ok(path) => info!("Using FFmpeg at {}", path.display()),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }

    let capabilities = match parse_accel_spec(&config.accel_spec) {
        Ok(caps) => caps,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let items = match load_manifest(&config.manifest).await {
        Ok(items) => items,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    info!("Loaded {} items from {}", items.len(), config.manifest.display());

    let mut fanout = FanoutSink::new().with(Arc::new(ConsoleSink::new()));
    let mut feed_writer = None;
    if let Some(feed_path) = &config.feed {
        let (sink, rx) = ChannelSink::new();
        fanout = fanout.with(Arc::new(sink));
        feed_writer = Some(spawn_feed_writer(feed_path.clone(), rx));
    }
    let sink: Arc<dyn ProgressSink> = Arc::new(fanout);

    let controller = Arc::new(JobController::new(
        capabilities,
        config.pool_config(),
        Arc::new(FfmpegPipeline),
        sink,
    ));

    // Ctrl-C cancels the running job; queued items never start.
    let shutdown_handle = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal, cancelling");
            controller.cancel_current();
        })
    };

    let job = match controller.run_job(&items).await {
        Ok(job) => job,
        Err(e) => {
            error!("Job failed to start: {e}");
            std::process::exit(1);
        }
    };

    shutdown_handle.abort();
    if let Some(writer) = feed_writer {
        // The controller dropped its sink clones; wait for the last lines.
        drop(controller);
        writer.await.ok();
    }

    match job.status {
        JobStatus::Completed => info!("Worker finished"),
        status => {
            error!(
                "Worker finished with status {status}: {} succeeded, {} failed",
                job.counts.succeeded, job.counts.failed
            );
            std::process::exit(1);
        }
    }
}
