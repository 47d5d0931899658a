use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sentinel_recorder::{
    create_router, AcquisitionDriver, AdcSource, AppState, Config, FileDriver, LiveBroadcaster,
    NatsClient, Pipeline, PipelineHandle, QuotaProbe, RecorderControl, SessionManager,
    SystemClock, WakeSignal,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sentinel-recorder", version, about = "Networked audio recorder")]
struct Args {
    /// Config file base path (extension optional)
    #[arg(long, default_value = "config/sentinel-recorder")]
    config: String,

    /// WAV file replayed as the analog input
    #[arg(long)]
    source: Option<PathBuf>,

    /// HTTP port override
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(source) = args.source {
        cfg.audio.source_path = Some(source);
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recordings: {}", cfg.storage.recordings_path.display());

    let Some(source_path) = cfg.audio.source_path.clone() else {
        bail!("No audio source configured (set audio.source_path or pass --source)");
    };

    // Bind first: nothing is started if the port is unavailable
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Acquisition
    let wake = Arc::new(WakeSignal::new());
    let driver = FileDriver::open(&source_path, cfg.audio.chunk_samples, cfg.audio.source_loop)
        .with_context(|| format!("Failed to open audio source {}", source_path.display()))?;
    if driver.sample_rate() != cfg.audio.sample_rate {
        warn!(
            "Source runs at {} Hz, not the configured {} Hz; following the source",
            driver.sample_rate(),
            cfg.audio.sample_rate
        );
        cfg.audio.sample_rate = driver.sample_rate();
    }
    let mut source = AdcSource::new(driver, cfg.audio.chunk_samples);

    // Pipeline
    let control = Arc::new(RecorderControl::new(cfg.recorder_settings()));
    let broadcaster = Arc::new(LiveBroadcaster::default());
    let sessions = SessionManager::new(
        cfg.session_config(),
        Box::new(QuotaProbe::new(
            cfg.storage.recordings_path.clone(),
            cfg.storage.capacity_bytes,
        )),
        Box::new(SystemClock),
    );

    source.start(Arc::clone(&wake))?;
    let pipeline = Pipeline::new(
        source,
        Arc::clone(&wake),
        Arc::clone(&control),
        Arc::clone(&broadcaster),
        sessions,
        cfg.pipeline_config(),
    );
    // stops the worker on every exit path below
    let worker = PipelineHandle::spawn(pipeline);

    // Optional live forwarding
    if let Some(url) = cfg.nats.url.as_deref() {
        match NatsClient::connect(url, cfg.nats.subject.clone(), cfg.nats.device.clone()).await {
            Ok(client) => {
                if client
                    .spawn_forwarder(Arc::clone(&broadcaster), cfg.audio.sample_rate)
                    .is_none()
                {
                    warn!("No live client slot left for the NATS forwarder");
                }
            }
            Err(e) => warn!("Live forwarding disabled: {:#}", e),
        }
    }

    // HTTP
    let state = AppState::new(Arc::clone(&control), cfg.storage.recordings_path.clone())
        .with_live(broadcaster);
    let app = create_router(state);
    info!("HTTP server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await;

    worker.stop().await.context("Pipeline worker failed")?;

    served.context("HTTP server failed")?;
    Ok(())
}
