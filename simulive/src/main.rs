use chrono::Utc;
use clap::Parser as ClapParser;
use simulive::api::http::server::start_streamer;
use simulive::api::http::service::StreamService;
use simulive::config::{Overrides, Setting, StoreConfig, StreamSettings};
use simulive::context::StreamContext;
use simulive::errors::StreamerError;
use simulive::pool::SegmentPool;
use simulive::store::{FileStore, ManifestStore, MemoryStore};
use std::process;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(ClapParser, Debug)]
#[command(version)]
struct Cli {
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address
    #[arg(long)]
    http: Option<String>,

    /// Media units per second, should match the track timescale
    #[arg(long)]
    time_scale: Option<u32>,

    /// Segment duration in time scale units
    #[arg(long)]
    segment_duration: Option<u64>,

    /// Live window duration in seconds
    #[arg(long)]
    window_duration: Option<u64>,

    #[arg(short, long)]
    threads: Option<usize>,

    /// Continuous segments forming the stream, in order
    segments: Vec<String>,
}

fn main() {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::Layer::default()
                .with_target(false)
                .with_thread_names(false)
                .with_ansi(true)
                .with_line_number(false)
                .with_file(false)
                .with_thread_ids(false),
        );
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set a global logger instance: {}", e);
        process::exit(1);
    }

    let args = Cli::parse();
    let (setting, stream) = match setting(args) {
        Ok(setting) => setting,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let runtime = match common::runtime::build(setting.runtime.threads, "simulive-worker") {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(start(setting, stream)) {
        error!("{}", e);
        process::exit(1);
    }

    info!("done");
}

fn setting(args: Cli) -> Result<(Setting, StreamSettings), StreamerError> {
    let setting = match args.config.as_deref() {
        Some(path) => Setting::load(path)?,
        None => Setting::default(),
    };

    let setting = setting.with_overrides(Overrides {
        addr: args.http,
        threads: args.threads,
        time_scale: args.time_scale,
        segment_duration: args.segment_duration,
        window_duration: args.window_duration,
        segments: args.segments,
    });
    let stream = setting.stream_settings()?;

    Ok((setting, stream))
}

async fn start(setting: Setting, stream: StreamSettings) -> Result<(), StreamerError> {
    let epoch = Utc::now();
    info!("stream began at: {}", epoch);

    let pool = SegmentPool::load(&stream.segments).await?;
    let store = match setting.manifest.config() {
        StoreConfig::Memory => {
            info!("manifest store: memory");
            Arc::new(MemoryStore::new()) as Arc<dyn ManifestStore + Send + Sync>
        }
        StoreConfig::File(path) => {
            info!("manifest store: {}", path.display());
            Arc::new(FileStore::new(path)) as Arc<dyn ManifestStore + Send + Sync>
        }
    };

    let context = Arc::new(StreamContext::new(epoch, &stream, pool, store)?);
    info!(
        "segment duration {:?}, window of {} segments",
        context.timeline.segment_duration(),
        context.synthesizer().window_segments()
    );

    let publisher = context.publisher();
    publisher.publish_once(Utc::now()).await?;

    let notifier = Arc::new(Notify::new());
    common::systemd::run(notifier.clone());

    let service = StreamService::new(Arc::clone(&context), setting.http.cache_segments);
    let server = start_streamer(
        notifier.clone(),
        setting.http.addr.clone(),
        setting.http.buffer,
        setting.manifest.name.clone(),
        service,
    );

    tokio::select! {
        result = publisher.run() => result,
        result = server => result,
    }
}
