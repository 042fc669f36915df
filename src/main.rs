//! CLI entry point for the RaahiTrack tracker.
//!
//! `serve` runs the HTTP/WebSocket service (optionally polling a GTFS-RT
//! feed), `simulate` drives a fake fleet against a running server and `eta`
//! answers a single arrival question offline.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use raahi_track::config::ServerConfig;
use raahi_track::eta::{EtaConfig, estimate_detailed};
use raahi_track::feed::{FeedAuth, FeedConfig, spawn_poller};
use raahi_track::geo::Coordinate;
use raahi_track::gtfs::load_reference;
use raahi_track::hub::{BroadcastHub, DEFAULT_QUEUE_CAPACITY};
use raahi_track::server::{AppState, start_server};
use raahi_track::simulator::{self, SimulatorConfig};
use raahi_track::tracker::LiveTracker;
use raahi_track::vehicles::VehicleReport;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "raahi_track")]
#[command(about = "Live bus tracking and arrival estimates over GTFS", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracker API server
    Serve(ServeArgs),
    /// Post simulated telemetry for one bus per route to a running server
    Simulate {
        /// Base URL of the tracker
        #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:8080")]
        backend_url: String,

        /// GTFS folder to read route geometry from
        #[arg(long, env = "GTFS_FOLDER", default_value = "data/gtfs")]
        gtfs_dir: PathBuf,

        /// Maximum number of simulated vehicles
        #[arg(short = 'n', long, default_value_t = simulator::DEFAULT_VEHICLE_LIMIT)]
        vehicles: usize,

        /// Seconds between telemetry rounds
        #[arg(short, long, default_value_t = 2)]
        interval: u64,
    },
    /// Estimate minutes to a stop for a bus at the given position
    Eta {
        #[arg(long, env = "GTFS_FOLDER", default_value = "data/gtfs")]
        gtfs_dir: PathBuf,

        #[arg(long)]
        route_id: String,

        #[arg(long)]
        stop_id: String,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Reported speed; 0 means unknown
        #[arg(long, default_value_t = 0.0)]
        speed_kmph: f64,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Allowed CORS origin, `*` for any
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    cors_origin: String,

    #[arg(long, env = "GTFS_FOLDER", default_value = "data/gtfs")]
    gtfs_dir: PathBuf,

    /// Queued updates per live subscriber before it is dropped
    #[arg(long, env = "SUBSCRIBER_QUEUE", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    subscriber_queue: usize,

    /// Seconds after which a vehicle report no longer counts as live
    #[arg(long, env = "STALE_AFTER_SECS", default_value_t = 120)]
    stale_after_secs: u64,

    /// Optional GTFS-RT vehicle positions feed to poll
    #[arg(long, env = "FEED_URL")]
    feed_url: Option<String>,

    /// Seconds between feed polls
    #[arg(long, env = "FEED_INTERVAL_SECS", default_value_t = 30)]
    feed_interval_secs: u64,

    /// API key for the feed
    #[arg(long, env = "FEED_API_KEY", hide_env_values = true)]
    feed_api_key: Option<String>,

    /// Header carrying the key (e.g. `x-api-key`)
    #[arg(long, env = "FEED_API_KEY_HEADER", conflicts_with = "feed_api_key_param")]
    feed_api_key_header: Option<String>,

    /// URL query parameter carrying the key (e.g. `api_key`)
    #[arg(long, env = "FEED_API_KEY_PARAM")]
    feed_api_key_param: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        let feed = self.feed_url.map(|url| {
            let auth = match (self.feed_api_key, self.feed_api_key_header, self.feed_api_key_param) {
                (Some(key), Some(header_name), _) => FeedAuth::Header { header_name, key },
                (Some(key), None, Some(param_name)) => FeedAuth::UrlParam { param_name, key },
                (Some(key), None, None) => FeedAuth::Header {
                    header_name: "x-api-key".to_string(),
                    key,
                },
                (None, _, _) => FeedAuth::None,
            };
            FeedConfig {
                interval: Duration::from_secs(self.feed_interval_secs.max(1)),
                auth,
                ..FeedConfig::new(url)
            }
        });

        ServerConfig {
            host: self.host,
            port: self.port,
            cors_origin: self.cors_origin,
            gtfs_dir: self.gtfs_dir,
            subscriber_queue: self.subscriber_queue.max(1),
            eta: EtaConfig {
                stale_after: Duration::from_secs(self.stale_after_secs),
                ..EtaConfig::default()
            },
            feed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/raahi_track.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("raahi_track.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", LevelFilter::INFO));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args.into_config()).await?,
        Commands::Simulate {
            backend_url,
            gtfs_dir,
            vehicles,
            interval,
        } => {
            let reference = load_reference(&gtfs_dir)?;
            let config = SimulatorConfig {
                vehicle_limit: vehicles,
                tick: Duration::from_secs(interval.max(1)),
                ..SimulatorConfig::new(backend_url)
            };
            simulator::run(config, reference.geometry()).await?;
        }
        Commands::Eta {
            gtfs_dir,
            route_id,
            stop_id,
            lat,
            lon,
            speed_kmph,
        } => {
            let reference = load_reference(&gtfs_dir)?;
            let stop = reference
                .stop(&stop_id)
                .with_context(|| format!("unknown stop: {stop_id}"))?;
            let path = reference
                .geometry()
                .lookup(&route_id)
                .with_context(|| format!("route {route_id} has no geometry"))?;
            let vehicle = VehicleReport {
                vehicle_id: "cli".to_string(),
                route_id: Some(route_id.clone()),
                position: Coordinate::try_new(lat, lon)?,
                speed_kmph,
                timestamp_ms: Utc::now().timestamp_millis(),
            };

            let est = estimate_detailed(&vehicle, stop.coordinate, path, &EtaConfig::default());
            if est.has_passed_stop() {
                warn!(bus_index = est.bus_index, stop_index = est.stop_index, "Bus is at or past the stop");
            }
            println!("{}", serde_json::to_string_pretty(&est)?);
        }
    }

    Ok(())
}

fn env_filter(var: &str, default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(var)
        .from_env_lossy()
}

/// Loads reference data, starts the optional feed poller and serves the API.
#[tracing::instrument(skip_all, fields(gtfs_dir = %config.gtfs_dir.display(), port = config.port))]
async fn serve(config: ServerConfig) -> Result<()> {
    let reference = load_reference(&config.gtfs_dir)
        .with_context(|| format!("Failed to load GTFS from {}", config.gtfs_dir.display()))?;
    if reference.stops().is_empty() {
        warn!("No stops loaded; ETA queries will return 404");
    }

    let tracker = LiveTracker::new(BroadcastHub::new(config.subscriber_queue));
    let state = AppState::new(reference, tracker, config.eta);

    let _poller = match &config.feed {
        Some(feed) => Some(spawn_poller(feed.clone(), state.tracker.clone())?),
        None => {
            info!("No FEED_URL configured, accepting pushed telemetry only");
            None
        }
    };

    start_server(&config, state).await?;
    Ok(())
}
