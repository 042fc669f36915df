//! GTFS-Realtime vehicle positions as a telemetry source.
//!
//! A background task polls a feed URL, decodes it with [`parse_feed`], turns
//! the vehicle entities into [`VehicleReport`](crate::vehicles::VehicleReport)s
//! and hands them to the same [`LiveTracker`] the HTTP and WebSocket ingress
//! use. A failed poll is logged and the next one proceeds as usual.

mod convert;
mod stats;

pub use convert::reports_from_feed;
pub use stats::FeedIngestStats;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::fetch::auth::{ApiKey, UrlParam};
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::parser::parse_feed;
use crate::tracker::LiveTracker;

/// How the feed expects its API key, if it needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAuth {
    None,
    Header { header_name: String, key: String },
    UrlParam { param_name: String, key: String },
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub auth: FeedAuth,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(15),
            auth: FeedAuth::None,
        }
    }

    /// HTTP client for this feed with the configured key attached.
    pub fn client(&self) -> Result<Box<dyn HttpClient>> {
        let basic = BasicClient::with_timeout(self.timeout)?;
        let client: Box<dyn HttpClient> = match &self.auth {
            FeedAuth::None => Box::new(basic),
            FeedAuth::Header { header_name, key } => Box::new(ApiKey::new(basic, header_name, key)?),
            FeedAuth::UrlParam { param_name, key } => {
                Box::new(UrlParam::new(basic, param_name.as_str(), key.as_str()))
            }
        };
        Ok(client)
    }
}

/// Fetches, decodes and ingests one snapshot of the feed.
pub async fn poll_once<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    tracker: &LiveTracker,
) -> Result<FeedIngestStats> {
    let bytes = fetch_bytes(client, url).await?;
    debug!(bytes = bytes.len(), "Feed bytes received, parsing");

    let feed = parse_feed(&bytes)?;
    let (reports, stats) = reports_from_feed(&feed, Utc::now().timestamp_millis());

    for report in reports {
        tracker.ingest(report);
    }

    Ok(stats)
}

/// Spawns the polling loop. The task runs until aborted.
pub fn spawn_poller(config: FeedConfig, tracker: Arc<LiveTracker>) -> Result<JoinHandle<()>> {
    let client = config.client()?;
    let span = tracing::info_span!("feed_poller", url = %config.url);

    info!(url = %config.url, interval_secs = config.interval.as_secs(), "Starting GTFS-RT poller");

    let handle = tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let started = std::time::Instant::now();
                match poll_once(client.as_ref(), &config.url, &tracker).await {
                    Ok(stats) => {
                        let elapsed = started.elapsed();
                        if elapsed > config.interval {
                            warn!(elapsed_ms = elapsed.as_millis() as u64, "Feed poll slower than interval");
                        }
                        info!(
                            entities = stats.total_entities,
                            vehicles = stats.vehicles,
                            accepted = stats.accepted,
                            rejected = stats.rejected(),
                            route_pct = stats.route_pct(),
                            "Feed ingested"
                        );
                    }
                    Err(e) => error!(error = %e, "Feed poll failed"),
                }
            }
        }
        .instrument(span),
    );

    Ok(handle)
}
