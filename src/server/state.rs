use std::sync::Arc;

use chrono::Utc;

use crate::eta::EtaConfig;
use crate::gtfs::ReferenceData;
use crate::tracker::LiveTracker;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub reference: Arc<ReferenceData>,
    pub tracker: Arc<LiveTracker>,
    pub eta: EtaConfig,
}

impl AppState {
    pub fn new(reference: ReferenceData, tracker: LiveTracker, eta: EtaConfig) -> Self {
        Self {
            reference: Arc::new(reference),
            tracker: Arc::new(tracker),
            eta,
        }
    }

    pub fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
