use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

use super::records::{RouteRecord, ShapePointRecord, StopRecord, StopTimeRecord, TripRecord};

/// Raw contents of a static GTFS folder.
#[derive(Debug, Clone, Default)]
pub struct GtfsFeed {
    pub stops: Vec<StopRecord>,
    pub routes: Vec<RouteRecord>,
    pub trips: Vec<TripRecord>,
    pub stop_times: Vec<StopTimeRecord>,
    pub shapes: Vec<ShapePointRecord>,
}

/// Reads the GTFS text files under `dir`.
///
/// A missing file loads as an empty table and rows that fail to parse are
/// skipped with a warning; only I/O errors on files that exist are returned.
#[tracing::instrument(fields(dir = %dir.display()))]
pub fn load_feed(dir: &Path) -> Result<GtfsFeed> {
    let feed = GtfsFeed {
        stops: read_table(&dir.join("stops.txt"))?,
        routes: read_table(&dir.join("routes.txt"))?,
        trips: read_table(&dir.join("trips.txt"))?,
        stop_times: read_table(&dir.join("stop_times.txt"))?,
        shapes: read_table(&dir.join("shapes.txt"))?,
    };

    info!(
        stops = feed.stops.len(),
        routes = feed.routes.len(),
        trips = feed.trips.len(),
        stop_times = feed.stop_times.len(),
        shape_points = feed.shapes.len(),
        "GTFS feed loaded"
    );

    Ok(feed)
}

/// Deserialises every well-formed row of a CSV file with headers.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        debug!(path = %path.display(), "GTFS file not present, using empty table");
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for result in rdr.deserialize() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) => {
                skipped += 1;
                if skipped <= 5 {
                    warn!(path = %path.display(), error = %e, "Skipping malformed GTFS row");
                }
            }
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, kept = rows.len(), "Malformed GTFS rows skipped");
    }

    Ok(rows)
}
