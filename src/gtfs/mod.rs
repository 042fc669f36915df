//! Static GTFS reference data.
//!
//! [`load_feed`] reads the flat files, [`ReferenceData`] indexes them: stops
//! by id, the routes serving each stop, per-trip schedules and the
//! [`RouteGeometryStore`](crate::geometry::RouteGeometryStore) used for ETA
//! projection. Missing or malformed data never fails the load; it simply
//! yields absent lookups.

pub mod loader;
pub mod records;
pub mod reference;

pub use loader::{GtfsFeed, load_feed, read_table};
pub use reference::{ReferenceData, Route, ScheduledStop, Stop, TripSchedule};

use anyhow::Result;
use std::path::Path;

/// Loads and indexes the GTFS folder at `dir`.
pub fn load_reference(dir: &Path) -> Result<ReferenceData> {
    let feed = load_feed(dir)?;
    let data = ReferenceData::from_feed(feed);
    tracing::info!(
        stops = data.stops().len(),
        routes = data.routes().len(),
        routes_with_geometry = data.geometry().len(),
        "Reference data indexed"
    );
    Ok(data)
}
