use crate::geo::Coordinate;
use crate::gtfs_rt::{FeedMessage, VehiclePosition};
use crate::vehicles::VehicleReport;

use super::stats::FeedIngestStats;

/// GTFS-RT speeds are metres per second.
const MPS_TO_KMPH: f64 = 3.6;

/// Extracts one [`VehicleReport`] per usable vehicle entity.
///
/// Timestamps fall back from the vehicle's own timestamp to the feed header's
/// and finally to `now_ms`. Entities marked deleted, without a position, or
/// with an out-of-range position are counted and skipped.
pub fn reports_from_feed(feed: &FeedMessage, now_ms: i64) -> (Vec<VehicleReport>, FeedIngestStats) {
    let mut stats = FeedIngestStats {
        total_entities: feed.entity.len(),
        ..Default::default()
    };
    let header_ms = feed.header.timestamp.and_then(seconds_to_ms);
    let mut reports = Vec::new();

    for e in &feed.entity {
        let Some(v) = &e.vehicle else {
            continue;
        };
        stats.vehicles += 1;

        if e.is_deleted.unwrap_or(false) {
            stats.deleted += 1;
            continue;
        }

        let Some(pos) = &v.position else {
            stats.without_position += 1;
            continue;
        };

        let Ok(position) = Coordinate::try_new(f64::from(pos.latitude), f64::from(pos.longitude))
        else {
            stats.invalid_position += 1;
            continue;
        };

        let route_id = v
            .trip
            .as_ref()
            .and_then(|t| t.route_id.clone())
            .filter(|r| !r.is_empty());
        if route_id.is_some() {
            stats.with_route += 1;
        }

        let speed_kmph = match pos.speed.map(f64::from) {
            Some(mps) if mps.is_finite() && mps >= 0.0 => {
                stats.with_speed += 1;
                mps * MPS_TO_KMPH
            }
            _ => 0.0,
        };

        let own_ms = v.timestamp.and_then(seconds_to_ms);
        if own_ms.is_some() {
            stats.with_timestamp += 1;
        }

        reports.push(VehicleReport {
            vehicle_id: vehicle_id(e.id.as_str(), v),
            route_id,
            position,
            speed_kmph,
            timestamp_ms: own_ms.or(header_ms).unwrap_or(now_ms),
        });
        stats.accepted += 1;
    }

    (reports, stats)
}

/// Descriptor id, then label, then the entity id.
fn vehicle_id(entity_id: &str, v: &VehiclePosition) -> String {
    v.vehicle
        .as_ref()
        .and_then(|d| {
            d.id.as_deref()
                .filter(|id| !id.is_empty())
                .or_else(|| d.label.as_deref().filter(|l| !l.is_empty()))
        })
        .unwrap_or(entity_id)
        .to_string()
}

fn seconds_to_ms(secs: u64) -> Option<i64> {
    i64::try_from(secs).ok()?.checked_mul(1000)
}
