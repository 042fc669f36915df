use serde::Serialize;

/// Counts from turning one GTFS-RT message into vehicle reports.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FeedIngestStats {
    pub total_entities: usize,
    pub vehicles: usize,
    pub accepted: usize,

    // why vehicle entities were dropped
    pub deleted: usize,
    pub without_position: usize,
    pub invalid_position: usize,

    // optional fields present on accepted reports
    pub with_route: usize,
    pub with_speed: usize,
    pub with_timestamp: usize,
}

impl FeedIngestStats {
    pub fn rejected(&self) -> usize {
        self.deleted + self.without_position + self.invalid_position
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of accepted reports that name a route; vehicles without one never
    /// show up in stop ETA queries.
    pub fn route_pct(&self) -> f64 {
        Self::pct(self.with_route, self.accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(FeedIngestStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_route_pct() {
        let stats = FeedIngestStats {
            accepted: 8,
            with_route: 6,
            ..Default::default()
        };
        assert_eq!(stats.route_pct(), 75.0);
    }

    #[test]
    fn test_rejected_sums_reasons() {
        let stats = FeedIngestStats {
            deleted: 1,
            without_position: 2,
            invalid_position: 3,
            ..Default::default()
        };
        assert_eq!(stats.rejected(), 6);
    }
}
