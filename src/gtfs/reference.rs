//! Indexed, read-only view of the static GTFS data.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use super::loader::GtfsFeed;
use super::records::{RouteRecord, StopTimeRecord, TripRecord};
use crate::geo::Coordinate;
use crate::geometry::{PathVertex, RouteGeometryStore, RoutePath};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub stop_id: String,
    pub name: String,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub route_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

impl From<RouteRecord> for Route {
    fn from(r: RouteRecord) -> Self {
        Self {
            route_id: r.route_id,
            short_name: r.route_short_name,
            long_name: r.route_long_name,
        }
    }
}

/// One scheduled call of a trip at a stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledStop {
    pub stop_id: String,
    pub name: String,
    pub arrival: Option<String>,
    pub departure: Option<String>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripSchedule {
    pub trip_id: String,
    pub stops: Vec<ScheduledStop>,
}

/// Stops, routes, schedules and route geometry, built once at startup.
#[derive(Debug, Default)]
pub struct ReferenceData {
    stops: Vec<Stop>,
    stop_index: HashMap<String, usize>,
    routes: Vec<Route>,
    route_index: HashMap<String, usize>,
    trips: Vec<TripRecord>,
    stop_times_by_trip: HashMap<String, Vec<StopTimeRecord>>,
    routes_by_stop: HashMap<String, BTreeSet<String>>,
    geometry: RouteGeometryStore,
}

impl ReferenceData {
    pub fn from_feed(feed: GtfsFeed) -> Self {
        let GtfsFeed {
            stops: stop_rows,
            routes: route_rows,
            trips,
            stop_times,
            shapes,
        } = feed;

        let mut stops = Vec::with_capacity(stop_rows.len());
        for row in stop_rows {
            match Coordinate::try_new(row.stop_lat, row.stop_lon) {
                Ok(coordinate) => stops.push(Stop {
                    name: row.stop_name.unwrap_or_else(|| row.stop_id.clone()),
                    stop_id: row.stop_id,
                    coordinate,
                }),
                Err(e) => warn!(stop_id = %row.stop_id, error = %e, "Ignoring stop with invalid coordinate"),
            }
        }
        let stop_index = index_by(&stops, |s| &s.stop_id);

        let routes: Vec<Route> = route_rows.into_iter().map(Route::from).collect();
        let route_index = index_by(&routes, |r| &r.route_id);

        let mut stop_times_by_trip: HashMap<String, Vec<StopTimeRecord>> = HashMap::new();
        for st in stop_times {
            stop_times_by_trip.entry(st.trip_id.clone()).or_default().push(st);
        }
        for list in stop_times_by_trip.values_mut() {
            list.sort_by_key(|st| st.stop_sequence);
        }

        let mut routes_by_stop: HashMap<String, BTreeSet<String>> = HashMap::new();
        for trip in &trips {
            for st in stop_times_by_trip.get(&trip.trip_id).into_iter().flatten() {
                routes_by_stop
                    .entry(st.stop_id.clone())
                    .or_default()
                    .insert(trip.route_id.clone());
            }
        }

        let mut data = Self {
            stops,
            stop_index,
            routes,
            route_index,
            trips,
            stop_times_by_trip,
            routes_by_stop,
            geometry: RouteGeometryStore::default(),
        };
        data.geometry = data.build_geometry(shapes);
        data
    }

    /// Resolves a path for every known route (and every route referenced by a
    /// trip), in order of preference:
    ///
    /// 1. the shape of the route's first trip that names one,
    /// 2. a shape whose id equals the route id,
    /// 3. the ordered stops of the route's first trip that has stop times.
    fn build_geometry(&self, shapes: Vec<super::records::ShapePointRecord>) -> RouteGeometryStore {
        let mut shape_vertices: HashMap<String, Vec<PathVertex>> = HashMap::new();
        for pt in shapes {
            match Coordinate::try_new(pt.shape_pt_lat, pt.shape_pt_lon) {
                Ok(coordinate) => shape_vertices.entry(pt.shape_id).or_default().push(PathVertex {
                    sequence: pt.shape_pt_sequence,
                    coordinate,
                }),
                Err(e) => warn!(shape_id = %pt.shape_id, error = %e, "Ignoring shape point"),
            }
        }

        let mut route_ids: BTreeSet<&str> = self.routes.iter().map(|r| r.route_id.as_str()).collect();
        route_ids.extend(self.trips.iter().map(|t| t.route_id.as_str()));

        let mut paths = Vec::new();
        for route_id in route_ids {
            let trips: Vec<&TripRecord> = self.trips.iter().filter(|t| t.route_id == route_id).collect();

            let from_trip_shape = trips
                .iter()
                .find_map(|t| t.shape_id.as_deref().filter(|id| !id.is_empty()))
                .and_then(|shape_id| shape_vertices.get(shape_id));
            let from_route_shape = || shape_vertices.get(route_id);

            let path = match from_trip_shape.or_else(from_route_shape) {
                Some(vertices) => RoutePath::new(vertices.clone()).ok(),
                None => trips
                    .iter()
                    .find_map(|t| self.stop_times_by_trip.get(&t.trip_id))
                    .and_then(|stop_times| {
                        let vertices = stop_times
                            .iter()
                            .filter_map(|st| {
                                self.stop(&st.stop_id).map(|s| PathVertex {
                                    sequence: st.stop_sequence,
                                    coordinate: s.coordinate,
                                })
                            })
                            .collect();
                        RoutePath::new(vertices).ok()
                    }),
            };

            match path {
                Some(path) => paths.push((route_id.to_string(), path)),
                None => debug!(route_id, "Route has no geometry"),
            }
        }

        RouteGeometryStore::from_paths(paths)
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stop_index.get(stop_id).map(|&i| &self.stops[i])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.route_index.get(route_id).map(|&i| &self.routes[i])
    }

    /// Known either from `routes.txt` or because it has geometry.
    pub fn has_route(&self, route_id: &str) -> bool {
        self.route_index.contains_key(route_id) || self.geometry.contains(route_id)
    }

    /// Routes whose trips call at `stop_id`. Empty when unknown.
    pub fn routes_serving(&self, stop_id: &str) -> impl Iterator<Item = &str> {
        self.routes_by_stop
            .get(stop_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn stop_serves_route(&self, stop_id: &str, route_id: &str) -> bool {
        self.routes_by_stop
            .get(stop_id)
            .is_some_and(|routes| routes.contains(route_id))
    }

    pub fn geometry(&self) -> &RouteGeometryStore {
        &self.geometry
    }

    /// Every trip of `route_id` with its stop calls in sequence order, or
    /// `None` if the route has no trips.
    pub fn schedule(&self, route_id: &str) -> Option<Vec<TripSchedule>> {
        let schedules: Vec<TripSchedule> = self
            .trips
            .iter()
            .filter(|t| t.route_id == route_id)
            .map(|trip| TripSchedule {
                trip_id: trip.trip_id.clone(),
                stops: self
                    .stop_times_by_trip
                    .get(&trip.trip_id)
                    .into_iter()
                    .flatten()
                    .map(|st| ScheduledStop {
                        stop_id: st.stop_id.clone(),
                        name: self
                            .stop(&st.stop_id)
                            .map_or_else(|| "Unknown".to_string(), |s| s.name.clone()),
                        arrival: st.arrival_time.clone(),
                        departure: st.departure_time.clone(),
                        sequence: st.stop_sequence,
                    })
                    .collect(),
            })
            .collect();

        (!schedules.is_empty()).then_some(schedules)
    }
}

fn index_by<T>(items: &[T], key: impl Fn(&T) -> &String) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        // First occurrence wins for duplicated ids.
        index.entry(key(item).clone()).or_insert(i);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::records::{ShapePointRecord, StopRecord};

    fn stop(id: &str, lat: f64, lon: f64) -> StopRecord {
        StopRecord {
            stop_id: id.into(),
            stop_name: Some(format!("Stop {id}")),
            stop_lat: lat,
            stop_lon: lon,
        }
    }

    fn trip(route: &str, trip: &str, shape: Option<&str>) -> TripRecord {
        TripRecord {
            route_id: route.into(),
            trip_id: trip.into(),
            shape_id: shape.map(Into::into),
        }
    }

    fn call(trip: &str, stop: &str, seq: u32) -> StopTimeRecord {
        StopTimeRecord {
            trip_id: trip.into(),
            stop_id: stop.into(),
            stop_sequence: seq,
            arrival_time: Some(format!("08:0{seq}:00")),
            departure_time: None,
        }
    }

    fn shape_pt(shape: &str, seq: u32, lat: f64, lon: f64) -> ShapePointRecord {
        ShapePointRecord {
            shape_id: shape.into(),
            shape_pt_lat: lat,
            shape_pt_lon: lon,
            shape_pt_sequence: seq,
        }
    }

    fn route(id: &str) -> RouteRecord {
        RouteRecord {
            route_id: id.into(),
            route_short_name: Some(id.into()),
            route_long_name: None,
        }
    }

    fn sample_feed() -> GtfsFeed {
        GtfsFeed {
            stops: vec![
                stop("A", 0.0, 0.0),
                stop("B", 0.0, 1.0),
                stop("C", 0.0, 2.0),
                stop("BAD", 123.0, 0.0),
            ],
            routes: vec![route("R1"), route("R2"), route("R3"), route("R4")],
            trips: vec![
                trip("R1", "T1", Some("SH1")),
                trip("R2", "T2", None),
                trip("R3", "T3", None),
            ],
            stop_times: vec![
                call("T1", "A", 1),
                call("T1", "B", 2),
                call("T2", "C", 2),
                call("T2", "B", 1),
                call("T3", "B", 1),
            ],
            shapes: vec![
                shape_pt("SH1", 2, 0.0, 1.0),
                shape_pt("SH1", 1, 0.0, 0.0),
                shape_pt("SH1", 3, 0.0, 2.0),
                shape_pt("R3", 1, 5.0, 5.0),
            ],
        }
    }

    #[test]
    fn test_invalid_stop_coordinates_are_dropped() {
        let data = ReferenceData::from_feed(sample_feed());
        assert_eq!(data.stops().len(), 3);
        assert!(data.stop("BAD").is_none());
        assert_eq!(data.stop("B").unwrap().name, "Stop B");
    }

    #[test]
    fn test_geometry_prefers_trip_shape() {
        let data = ReferenceData::from_feed(sample_feed());
        let path = data.geometry().lookup("R1").unwrap();
        let lons: Vec<f64> = path.coordinates().map(|c| c.lon).collect();
        assert_eq!(lons, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_geometry_falls_back_to_route_named_shape() {
        let data = ReferenceData::from_feed(sample_feed());
        let path = data.geometry().lookup("R3").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.vertices()[0].coordinate, Coordinate::new(5.0, 5.0));
    }

    #[test]
    fn test_geometry_falls_back_to_stop_sequence() {
        let data = ReferenceData::from_feed(sample_feed());
        let path = data.geometry().lookup("R2").unwrap();
        let lons: Vec<f64> = path.coordinates().map(|c| c.lon).collect();
        assert_eq!(lons, vec![1.0, 2.0]);
    }

    #[test]
    fn test_route_without_trips_has_no_geometry() {
        let data = ReferenceData::from_feed(sample_feed());
        assert!(data.geometry().lookup("R4").is_none());
        assert!(data.has_route("R4"));
        assert!(!data.has_route("R9"));
    }

    #[test]
    fn test_stop_can_serve_several_routes() {
        let data = ReferenceData::from_feed(sample_feed());
        let routes: Vec<&str> = data.routes_serving("B").collect();
        assert_eq!(routes, vec!["R1", "R2", "R3"]);
        assert!(data.stop_serves_route("C", "R2"));
        assert!(!data.stop_serves_route("C", "R1"));
        assert_eq!(data.routes_serving("nowhere").count(), 0);
    }

    #[test]
    fn test_schedule_orders_stops() {
        let data = ReferenceData::from_feed(sample_feed());
        let schedule = data.schedule("R2").unwrap();
        assert_eq!(schedule.len(), 1);
        let ids: Vec<&str> = schedule[0].stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert!(data.schedule("R4").is_none());
    }
}
