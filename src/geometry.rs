//! Per-route path geometry used for projection.
//!
//! A [`RouteGeometryStore`] is built once from static reference data and never
//! mutated afterwards, so it can be shared behind an `Arc` without locking.

use std::collections::HashMap;

use crate::geo::Coordinate;

/// A vertex of a route path together with its ordinal in the source data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathVertex {
    pub sequence: u32,
    pub coordinate: Coordinate,
}

impl AsRef<Coordinate> for PathVertex {
    fn as_ref(&self) -> &Coordinate {
        &self.coordinate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("route path has no vertices")]
    EmptyPath,
}

/// Ordered, non-empty sequence of vertices describing a route's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePath {
    vertices: Vec<PathVertex>,
}

impl RoutePath {
    /// Sorts `vertices` by sequence number (stable, so equal sequence numbers
    /// keep their input order) and wraps them.
    pub fn new(mut vertices: Vec<PathVertex>) -> Result<Self, GeometryError> {
        if vertices.is_empty() {
            return Err(GeometryError::EmptyPath);
        }
        vertices.sort_by_key(|v| v.sequence);
        Ok(Self { vertices })
    }

    /// Path from coordinates already in travel order.
    pub fn from_coordinates(
        coordinates: impl IntoIterator<Item = Coordinate>,
    ) -> Result<Self, GeometryError> {
        let vertices = coordinates
            .into_iter()
            .zip(0u32..)
            .map(|(coordinate, sequence)| PathVertex {
                sequence,
                coordinate,
            })
            .collect();
        Self::new(vertices)
    }

    pub fn vertices(&self) -> &[PathVertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.vertices.iter().map(|v| v.coordinate)
    }
}

/// Read-only map of route id to [`RoutePath`].
#[derive(Debug, Clone, Default)]
pub struct RouteGeometryStore {
    paths: HashMap<String, RoutePath>,
}

impl RouteGeometryStore {
    /// Groups `(route_id, vertex)` pairs by route and sorts each group by
    /// sequence number.
    pub fn from_vertices<I, S>(vertices: I) -> Self
    where
        I: IntoIterator<Item = (S, PathVertex)>,
        S: Into<String>,
    {
        let mut grouped: HashMap<String, Vec<PathVertex>> = HashMap::new();
        for (route_id, vertex) in vertices {
            grouped.entry(route_id.into()).or_default().push(vertex);
        }

        let paths = grouped
            .into_iter()
            .filter_map(|(route_id, vertices)| {
                RoutePath::new(vertices).ok().map(|path| (route_id, path))
            })
            .collect();

        Self { paths }
    }

    /// Builds a store from already constructed paths.
    pub fn from_paths(paths: impl IntoIterator<Item = (String, RoutePath)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Path for `route_id`, or `None` when the route has no defined shape.
    pub fn lookup(&self, route_id: &str) -> Option<&RoutePath> {
        self.paths.get(route_id)
    }

    pub fn contains(&self, route_id: &str) -> bool {
        self.paths.contains_key(route_id)
    }

    pub fn route_ids(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
