//! Nearest Neighbour Module
//! R-tree index matching query points to their closest candidate point.

use rayon::prelude::*;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Result of a nearest-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighbourMatch {
    /// Row index of the matched candidate in the candidate table.
    pub index: usize,
    /// Euclidean distance in coordinate units.
    pub distance: f64,
}

#[derive(Debug, Clone)]
struct IndexedPoint {
    point: [f64; 2],
    row: usize,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Spatial index over candidate points (e.g. model grid cells).
pub struct NearestIndex {
    tree: RTree<IndexedPoint>,
}

impl NearestIndex {
    /// Bulk-load the candidates; rows without coordinates are not indexed.
    pub fn build(candidates: &[Option<[f64; 2]>]) -> Self {
        let entries: Vec<IndexedPoint> = candidates
            .iter()
            .enumerate()
            .filter_map(|(row, point)| point.map(|point| IndexedPoint { point, row }))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed candidates.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest candidate to `query`, `None` if the index is empty.
    pub fn nearest(&self, query: [f64; 2]) -> Option<NeighbourMatch> {
        self.tree.nearest_neighbor(&query).map(|entry| NeighbourMatch {
            index: entry.row,
            distance: entry.distance_2(&query).sqrt(),
        })
    }

    /// Query all points in parallel, preserving input order.
    pub fn nearest_all(&self, queries: &[[f64; 2]]) -> Vec<Option<NeighbourMatch>> {
        queries.par_iter().map(|q| self.nearest(*q)).collect()
    }
}
