//! Spatial index over point positions
//!
//! Thin wrapper over an R*-tree giving k-nearest-neighbour and nearest-point
//! queries by original point index.

use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

#[derive(Debug, Clone, Copy)]
struct IndexedPoint(usize, Point3<f32>);

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.1.x, self.1.y, self.1.z])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.1.x - point[0];
        let dy = self.1.y - point[1];
        let dz = self.1.z - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new(points: &[Point3<f32>]) -> Self {
        let items = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint(i, *p))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Up to `k` nearest points as `(index, distance)`, closest first.
    pub fn k_nearest(&self, query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter(&q)
            .take(k)
            .map(|p| (p.0, p.distance_2(&q).sqrt()))
            .collect()
    }

    /// Up to `k` nearest points excluding `index` itself.
    pub fn k_nearest_excluding(&self, index: usize, query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter(&q)
            .filter(|p| p.0 != index)
            .take(k)
            .map(|p| (p.0, p.distance_2(&q).sqrt()))
            .collect()
    }

    pub fn nearest(&self, query: &Point3<f32>) -> Option<usize> {
        self.tree
            .nearest_neighbor(&[query.x, query.y, query.z])
            .map(|p| p.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_order_and_exclusion() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ];
        let index = PointIndex::new(&points);
        assert_eq!(index.len(), 4);

        let knn = index.k_nearest(&points[0], 2);
        assert_eq!(knn[0].0, 0);
        assert_eq!(knn[1].0, 1);

        let knn = index.k_nearest_excluding(0, &points[0], 2);
        assert_eq!(knn.iter().map(|n| n.0).collect::<Vec<_>>(), vec![1, 2]);
        assert!((knn[1].1 - 3.0).abs() < 1e-6);

        assert_eq!(index.nearest(&Point3::new(9.0, 1.0, 0.0)), Some(3));
    }
}
