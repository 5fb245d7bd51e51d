//! Point cloud filtering and normal estimation

use crate::spatial::PointIndex;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use recon_core::PointCloud;

/// Statistical outlier removal.
///
/// For every point the mean distance to its `k` nearest neighbours is
/// computed; points whose mean distance exceeds the population mean by more
/// than `std_ratio` standard deviations are dropped. Returns the filtered
/// cloud and the indices of the kept points.
pub fn remove_statistical_outliers(
    pc: &PointCloud,
    k: usize,
    std_ratio: f64,
) -> (PointCloud, Vec<usize>) {
    if pc.len() < 2 || k == 0 {
        return (pc.clone(), (0..pc.len()).collect());
    }

    let index = PointIndex::new(&pc.points);

    let distances: Vec<f64> = pc
        .points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let neighbors = index.k_nearest_excluding(i, p, k);
            if neighbors.is_empty() {
                return 0.0;
            }
            neighbors.iter().map(|n| n.1 as f64).sum::<f64>() / neighbors.len() as f64
        })
        .collect();

    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let threshold = mean + std_ratio * variance.sqrt();

    let inliers: Vec<usize> = distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d <= threshold)
        .map(|(i, _)| i)
        .collect();

    tracing::debug!(
        before = pc.len(),
        after = inliers.len(),
        mean_distance = mean,
        threshold,
        "statistical outlier removal"
    );

    (pc.select(&inliers), inliers)
}

/// Estimate normals using PCA over the `k` nearest neighbours.
///
/// The sign of each normal is chosen so that it points away from the cloud
/// centroid.
pub fn estimate_normals(pc: &mut PointCloud, k: usize) {
    let Some(centroid) = pc.centroid() else {
        return;
    };

    let index = PointIndex::new(&pc.points);

    let normals: Vec<Vector3<f32>> = pc
        .points
        .par_iter()
        .map(|p| {
            let neighbors = index.k_nearest(p, k.max(3));
            if neighbors.len() < 3 {
                return outward_or_up(Vector3::z(), p.coords - centroid.coords);
            }

            let mut mean = Vector3::zeros();
            for (j, _) in &neighbors {
                mean += pc.points[*j].coords;
            }
            mean /= neighbors.len() as f32;

            let mut cov = Matrix3::zeros();
            for (j, _) in &neighbors {
                let d = pc.points[*j].coords - mean;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f32;

            let eigen = SymmetricEigen::new(cov);
            let mut min_idx = 0;
            for i in 1..3 {
                if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
                    min_idx = i;
                }
            }

            let normal = eigen.eigenvectors.column(min_idx).into_owned();
            outward_or_up(normal, p.coords - centroid.coords)
        })
        .collect();

    pc.normals = Some(normals);
}

fn outward_or_up(normal: Vector3<f32>, outward: Vector3<f32>) -> Vector3<f32> {
    let normal = normal.try_normalize(1e-12).unwrap_or_else(Vector3::z);
    if normal.dot(&outward) < 0.0 {
        -normal
    } else {
        normal
    }
}

/// Mean distance from each point to its nearest neighbour.
pub fn mean_point_spacing(pc: &PointCloud) -> f32 {
    if pc.len() < 2 {
        return 0.0;
    }
    let index = PointIndex::new(&pc.points);
    let total: f64 = pc
        .points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            index
                .k_nearest_excluding(i, p, 1)
                .first()
                .map(|n| n.1 as f64)
                .unwrap_or(0.0)
        })
        .sum();
    (total / pc.len() as f64) as f32
}
