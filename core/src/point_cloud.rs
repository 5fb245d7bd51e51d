use nalgebra::{Point3, RealField, Scalar, Vector3};

#[derive(Debug, Clone, Default)]
pub struct PointCloud<T: Scalar = f32> {
    pub points: Vec<Point3<T>>,
    /// RGB in `[0, 1]`
    pub colors: Option<Vec<Point3<T>>>,
    pub normals: Option<Vec<Vector3<T>>>,
}

impl<T: Scalar> PointCloud<T> {
    pub fn new(points: Vec<Point3<T>>) -> Self {
        Self {
            points,
            colors: None,
            normals: None,
        }
    }

    pub fn with_colors(mut self, colors: Vec<Point3<T>>) -> crate::Result<Self> {
        if colors.len() == self.points.len() {
            self.colors = Some(colors);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Color count {} does not match point count {}",
                colors.len(),
                self.points.len()
            )))
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<T>>) -> crate::Result<Self> {
        if normals.len() == self.points.len() {
            self.normals = Some(normals);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Normal count {} does not match point count {}",
                normals.len(),
                self.points.len()
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep only the points at `indices`, carrying colors and normals along.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i].clone()).collect(),
            colors: self
                .colors
                .as_ref()
                .map(|c| indices.iter().map(|&i| c[i].clone()).collect()),
            normals: self
                .normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i].clone()).collect()),
        }
    }
}

impl<T: Scalar + RealField + Copy> PointCloud<T> {
    /// Axis-aligned bounds, or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<(Point3<T>, Point3<T>)> {
        let first = *self.points.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.points[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }

    pub fn centroid(&self) -> Option<Point3<T>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        let n: T = nalgebra::convert(self.points.len() as f64);
        Some(Point3::from(sum / n))
    }
}

pub type PointCloudf32 = PointCloud<f32>;
pub type PointCloudf64 = PointCloud<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_attributes() {
        let pc = PointCloud::new(vec![Point3::new(0.0f32, 0.0, 0.0)]);
        assert!(pc.clone().with_colors(vec![]).is_err());
        assert!(pc.with_normals(vec![Vector3::z(), Vector3::z()]).is_err());
    }

    #[test]
    fn select_carries_attributes() {
        let pc = PointCloud::new(vec![
            Point3::new(0.0f32, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ])
        .with_normals(vec![Vector3::x(), Vector3::y(), Vector3::z()])
        .unwrap();

        let picked = pc.select(&[2, 0]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.points[0].x, 2.0);
        assert_eq!(picked.normals.unwrap()[0], Vector3::z());
        assert!(picked.colors.is_none());
    }

    #[test]
    fn bounds_and_centroid() {
        let pc = PointCloud::new(vec![
            Point3::new(-1.0f32, 0.0, 2.0),
            Point3::new(3.0, 4.0, -2.0),
        ]);
        let (min, max) = pc.bounds().unwrap();
        assert_eq!(min, Point3::new(-1.0, 0.0, -2.0));
        assert_eq!(max, Point3::new(3.0, 4.0, 2.0));
        assert_eq!(pc.centroid().unwrap(), Point3::new(1.0, 2.0, 0.0));
        assert!(PointCloudf32::default().bounds().is_none());
    }
}
