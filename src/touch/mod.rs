//! Per-frame touch classification of depth blobs.

mod fingertip;

pub use fingertip::{convex_hull, find_fingertip, fingertip_from_hull, thin_hull};

use glam::{DVec2, DVec3};

use crate::workspace::InteractionZone;

/// Crossing-number point-in-polygon test. The polygon is implicitly
/// closed; points on a lower or left edge count as outside.
pub fn polygon_contains(polygon: &[DVec2], point: DVec2) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut crossings = 0usize;
    let mut p1 = polygon[0];
    for i in 1..=polygon.len() {
        let p2 = polygon[i % polygon.len()];
        if point.y > p1.y.min(p2.y) && point.y <= p1.y.max(p2.y) && point.x <= p1.x.max(p2.x) && p1.y != p2.y {
            let x_cross = (point.y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;
            if p1.x == p2.x || point.x <= x_cross {
                crossings += 1;
            }
        }
        p1 = p2;
    }
    crossings % 2 == 1
}

/// A blob from the contour finder, in sensor pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blob {
    pub centroid: DVec2,
    pub outline: Vec<DVec2>,
}

impl Blob {
    pub fn new(centroid: DVec2, outline: Vec<DVec2>) -> Self {
        Self { centroid, outline }
    }
}

/// Blobs touching the workspace in one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchFrame {
    /// Indices into that frame's blob list.
    pub indices: Vec<usize>,
}

impl TouchFrame {
    pub fn has_touch(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Classifies blob centroids against the 2D workspace polygon.
#[derive(Debug, Clone, Default)]
pub struct TouchClassifier {
    polygon: Vec<DVec2>,
}

impl TouchClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_polygon(&mut self, polygon: &[DVec2]) {
        self.polygon = polygon.to_vec();
    }

    pub fn clear(&mut self) {
        self.polygon.clear();
    }

    pub fn polygon(&self) -> &[DVec2] {
        &self.polygon
    }

    pub fn classify(&self, centroids: &[DVec2]) -> TouchFrame {
        TouchFrame {
            indices: centroids
                .iter()
                .enumerate()
                .filter(|(_, c)| polygon_contains(&self.polygon, **c))
                .map(|(i, _)| i)
                .collect(),
        }
    }

    pub fn classify_blobs(&self, blobs: &[Blob]) -> TouchFrame {
        let centroids: Vec<DVec2> = blobs.iter().map(|b| b.centroid).collect();
        self.classify(&centroids)
    }
}

/// Indices of world points inside the interaction prism. `None` entries
/// (no depth reading) never touch.
pub fn classify_3d(points: &[Option<DVec3>], zone: &InteractionZone) -> TouchFrame {
    TouchFrame {
        indices: points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_some_and(|p| zone.contains(p)))
            .map(|(i, _)| i)
            .collect(),
    }
}

/// Keep the points between the zone's top and bottom along its depth axis.
pub fn filter_depth_band<I>(points: I, zone: &InteractionZone) -> Vec<DVec3>
where
    I: IntoIterator<Item = DVec3>,
{
    points.into_iter().filter(|p| zone.in_depth_band(*p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<DVec2> {
        vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ]
    }

    #[test]
    fn test_square_inside_outside() {
        let mut classifier = TouchClassifier::new();
        classifier.set_polygon(&square());

        let frame = classifier.classify(&[DVec2::new(5.0, 5.0), DVec2::new(15.0, 15.0)]);
        assert_eq!(frame.indices, vec![0]);
        assert!(frame.has_touch());
    }

    #[test]
    fn test_frames_are_independent() {
        let mut classifier = TouchClassifier::new();
        classifier.set_polygon(&square());

        let first = classifier.classify(&[DVec2::new(1.0, 1.0), DVec2::new(2.0, 2.0)]);
        assert_eq!(first.indices, vec![0, 1]);
        let second = classifier.classify(&[DVec2::new(20.0, 1.0)]);
        assert!(!second.has_touch());
    }

    #[test]
    fn test_concave_polygon() {
        let polygon = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(5.0, 3.0),
            DVec2::new(0.0, 10.0),
        ];
        assert!(polygon_contains(&polygon, DVec2::new(5.0, 1.0)));
        assert!(!polygon_contains(&polygon, DVec2::new(5.0, 8.0)));
    }

    #[test]
    fn test_degenerate_polygon_never_touches() {
        let classifier = TouchClassifier::new();
        assert!(!classifier.classify(&[DVec2::ZERO]).has_touch());
        assert!(!polygon_contains(&[DVec2::ZERO, DVec2::ONE], DVec2::new(0.5, 0.5)));
    }

    #[test]
    fn test_prism_classification() {
        let mut zone = InteractionZone::new(50.0, 0.0);
        zone.build([
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(100.0, 0.0, 0.0),
            DVec3::new(100.0, 100.0, 0.0),
            DVec3::new(0.0, 100.0, 0.0),
        ])
        .unwrap();

        let points = [
            Some(DVec3::new(50.0, 50.0, 10.0)),
            None,
            Some(DVec3::new(50.0, 50.0, 80.0)),
            Some(DVec3::new(-5.0, 50.0, 10.0)),
        ];
        assert_eq!(classify_3d(&points, &zone).indices, vec![0]);

        let band = filter_depth_band(points.iter().flatten().copied(), &zone);
        assert_eq!(band.len(), 2);
    }
}
