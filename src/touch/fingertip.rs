//! Fingertip picking from a blob outline.

use glam::DVec2;

/// Convex hull by monotone chain, counter-clockwise in a y-up frame,
/// starting from the lowest-x point. Collinear points are dropped.
pub fn convex_hull(points: &[DVec2]) -> Vec<DVec2> {
    let mut sorted: Vec<DVec2> = points.iter().copied().filter(|p| p.is_finite()).collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let cross = |o: DVec2, a: DVec2, b: DVec2| (a - o).perp_dot(b - o);
    let mut hull: Vec<DVec2> = Vec::with_capacity(sorted.len() * 2);

    for &p in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Drop near-duplicate hull vertices. A vertex further than `spacing` from
/// its successor is kept and the successor skipped; otherwise the vertex is
/// dropped and its successor examined next.
pub fn thin_hull(hull: &[DVec2], spacing: f64) -> Vec<DVec2> {
    let mut kept = Vec::new();
    let min_sq = spacing * spacing;
    let mut i = 0;
    while i + 1 < hull.len() {
        if hull[i].distance_squared(hull[i + 1]) > min_sq {
            kept.push(hull[i]);
            i += 1;
        }
        i += 1;
    }
    kept
}

/// The fingertip is the second vertex left after thinning the hull.
pub fn fingertip_from_hull(hull: &[DVec2], spacing: f64) -> Option<DVec2> {
    thin_hull(hull, spacing).get(1).copied()
}

/// Convex hull and fingertip of a blob outline.
pub fn find_fingertip(outline: &[DVec2], spacing: f64) -> Option<DVec2> {
    fingertip_from_hull(&convex_hull(outline), spacing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convex_hull_square_with_interior() {
        let points = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(5.0, 5.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
            DVec2::new(5.0, 0.0),
        ];
        let hull = convex_hull(&points);
        assert_eq!(
            hull,
            vec![
                DVec2::new(0.0, 0.0),
                DVec2::new(10.0, 0.0),
                DVec2::new(10.0, 10.0),
                DVec2::new(0.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_thin_hull_pairs() {
        let hull = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(40.0, 0.0),
            DVec2::new(41.0, 1.0),
            DVec2::new(42.0, 1.0),
            DVec2::new(80.0, 50.0),
            DVec2::new(0.0, 60.0),
        ];
        // 0 is kept and 1 skipped, 2 is too close to 3, 3 is kept and 4 skipped.
        assert_eq!(
            thin_hull(&hull, 15.0),
            vec![DVec2::new(0.0, 0.0), DVec2::new(42.0, 1.0)]
        );
        assert_eq!(fingertip_from_hull(&hull, 15.0), Some(DVec2::new(42.0, 1.0)));
    }

    #[test]
    fn test_small_blob_has_no_fingertip() {
        let outline = vec![DVec2::new(0.0, 0.0), DVec2::new(3.0, 0.0), DVec2::new(0.0, 3.0)];
        assert_eq!(find_fingertip(&outline, 15.0), None);
    }
}
