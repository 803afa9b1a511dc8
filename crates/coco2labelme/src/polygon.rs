//! Planar polygon measurements backed by `geo`.

use geo::{Area, BooleanOps, BoundingRect, Coord, Intersects, LineString};

use crate::types::Polygon;

pub type GeoPolygon = geo::Polygon<f64>;

/// Convert pixel points into a closed `geo` polygon.
pub fn to_geo(points: &[[i32; 2]]) -> GeoPolygon {
    let exterior: LineString<f64> = points
        .iter()
        .map(|&[x, y]| Coord {
            x: x as f64,
            y: y as f64,
        })
        .collect();
    GeoPolygon::new(exterior, vec![])
}

pub fn area(p: &GeoPolygon) -> f64 {
    p.unsigned_area()
}

/// Area shared by `a` and `b`.
pub fn intersection_area(a: &GeoPolygon, b: &GeoPolygon) -> f64 {
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(ra), Some(rb)) if ra.intersects(&rb) => a.intersection(b).unsigned_area(),
        _ => 0.0,
    }
}

/// Intersection over area of `p`: `area(p ∩ q) / area(p)`.
///
/// `None` when `p` has no area.
pub fn ioa(p: &GeoPolygon, q: &GeoPolygon) -> Option<f64> {
    let a = area(p);
    if a == 0.0 {
        return None;
    }
    Some(intersection_area(p, q) / a)
}

/// Same as [`ioa`] for pixel polygons.
pub fn polygon_ioa(p: &Polygon, q: &Polygon) -> Option<f64> {
    ioa(&to_geo(p), &to_geo(q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: i32, y: i32, size: i32) -> Polygon {
        vec![[x, y], [x + size, y], [x + size, y + size], [x, y + size]]
    }

    #[test]
    fn test_area() {
        assert_eq!(area(&to_geo(&square(2, 3, 4))), 16.0);
        // Orientation does not matter.
        let mut reversed = square(2, 3, 4);
        reversed.reverse();
        assert_eq!(area(&to_geo(&reversed)), 16.0);
    }

    #[test]
    fn test_ioa_self_is_one() {
        let p = square(0, 0, 10);
        let r = polygon_ioa(&p, &p).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ioa_disjoint_is_zero() {
        assert_eq!(polygon_ioa(&square(0, 0, 5), &square(20, 20, 5)), Some(0.0));
        // Bounding boxes overlap, polygons do not.
        let tri_a = vec![[0, 0], [10, 0], [0, 10]];
        let tri_b = vec![[10, 10], [10, 2], [2, 10]];
        assert_eq!(polygon_ioa(&tri_a, &tri_b), Some(0.0));
    }

    #[test]
    fn test_ioa_is_asymmetric() {
        let small = square(0, 0, 2);
        let big = square(0, 0, 4);
        assert!((polygon_ioa(&small, &big).unwrap() - 1.0).abs() < 1e-9);
        assert!((polygon_ioa(&big, &small).unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_ioa_zero_area_is_undefined() {
        let line = vec![[0, 0], [5, 0], [10, 0]];
        assert_eq!(polygon_ioa(&line, &square(0, 0, 10)), None);
    }
}
