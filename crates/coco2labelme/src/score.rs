//! Confidence attribution for instance polygons.

use crate::polygon::{self, GeoPolygon};
use crate::types::{Polygon, ScoredPolygon};

/// Index of the reference that covers the largest share of `p`.
///
/// References without an outline are skipped, as is everything when `p` has no area; ties
/// go to the earliest reference.
fn best_reference(p: &GeoPolygon, references: &[(Option<GeoPolygon>, f64)]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (outline, _)) in references.iter().enumerate() {
        let Some(outline) = outline else { continue };
        let Some(ratio) = polygon::ioa(p, outline) else {
            continue;
        };
        if best.map_or(true, |(_, b)| ratio > b) {
            best = Some((i, ratio));
        }
    }
    best.map(|(i, _)| i)
}

/// Score every instance polygon from the detections that built it.
///
/// `references` pairs each contributing detection's own outline (if it has
/// one) with its score, in detection order. Each polygon takes the score of
/// the detection covering most of it; when no detection gives a defined ratio
/// it falls back to the first detection's score.
pub fn score_instance(
    polygons: Vec<Polygon>,
    references: &[(Option<Polygon>, f64)],
    label: &str,
    group_id: usize,
) -> Vec<ScoredPolygon> {
    let outlines: Vec<(Option<GeoPolygon>, f64)> = references
        .iter()
        .map(|(points, score)| (points.as_deref().map(polygon::to_geo), *score))
        .collect();
    let fallback = references.first().map_or(0.0, |(_, s)| *s);

    polygons
        .into_iter()
        .map(|points| {
            let score = best_reference(&polygon::to_geo(&points), &outlines)
                .map_or(fallback, |i| outlines[i].1);
            ScoredPolygon {
                points,
                score,
                label: label.to_string(),
                group_id,
            }
        })
        .collect()
}
