//! Outline extraction from binary masks.
//!
//! Marching squares over the 1-pixel padded mask, with the iso level applied
//! to 0/1 pixel values. Saddle cells keep background diagonally connected, so
//! foreground touching only at a corner yields separate outlines.

use std::collections::HashMap;

use image::GrayImage;

use crate::mask::{self, Mask};
use crate::types::Polygon;

/// Crossing level between background (0) and foreground (1).
pub const DEFAULT_LEVEL: f64 = 0.8;

/// A cell edge on the padded grid.
///
/// `H(r, c)` joins pixel `(r, c)` to `(r, c + 1)`; `V(r, c)` joins `(r, c)` to `(r + 1, c)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    H(u32, u32),
    V(u32, u32),
}

/// Surround `mask` with a 1-pixel background border.
pub fn pad(mask: &Mask) -> Mask {
    let (w, h) = mask.dimensions();
    let mut padded = GrayImage::new(w + 2, h + 2);
    image::imageops::replace(&mut padded, mask, 1, 1);
    padded
}

/// Outer polygons of `mask`, in row-major order of their topmost-left cell.
///
/// With `fill_holes`, enclosed background is filled first so only outer
/// boundaries remain. An empty result means the mask has no foreground.
pub fn extract(mask: &Mask, level: f64, fill_holes: bool) -> Vec<Polygon> {
    let mut padded = pad(mask);
    if fill_holes {
        padded = mask::fill_holes(&padded);
    }
    trace_contours(&padded, level)
        .iter()
        .filter_map(|contour| to_polygon(contour))
        .collect()
}

/// First outline of a single-blob mask, holes left as they are.
pub fn first_polygon(mask: &Mask, level: f64) -> Option<Polygon> {
    extract(mask, level, false).into_iter().next()
}

fn is_fg(mask: &Mask, row: u32, col: u32) -> bool {
    mask.get_pixel(col, row)[0] != 0
}

/// Sub-pixel `(row, col)` position where `edge` crosses `level`.
fn crossing(mask: &Mask, edge: Edge, level: f64) -> [f64; 2] {
    match edge {
        Edge::H(r, c) => {
            let col = if is_fg(mask, r, c) {
                c as f64 + 1.0 - level
            } else {
                c as f64 + level
            };
            [r as f64, col]
        }
        Edge::V(r, c) => {
            let row = if is_fg(mask, r, c) {
                r as f64 + 1.0 - level
            } else {
                r as f64 + level
            };
            [row, c as f64]
        }
    }
}

/// Closed iso-contours of a mask whose border is background.
///
/// Each cell contributes directed segments with foreground on the same side,
/// so every crossing starts exactly one segment and ends exactly one.
fn trace_contours(mask: &Mask, level: f64) -> Vec<Vec<[f64; 2]>> {
    let (w, h) = mask.dimensions();
    let mut segments: Vec<(Edge, Edge)> = Vec::new();

    for r in 0..h.saturating_sub(1) {
        for c in 0..w.saturating_sub(1) {
            // Corners and edges in clockwise order: ul, T, ur, R, lr, B, ll, L.
            let corners = [
                is_fg(mask, r, c),
                is_fg(mask, r, c + 1),
                is_fg(mask, r + 1, c + 1),
                is_fg(mask, r + 1, c),
            ];
            let edges = [
                Edge::H(r, c),
                Edge::V(r, c + 1),
                Edge::H(r + 1, c),
                Edge::V(r, c),
            ];

            let mut crossings: Vec<(Edge, bool)> = Vec::with_capacity(4);
            for i in 0..4 {
                let (a, b) = (corners[i], corners[(i + 1) % 4]);
                if a != b {
                    crossings.push((edges[i], b));
                }
            }
            // A rising crossing joins the next crossing clockwise.
            for (k, &(edge, rising)) in crossings.iter().enumerate() {
                if rising {
                    let (next, _) = crossings[(k + 1) % crossings.len()];
                    segments.push((edge, next));
                }
            }
        }
    }

    let starts: HashMap<Edge, usize> = segments
        .iter()
        .enumerate()
        .map(|(i, &(start, _))| (start, i))
        .collect();
    let mut visited = vec![false; segments.len()];
    let mut contours = Vec::new();

    for first in 0..segments.len() {
        if visited[first] {
            continue;
        }
        let mut contour = Vec::new();
        let mut i = first;
        loop {
            visited[i] = true;
            let (start, end) = segments[i];
            contour.push(crossing(mask, start, level));
            match starts.get(&end) {
                Some(&next) if !visited[next] => i = next,
                _ => break,
            }
        }
        contours.push(contour);
    }
    contours
}

/// Floor padded coordinates to pixel edges, swap to `(x, y)` and drop
/// redundant vertices.
///
/// On the padded grid, pixel `(r, c)` of the input spans `[c, c + 1]` in x
/// once floored, so a region `n` pixels wide spans `n` units.
fn to_polygon(contour: &[[f64; 2]]) -> Option<Polygon> {
    let mut points: Polygon = contour
        .iter()
        .map(|&[row, col]| [col.floor() as i32, row.floor() as i32])
        .collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let points = drop_collinear(points);
    (points.len() >= 3).then_some(points)
}

fn cross(prev: [i32; 2], cur: [i32; 2], next: [i32; 2]) -> i64 {
    let (ax, ay) = ((cur[0] - prev[0]) as i64, (cur[1] - prev[1]) as i64);
    let (bx, by) = ((next[0] - cur[0]) as i64, (next[1] - cur[1]) as i64);
    ax * by - ay * bx
}

/// Remove vertices lying on the line through their neighbours, spikes included.
fn drop_collinear(mut points: Polygon) -> Polygon {
    loop {
        let before = points.len();
        let mut i = 0;
        while points.len() >= 3 && i < points.len() {
            let n = points.len();
            let (prev, next) = (points[(i + n - 1) % n], points[(i + 1) % n]);
            if cross(prev, points[i], next) == 0 {
                points.remove(i);
            } else {
                i += 1;
            }
        }
        if points.len() == before || points.len() < 3 {
            return points;
        }
    }
}
