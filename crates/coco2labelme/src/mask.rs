//! Binary mask operations: COCO RLE codec, connected components, denoising,
//! union and hole filling.
//!
//! RLE counts are column-major (COCO/Fortran order): pixel `(x, y)` is run
//! position `y + h * x`. Decoded masks are `GrayImage`s holding 0 or 1.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::error::DecodeError;
use crate::types::{Rle, Segmentation};

/// A decoded binary mask, 0 for background and 1 for foreground.
pub type Mask = GrayImage;

const FOREGROUND: Luma<u8> = Luma([1]);
const BACKGROUND: Luma<u8> = Luma([0]);

/// Turn a detection's segmentation into an RLE.
pub fn to_rle(segm: &Segmentation) -> Result<Rle, DecodeError> {
    match segm {
        Segmentation::CompressedRle { size, counts } => rle_from_string(counts, size[0], size[1]),
        Segmentation::UncompressedRle { size, counts } => Ok(Rle {
            h: size[0],
            w: size[1],
            counts: counts.clone(),
        }),
        Segmentation::Polygon(_) => Err(DecodeError::NotAMask),
    }
}

/// Encode a binary mask into RLE.
pub fn encode(mask: &Mask) -> Rle {
    let (w, h) = mask.dimensions();
    let mut counts = Vec::new();
    let mut p = false;
    let mut c: u32 = 0;

    for x in 0..w {
        for y in 0..h {
            let v = mask.get_pixel(x, y)[0] != 0;
            if v != p {
                counts.push(c);
                c = 0;
                p = v;
            }
            c += 1;
        }
    }
    counts.push(c);

    Rle { h, w, counts }
}

/// Decode an RLE into a `w x h` mask.
///
/// The runs must cover the declared area exactly.
pub fn decode(rle: &Rle) -> Result<Mask, DecodeError> {
    let h = rle.h as usize;
    let n = h
        .checked_mul(rle.w as usize)
        .ok_or(DecodeError::TooLarge { h: rle.h, w: rle.w })?;

    let covered: u64 = rle.counts.iter().map(|&c| c as u64).sum();
    if covered != n as u64 {
        return Err(DecodeError::CountMismatch {
            covered,
            expected: n as u64,
        });
    }

    let mut mask = GrayImage::new(rle.w, rle.h);
    let mut idx = 0usize;
    for (i, &c) in rle.counts.iter().enumerate() {
        let c = c as usize;
        if i % 2 == 1 {
            for pos in idx..idx + c {
                mask.put_pixel((pos / h) as u32, (pos % h) as u32, FOREGROUND);
            }
        }
        idx += c;
    }
    Ok(mask)
}

/// Number of foreground pixels of an RLE (sum of the odd-indexed runs).
pub fn area(rle: &Rle) -> u64 {
    rle.counts.iter().skip(1).step_by(2).map(|&c| c as u64).sum()
}

/// Number of foreground pixels of a decoded mask.
pub fn pixel_count(mask: &Mask) -> u64 {
    mask.pixels().filter(|p| p[0] != 0).count() as u64
}

/// Compress an RLE into the LEB128-like string format used by COCO.
///
/// Counts after the third are stored as the difference to the count two
/// positions back, which keeps alternating runs of similar length short.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &cnt) in rle.counts.iter().enumerate() {
        let mut x = cnt as i64;
        if i > 2 {
            x -= rle.counts[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    s
}

/// Decompress a COCO RLE string.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle, DecodeError> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut p = 0usize;

    while p < bytes.len() {
        let start = p;
        let mut x: i64 = 0;
        let mut k = 0u32;
        let mut more = true;
        while more {
            let c = match bytes.get(p) {
                Some(&b) if (48..48 + 64).contains(&b) => (b - 48) as i64,
                _ => return Err(DecodeError::MalformedString { offset: p }),
            };
            if k > 11 {
                return Err(DecodeError::MalformedString { offset: start });
            }
            x |= (c & 0x1f) << (5 * k);
            more = c & 0x20 != 0;
            p += 1;
            k += 1;
            if !more && c & 0x10 != 0 {
                x |= -1i64 << (5 * k);
            }
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        let cnt = u32::try_from(x).map_err(|_| DecodeError::MalformedString { offset: start })?;
        counts.push(cnt);
    }

    Ok(Rle { h, w, counts })
}

/// One connected foreground region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// 1-based id in row-major order of first appearance.
    pub id: u32,
    pub pixels: u64,
    label: u32,
}

/// Result of connected-component labeling.
pub struct Labeling {
    labels: ImageBuffer<Luma<u32>, Vec<u32>>,
    /// Components sorted by pixel count, largest first, ties by lowest id.
    pub components: Vec<Component>,
}

impl Labeling {
    /// Mask containing only the given components.
    pub fn mask_of(&self, keep: &[Component]) -> Mask {
        let keep: HashSet<u32> = keep.iter().map(|c| c.label).collect();
        let (w, h) = self.labels.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            if keep.contains(&self.labels.get_pixel(x, y)[0]) {
                FOREGROUND
            } else {
                BACKGROUND
            }
        })
    }
}

/// Label the foreground of `mask` into connected components.
pub fn label(mask: &Mask, connectivity: Connectivity) -> Labeling {
    let labels = connected_components(mask, connectivity, BACKGROUND);

    let mut index: HashMap<u32, usize> = HashMap::new();
    let mut components: Vec<Component> = Vec::new();
    for p in labels.pixels() {
        let l = p[0];
        if l == 0 {
            continue;
        }
        match index.entry(l) {
            Entry::Occupied(e) => components[*e.get()].pixels += 1,
            Entry::Vacant(e) => {
                e.insert(components.len());
                components.push(Component {
                    id: components.len() as u32 + 1,
                    pixels: 1,
                    label: l,
                });
            }
        }
    }
    components.sort_by(|a, b| b.pixels.cmp(&a.pixels).then(a.id.cmp(&b.id)));

    Labeling { labels, components }
}

/// Keep the `k` largest 8-connected components of `mask`.
pub fn keep_largest(mask: &Mask, k: usize) -> Mask {
    let labeling = label(mask, Connectivity::Eight);
    if labeling.components.len() <= k {
        return mask.clone();
    }
    labeling.mask_of(&labeling.components[..k])
}

/// Drop every fragment except the dominant blob.
pub fn denoise(mask: &Mask) -> Mask {
    keep_largest(mask, 1)
}

/// Pixel-wise OR of equally sized masks. `None` when there is nothing to union.
pub fn union<'a, I>(masks: I) -> Option<Mask>
where
    I: IntoIterator<Item = &'a Mask>,
{
    let mut iter = masks.into_iter();
    let mut out = iter.next()?.clone();
    for m in iter {
        debug_assert_eq!(m.dimensions(), out.dimensions());
        for (dst, src) in out.pixels_mut().zip(m.pixels()) {
            if src[0] != 0 {
                *dst = FOREGROUND;
            }
        }
    }
    Some(out)
}

/// Fill background regions that are not 4-connected to the image border.
pub fn fill_holes(mask: &Mask) -> Mask {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return mask.clone();
    }
    // Foreground is the "background" here so that only empty pixels get labels.
    let labels = connected_components(mask, Connectivity::Four, FOREGROUND);

    let mut outside: HashSet<u32> = HashSet::new();
    for x in 0..w {
        outside.insert(labels.get_pixel(x, 0)[0]);
        outside.insert(labels.get_pixel(x, h - 1)[0]);
    }
    for y in 0..h {
        outside.insert(labels.get_pixel(0, y)[0]);
        outside.insert(labels.get_pixel(w - 1, y)[0]);
    }

    GrayImage::from_fn(w, h, |x, y| {
        let l = labels.get_pixel(x, y)[0];
        if mask.get_pixel(x, y)[0] != 0 || !outside.contains(&l) {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Build a mask from rows of `#` (foreground) and `.` (background).
#[cfg(test)]
pub(crate) fn mask_from_rows(rows: &[&str]) -> Mask {
    let h = rows.len() as u32;
    let w = rows.first().map_or(0, |r| r.len()) as u32;
    GrayImage::from_fn(w, h, |x, y| {
        if rows[y as usize].as_bytes()[x as usize] == b'#' {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Mask of size `h x w` with the pixel rectangle `[x0, x1) x [y0, y1)` set.
#[cfg(test)]
pub(crate) fn rect_mask(h: u32, w: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Mask {
    GrayImage::from_fn(w, h, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mask = mask_from_rows(&["..#.", "###.", "...."]);
        let rle = encode(&mask);
        assert_eq!(rle.h, 3);
        assert_eq!(rle.w, 4);
        // Column-major: col0 [0,1,0], col1 [0,1,0], col2 [1,1,0], col3 [0,0,0]
        assert_eq!(rle.counts, vec![1, 1, 2, 1, 1, 2, 4]);
        assert_eq!(decode(&rle).unwrap(), mask);
    }

    #[test]
    fn test_encode_all_ones() {
        let mask = mask_from_rows(&["###", "###"]);
        assert_eq!(encode(&mask).counts, vec![0, 6]);
    }

    #[test]
    fn test_decode_rejects_short_counts() {
        let rle = Rle {
            h: 3,
            w: 4,
            counts: vec![5, 3],
        };
        assert_eq!(
            decode(&rle),
            Err(DecodeError::CountMismatch {
                covered: 8,
                expected: 12
            })
        );
    }

    #[test]
    fn test_decode_rejects_long_counts() {
        let rle = Rle {
            h: 2,
            w: 2,
            counts: vec![1, 2, 3],
        };
        assert!(matches!(
            decode(&rle),
            Err(DecodeError::CountMismatch { covered: 6, .. })
        ));
    }

    #[test]
    fn test_area() {
        let rle = encode(&mask_from_rows(&["#..#", "##..", "...#"]));
        assert_eq!(area(&rle), 5);
        assert_eq!(pixel_count(&decode(&rle).unwrap()), 5);
    }

    #[test]
    fn test_rle_string_known_value() {
        let rle = Rle {
            h: 10,
            w: 10,
            counts: vec![5, 3, 92],
        };
        assert_eq!(rle_to_string(&rle), "53l2");
        assert_eq!(rle_from_string("53l2", 10, 10).unwrap(), rle);
    }

    #[test]
    fn test_rle_string_delta_coding() {
        // Fourth count is stored as 2 - 5 = -3.
        let rle = Rle {
            h: 1,
            w: 11,
            counts: vec![1, 5, 3, 2],
        };
        let s = rle_to_string(&rle);
        assert_eq!(s, "153M");
        assert_eq!(rle_from_string(&s, 1, 11).unwrap().counts, rle.counts);
    }

    #[test]
    fn test_rle_string_large_counts() {
        let rle = Rle {
            h: 100,
            w: 100,
            counts: vec![100, 200, 9000, 300, 400],
        };
        let s = rle_to_string(&rle);
        assert_eq!(rle_from_string(&s, 100, 100).unwrap(), rle);
    }

    #[test]
    fn test_rle_string_malformed() {
        // 'l' sets the continuation bit but the string ends.
        assert_eq!(
            rle_from_string("5l", 10, 10),
            Err(DecodeError::MalformedString { offset: 2 })
        );
        assert!(rle_from_string("5 3", 10, 10).is_err());
    }

    #[test]
    fn test_polygon_segmentation_is_not_a_mask() {
        let segm = Segmentation::Polygon(vec![vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0]]);
        assert_eq!(to_rle(&segm), Err(DecodeError::NotAMask));
    }

    #[test]
    fn test_label_sorts_by_size() {
        let mask = mask_from_rows(&["#..##", "...##", "#...."]);
        let labeling = label(&mask, Connectivity::Eight);
        let sizes: Vec<u64> = labeling.components.iter().map(|c| c.pixels).collect();
        assert_eq!(sizes, vec![4, 1, 1]);
        // Equal sizes keep row-major order of first appearance.
        assert!(labeling.components[1].id < labeling.components[2].id);
    }

    #[test]
    fn test_label_eight_connectivity_joins_diagonals() {
        let mask = mask_from_rows(&["#..", ".#.", "..#"]);
        assert_eq!(label(&mask, Connectivity::Eight).components.len(), 1);
        assert_eq!(label(&mask, Connectivity::Four).components.len(), 3);
    }

    #[test]
    fn test_denoise_keeps_largest() {
        let mask = mask_from_rows(&["##...", "##..#", ".....", "#...."]);
        let expected = mask_from_rows(&["##...", "##...", ".....", "....."]);
        assert_eq!(denoise(&mask), expected);
    }

    #[test]
    fn test_denoise_tie_keeps_first() {
        let mask = mask_from_rows(&["#.#"]);
        assert_eq!(denoise(&mask), mask_from_rows(&["#.."]));
    }

    #[test]
    fn test_denoise_idempotent() {
        let mask = mask_from_rows(&["##..#", "#...#", "...##", "#...."]);
        let once = denoise(&mask);
        assert_eq!(denoise(&once), once);
    }

    #[test]
    fn test_denoise_empty_mask() {
        let mask = GrayImage::new(4, 3);
        assert_eq!(denoise(&mask), mask);
    }

    #[test]
    fn test_keep_largest_top_k() {
        let mask = mask_from_rows(&["###.#", ".....", "##..."]);
        assert_eq!(pixel_count(&keep_largest(&mask, 2)), 5);
        assert_eq!(keep_largest(&mask, 5), mask);
    }

    #[test]
    fn test_union() {
        let a = mask_from_rows(&["##..", "...."]);
        let b = mask_from_rows(&[".##.", "...#"]);
        let u = union([&a, &b]).unwrap();
        assert_eq!(u, mask_from_rows(&["###.", "...#"]));
        assert_eq!(union([&b, &a]).unwrap(), u);
        assert!(pixel_count(&u) >= pixel_count(&a).max(pixel_count(&b)));
        assert!(union(std::iter::empty::<&Mask>()).is_none());
    }

    #[test]
    fn test_fill_holes() {
        let ring = mask_from_rows(&[".....", ".###.", ".#.#.", ".###.", "....."]);
        let filled = mask_from_rows(&[".....", ".###.", ".###.", ".###.", "....."]);
        assert_eq!(fill_holes(&ring), filled);
    }

    #[test]
    fn test_fill_holes_keeps_border_background() {
        // The notch touches the border, so it is not a hole.
        let notch = mask_from_rows(&["#.#", "#.#", "###"]);
        assert_eq!(fill_holes(&notch), notch);
    }
}
