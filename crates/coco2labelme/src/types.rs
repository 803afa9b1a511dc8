use serde::{Deserialize, Serialize};

/// COCO template file: only the lookup tables are read, annotations are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub id: u64,
    pub file_name: String,
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

/// A single scored mask detection, as written by a detector's result file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Detection {
    pub image_id: u64,
    pub category_id: u64,
    pub segmentation: Segmentation,
    pub score: f64,
}

/// Detection files are either a bare array or a COCO-style object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DetectionFile {
    List(Vec<Detection>),
    Dataset { annotations: Vec<Detection> },
}

impl DetectionFile {
    pub(crate) fn into_detections(self) -> Vec<Detection> {
        match self {
            DetectionFile::List(dets) => dets,
            DetectionFile::Dataset { annotations } => annotations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// Compressed RLE format (as stored in COCO JSON results).
    CompressedRle { size: [u32; 2], counts: String },
    /// Uncompressed RLE format.
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
    /// Polygon format; not a mask, rejected at decode time.
    Polygon(Vec<Vec<f64>>),
}

impl Segmentation {
    /// Declared `(height, width)` of a mask segmentation.
    pub fn size(&self) -> Option<[u32; 2]> {
        match self {
            Segmentation::CompressedRle { size, .. } | Segmentation::UncompressedRle { size, .. } => {
                Some(*size)
            }
            Segmentation::Polygon(_) => None,
        }
    }
}

/// Run-length encoding for masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    /// Run counts: alternating runs of 0s and 1s, starting with 0s.
    pub counts: Vec<u32>,
}

/// An extracted outline in `(x, y)` pixel coordinates, closed implicitly.
pub type Polygon = Vec<[i32; 2]>;

/// A polygon together with the confidence and instance it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPolygon {
    pub points: Polygon,
    pub score: f64,
    pub label: String,
    /// Index of the source instance within its image.
    pub group_id: usize,
}
