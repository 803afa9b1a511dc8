//! LabelMe annotation documents.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::convert::ImageShapes;
use crate::error::{Error, Result};
use crate::types::{Image, Polygon};

const LINE_COLOR: [u8; 4] = [0, 255, 0, 128];
const FILL_COLOR: [u8; 4] = [255, 0, 0, 128];

/// Output file name for `image`: `<file stem>.json`, or `<image id>.json`
/// when the file name has no stem.
pub fn output_name(image: &Image) -> PathBuf {
    let stem = Path::new(&image.file_name)
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| image.id.to_string().into());
    PathBuf::from(stem).with_extension("json")
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Shape {
    pub label: String,
    pub points: Polygon,
    pub group_id: Option<usize>,
    pub shape_type: String,
    pub line_color: Option<[u8; 4]>,
    pub fill_color: Option<[u8; 4]>,
}

/// One LabelMe JSON file.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub shapes: Vec<Shape>,
    pub line_color: [u8; 4],
    pub fill_color: [u8; 4],
    pub image_path: String,
    /// Source image bytes, base64 in JSON.
    #[serde_as(as = "Option<Base64>")]
    pub image_data: Option<Vec<u8>>,
    pub image_height: u32,
    pub image_width: u32,
}

impl Document {
    pub fn from_shapes(result: &ImageShapes) -> Self {
        let shapes = result
            .shapes
            .iter()
            .map(|s| Shape {
                label: s.label.clone(),
                points: s.points.clone(),
                group_id: Some(s.group_id),
                shape_type: "polygon".into(),
                line_color: None,
                fill_color: None,
            })
            .collect();

        Document {
            shapes,
            line_color: LINE_COLOR,
            fill_color: FILL_COLOR,
            image_path: result.image.file_name.clone(),
            image_data: None,
            image_height: result.image.height,
            image_width: result.image.width,
        }
    }

    /// Embed the source image found under `image_dir`.
    pub fn embed_image(mut self, image_dir: &Path) -> Result<Self> {
        let path = image_dir.join(&self.image_path);
        let bytes = fs::read(&path).map_err(|source| Error::Io {
            path,
            operation: "read image",
            source,
        })?;
        self.image_data = Some(bytes);
        Ok(self)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            operation: "create output",
            source,
        })?;
        serde_json::to_writer(BufWriter::new(file), self).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            operation: "open document",
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
