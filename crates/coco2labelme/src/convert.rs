//! Detection loading, indexing and the per-image conversion pipeline.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::de::DeserializeOwned;

use crate::contour;
use crate::error::{Error, Result};
use crate::mask::{self, Mask};
use crate::overlap;
use crate::params::Params;
use crate::score;
use crate::types::{Category, Dataset, Detection, DetectionFile, Image, Polygon, ScoredPolygon};

/// Surviving shapes of one image.
#[derive(Debug, Clone)]
pub struct ImageShapes {
    pub image: Image,
    pub shapes: Vec<ScoredPolygon>,
    /// Detections dropped because their mask could not be decoded.
    pub dropped: usize,
}

/// Converts scored mask detections into per-image polygon shapes.
pub struct Converter {
    pub dataset: Dataset,
    pub detections: Vec<Detection>,
    pub params: Params,
    /// img_id -> index into dataset.images
    imgs: HashMap<u64, usize>,
    /// cat_id -> index into dataset.categories
    cats: HashMap<u64, usize>,
    /// (img_id, cat_id) -> [index into detections, ...] in file order
    img_cat_to_dets: BTreeMap<(u64, u64), Vec<usize>>,
}

fn read_json<T: DeserializeOwned>(path: &Path, operation: &'static str) -> Result<T> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        operation,
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl Converter {
    /// Index detections against the template's images and categories.
    ///
    /// Fails on the first detection whose image or category is unknown.
    pub fn new(dataset: Dataset, detections: Vec<Detection>, params: Params) -> Result<Self> {
        let imgs: HashMap<u64, usize> = dataset
            .images
            .iter()
            .enumerate()
            .map(|(i, img)| (img.id, i))
            .collect();
        let cats: HashMap<u64, usize> = dataset
            .categories
            .iter()
            .enumerate()
            .map(|(i, cat)| (cat.id, i))
            .collect();

        let mut img_cat_to_dets: BTreeMap<(u64, u64), Vec<usize>> = BTreeMap::new();
        for (i, det) in detections.iter().enumerate() {
            if !imgs.contains_key(&det.image_id) {
                return Err(Error::UnknownImage(det.image_id));
            }
            if !cats.contains_key(&det.category_id) {
                return Err(Error::UnknownCategory(det.category_id));
            }
            img_cat_to_dets
                .entry((det.image_id, det.category_id))
                .or_default()
                .push(i);
        }

        Ok(Converter {
            dataset,
            detections,
            params,
            imgs,
            cats,
            img_cat_to_dets,
        })
    }

    /// Load a COCO template (images and categories) and a detection file.
    pub fn from_files(template: &Path, detections: &Path, params: Params) -> Result<Self> {
        let dataset: Dataset = read_json(template, "read template")?;
        let detections = read_json::<DetectionFile>(detections, "read detections")?.into_detections();
        info!(
            "Loaded {} detections, {} images, {} categories",
            detections.len(),
            dataset.images.len(),
            dataset.categories.len()
        );
        Self::new(dataset, detections, params)
    }

    pub fn get_img(&self, id: u64) -> Option<&Image> {
        self.imgs.get(&id).map(|&i| &self.dataset.images[i])
    }

    pub fn get_cat(&self, id: u64) -> Option<&Category> {
        self.cats.get(&id).map(|&i| &self.dataset.categories[i])
    }

    /// Ids of images with at least one detection, ascending.
    pub fn image_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.img_cat_to_dets.keys().map(|&(img, _)| img).collect();
        ids.dedup();
        ids
    }

    /// Category ids detected on an image with their detection indices, by category id.
    fn instances(&self, image_id: u64) -> impl Iterator<Item = (u64, &[usize])> {
        self.img_cat_to_dets
            .range((image_id, u64::MIN)..=(image_id, u64::MAX))
            .map(|(&(_, cat_id), dets)| (cat_id, dets.as_slice()))
    }

    /// Convert every image with detections, in parallel.
    pub fn convert(&self) -> Result<BTreeMap<u64, ImageShapes>> {
        let ids = self.image_ids();
        info!("Converting {} images", ids.len());
        ids.par_iter()
            .map(|&id| self.convert_image(id).map(|shapes| (id, shapes)))
            .collect()
    }

    /// Run the full pipeline for one image.
    ///
    /// Instances are taken in category id order; their index is the
    /// `group_id` of every polygon they produce.
    pub fn convert_image(&self, image_id: u64) -> Result<ImageShapes> {
        let image = self
            .get_img(image_id)
            .ok_or(Error::UnknownImage(image_id))?;
        let mut dropped = 0;
        let mut shapes = Vec::new();

        for (group_id, (cat_id, dets)) in self.instances(image_id).enumerate() {
            let category = self.get_cat(cat_id).ok_or(Error::UnknownCategory(cat_id))?;
            let masks = self.decode_instance(image, dets, &mut dropped)?;
            shapes.extend(self.instance_shapes(image, category, group_id, &masks));
        }

        let before = shapes.len();
        let shapes = overlap::resolve(shapes, &self.params.rules);
        if shapes.len() < before {
            debug!(
                "Image {}: suppressed {} overlapping polygons",
                image.id,
                before - shapes.len()
            );
        }

        Ok(ImageShapes {
            image: image.clone(),
            shapes,
            dropped,
        })
    }

    /// Decoded and denoised masks of an instance, paired with their scores.
    fn decode_instance(
        &self,
        image: &Image,
        dets: &[usize],
        dropped: &mut usize,
    ) -> Result<Vec<(Mask, f64)>> {
        let mut masks = Vec::with_capacity(dets.len());
        for &i in dets {
            let det = &self.detections[i];
            if let Some([h, w]) = det.segmentation.size() {
                if (h, w) != (image.height, image.width) {
                    return Err(Error::SizeMismatch {
                        image_id: image.id,
                        mask_h: h,
                        mask_w: w,
                        image_h: image.height,
                        image_w: image.width,
                    });
                }
            }
            match mask::to_rle(&det.segmentation).and_then(|rle| mask::decode(&rle)) {
                Ok(m) => masks.push((
                    mask::keep_largest(&m, self.params.components_per_detection),
                    det.score,
                )),
                Err(e) => {
                    warn!(
                        "Dropping detection #{} (image {}, category {}): {}",
                        i, det.image_id, det.category_id, e
                    );
                    *dropped += 1;
                }
            }
        }
        Ok(masks)
    }

    /// Union, outline and score one instance.
    fn instance_shapes(
        &self,
        image: &Image,
        category: &Category,
        group_id: usize,
        masks: &[(Mask, f64)],
    ) -> Vec<ScoredPolygon> {
        let level = self.params.level;
        let Some(instance) = mask::union(masks.iter().map(|(m, _)| m)) else {
            return Vec::new();
        };
        let polygons = contour::extract(&instance, level, true);
        if polygons.is_empty() {
            debug!("Image {}: no region for category {}", image.id, category.name);
            return Vec::new();
        }

        let references: Vec<(Option<Polygon>, f64)> = masks
            .iter()
            .map(|(m, s)| (contour::first_polygon(m, level), *s))
            .collect();
        score::score_instance(polygons, &references, &category.name, group_id)
    }
}
