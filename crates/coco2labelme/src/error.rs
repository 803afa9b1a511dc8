use std::path::PathBuf;

use thiserror::Error;

/// Why a single detection's mask could not be decoded.
///
/// These are recoverable: the detection is dropped and the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("RLE counts cover {covered} pixels, mask declares {expected}")]
    CountMismatch { covered: u64, expected: u64 },

    #[error("mask size {h}x{w} is too large")]
    TooLarge { h: u32, w: u32 },

    #[error("malformed compressed RLE string at byte {offset}")]
    MalformedString { offset: usize },

    #[error("segmentation is a polygon, not an RLE mask")]
    NotAMask,
}

/// Errors that abort a conversion run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("detection references unknown image id {0}")]
    UnknownImage(u64),

    #[error("detection references unknown category id {0}")]
    UnknownCategory(u64),

    #[error(
        "mask of a detection on image {image_id} is {mask_h}x{mask_w}, image is {image_h}x{image_w}"
    )]
    SizeMismatch {
        image_id: u64,
        mask_h: u32,
        mask_w: u32,
        image_h: u32,
        image_w: u32,
    },

    #[error("{operation} failed for {path:?}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
