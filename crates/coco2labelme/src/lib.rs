pub mod contour;
pub mod convert;
pub mod error;
pub mod labelme;
pub mod mask;
pub mod overlap;
pub mod params;
pub mod polygon;
pub mod score;
pub mod types;

pub use convert::{Converter, ImageShapes};
pub use error::{DecodeError, Error, Result};
pub use labelme::{Document, Shape};
pub use overlap::{Rule, RuleTable};
pub use params::Params;
pub use types::{Category, Dataset, Detection, Image, Polygon, Rle, ScoredPolygon, Segmentation};
