pub mod cookie;
pub mod geo;
pub mod image;
pub mod jwt;

pub use geo::{haversine_km, within_radius, Coordinates};
pub use image::{validate_image, ImageError, ImageKind, ImagePreview, ValidatedImage};
