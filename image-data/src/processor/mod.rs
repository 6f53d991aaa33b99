//! Image decoding, transformation and label encoding building blocks.

mod image_loader;
mod label_encoder;
mod transform;

pub use image_loader::*;
pub use label_encoder::*;
pub use transform::*;
