//! Label list manifests for image data layers.
//!
//! A manifest is a text file with one image per line followed by up to
//! [NUM_LABEL_LISTS] groups of integer labels.

mod common;
mod manifest;
mod parser;
mod record;

pub use manifest::*;
pub use parser::*;
pub use record::*;
