//! The image data layer: label list manifests in, prefetched image and label
//! batches out.

mod common;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod layer;
pub mod processor;
pub mod profiling;
#[cfg(test)]
mod testing;

pub use batch::{Batch, BatchGuard, Prefetcher};
pub use config::ImageDataConfig;
pub use layer::ImageDataLayer;
