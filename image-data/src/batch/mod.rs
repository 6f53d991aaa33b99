//! Batch assembly and prefetching.

mod batch;
mod builder;
mod prefetcher;

pub use batch::*;
pub use builder::*;
pub use prefetcher::*;
