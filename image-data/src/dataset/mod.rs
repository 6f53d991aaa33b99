//! Manifest iteration.

mod epoch;

pub use epoch::*;
