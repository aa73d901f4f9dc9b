//! Text preparation: normalization, AI refinement and chunking.

pub mod chunker;
pub mod normalizer;
pub mod refiner;
