//! Algorithms for building the hierarchy.

pub mod contraction;
