//! Core data structures for stlnorm
//!
//! This crate provides the triangle mesh type shared by the STL reader,
//! the decimator and the batch driver, together with the cleanup
//! operations applied to raw STL triangle soup.

pub mod point;
pub mod mesh;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use error::*;
