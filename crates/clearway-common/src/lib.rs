//! Common utilities and data structures shared by the clearway crates
//!
//! Everything here is independent of the triangulation itself: 2D vector
//! helpers, robust orientation predicates, the generation-indexed pool used
//! for vertex storage, and the error type returned by the public APIs.

mod math;
pub mod pool;
mod predicates;

pub use math::*;
pub use pool::{Handle, Pool};
pub use predicates::*;

/// Represents a 2D position
pub type Vec2 = glam::DVec2;

/// Local-to-world transform applied to obstacle vertices
pub type Transform = glam::DAffine2;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("obstacle already present: {0}")]
    DuplicateObstacle(String),
}

/// Result type for clearway operations
pub type Result<T> = std::result::Result<T, Error>;
