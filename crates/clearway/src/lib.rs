//! Dynamic clearance-aware navigation mesh
//!
//! This crate maintains a constrained Delaunay triangulation over a fixed
//! rectangular domain. Obstacles (polylines, polygons and points) are inserted
//! and removed at runtime and every triangle corner carries a clearance value:
//! the diameter of the largest disc that can turn around that corner without
//! touching a constraint.
//!
//! # Features
//!
//! - **Incremental edits**: obstacles are added and removed in edit cycles
//!   without rebuilding the mesh
//! - **Robust predicates**: orientation tests fall back to exact arithmetic
//! - **Clearance refinement**: Steiner points are inserted on constraints
//!   wherever a vertex would otherwise hide a narrower passage
//! - **Change tracking**: every cycle reports the triangle ids it invalidated
//! - **Serialization**: configuration and operations derive serde traits with
//!   the `serialization` feature
//!
//! # Example
//!
//! ```rust,ignore
//! use clearway::{Navmesh, NavmeshConfig, Operation};
//! use clearway_common::Vec2;
//!
//! let config = NavmeshConfig::new(Vec2::new(-50.0, -50.0), Vec2::new(50.0, 50.0));
//! let mut navmesh = Navmesh::<u32>::new(config)?;
//!
//! navmesh.load(&[Operation::insert_polygon(
//!     1,
//!     vec![Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(4.0, 4.0)],
//! )])?;
//!
//! // Remove it again and add a wall
//! navmesh.update(
//!     &[Operation::insert(2, vec![Vec2::new(-10.0, 5.0), Vec2::new(10.0, 5.0)])],
//!     &[1],
//! )?;
//! println!("destroyed triangles: {:?}", navmesh.destroyed_triangles());
//! ```

// Allow unused code in tests - test helpers are shared between scenario modules
#![cfg_attr(test, allow(unused))]

mod clearance;
pub mod config;
mod disturbance;
mod edge_search;
mod insert;
pub mod navmesh;
pub mod operation;
pub mod quad_edge;
pub mod quadtree;
mod remove;
mod triangulation;

#[cfg(test)]
mod refinement_tests;

pub use clearance::Limit;
pub use config::NavmeshConfig;
pub use navmesh::{Navmesh, NavmeshStatistics, Violation};
pub use operation::Operation;
pub use quad_edge::{EdgeId, Mesh, Vertex, VertexId, EXTERIOR};
pub use triangulation::Location;

use std::fmt::Debug;
use std::hash::Hash;

/// Opaque obstacle identifier
///
/// Any small, totally ordered, hashable value works; the mesh only compares
/// identifiers.
pub trait ObstacleKey: Copy + Ord + Hash + Debug {}

impl<T: Copy + Ord + Hash + Debug> ObstacleKey for T {}

/// Unrecoverable engine fault
///
/// Raised with [`std::panic::panic_any`] when a loop exceeds its iteration
/// budget. A supervisor can `catch_unwind` and downcast the payload to tell a
/// budget fault apart from other panics.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("point location did not terminate within {0} steps")]
    WalkBudget(usize),
    #[error("edge legalisation did not terminate within {0} flips")]
    FlipBudget(usize),
    #[error("edge-path search did not terminate within {0} iterations")]
    EdgeSearchBudget(usize),
    #[error("segment insertion did not terminate within {0} steps")]
    SegmentBudget(usize),
    #[error("hole re-triangulation did not terminate within {0} steps")]
    HoleBudget(usize),
    #[error("channel search did not terminate within {0} iterations")]
    PathSearchBudget(usize),
}

/// Iteration counter that faults once its budget is spent
pub(crate) struct LoopGuard {
    count: usize,
    limit: usize,
    fault: fn(usize) -> Fault,
}

impl LoopGuard {
    pub(crate) fn new(limit: usize, fault: fn(usize) -> Fault) -> Self {
        Self {
            count: 0,
            limit,
            fault,
        }
    }

    #[inline]
    pub(crate) fn tick(&mut self) {
        self.count += 1;
        if self.count > self.limit {
            std::panic::panic_any((self.fault)(self.limit));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_guard_faults_with_typed_payload() {
        let result = std::panic::catch_unwind(|| {
            let mut guard = LoopGuard::new(3, Fault::FlipBudget);
            for _ in 0..10 {
                guard.tick();
            }
        });
        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<Fault>(), Some(&Fault::FlipBudget(3)));
    }

    #[test]
    fn test_fault_display() {
        assert_eq!(
            Fault::WalkBudget(10).to_string(),
            "point location did not terminate within 10 steps"
        );
    }
}
