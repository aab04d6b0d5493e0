//! Radius-aware pathfinding over a clearway navmesh
//!
//! A query runs in two stages. [`PathQuery::find_path`] searches the
//! triangle adjacency graph with A* and returns a channel: the sequence of
//! triangles and the gates (shared edges) between them, admitting only
//! transitions whose corner clearance fits a disc of the requested radius.
//! [`Funnel::get_path`] then pulls the channel taut, wrapping the path around
//! gate vertices at the agent radius.
//!
//! ```no_run
//! use clearway::{Navmesh, NavmeshConfig, Operation};
//! use clearway_common::Vec2;
//! use clearway_path::{Funnel, PathQuery, PathQueryConfig};
//!
//! # fn main() -> clearway_common::Result<()> {
//! let mut navmesh = Navmesh::new(NavmeshConfig::new(
//!     Vec2::new(-20.0, -20.0),
//!     Vec2::new(20.0, 20.0),
//! ))?;
//! navmesh.load(&[Operation::insert(1u32, vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)])])?;
//!
//! let mut query = PathQuery::new(PathQueryConfig::default());
//! let (start, goal) = (Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0));
//! if query.find_path(&navmesh, start, goal, 0.5).is_found() {
//!     let mut funnel = Funnel::new();
//!     let nodes = funnel.get_path(query.gates(), start, goal, 0.5);
//!     println!("{} path nodes", nodes.len());
//! }
//! # Ok(())
//! # }
//! ```

mod channel;
mod funnel;
pub mod node_pool;
mod status;

pub use channel::{Gate, GateKind, PathQuery};
pub use funnel::{path_length, path_segments, Funnel, PathNode, PathNodeKind, PathSegment};
pub use status::PathQueryState;

/// Search limits for a [`PathQuery`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PathQueryConfig {
    /// Search nodes (triangle entries) the search may allocate; neighbours
    /// beyond are skipped
    pub max_nodes: usize,
    /// Open-list pops before the search faults
    pub max_iterations: usize,
}

impl Default for PathQueryConfig {
    fn default() -> Self {
        Self {
            max_nodes: 4096,
            max_iterations: 100_000,
        }
    }
}

impl PathQueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Checks a stored channel against the triangles destroyed by the last
/// navmesh update
///
/// `destroyed` must be sorted ascending, as returned by
/// [`clearway::Navmesh::destroyed_triangles`]. The channel stays usable when
/// none of its triangles was destroyed.
pub fn channel_intact(triangle_ids: &[u32], destroyed: &[u32]) -> bool {
    if destroyed.is_empty() {
        return true;
    }
    triangle_ids
        .iter()
        .all(|id| destroyed.binary_search(id).is_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_intact() {
        assert!(channel_intact(&[4, 9, 2], &[]));
        assert!(channel_intact(&[4, 9, 2], &[1, 3, 5]));
        assert!(!channel_intact(&[4, 9, 2], &[1, 2, 3]));
        assert!(channel_intact(&[], &[1]));
    }

    #[test]
    fn test_config_builder() {
        let config = PathQueryConfig::new()
            .with_max_nodes(16)
            .with_max_iterations(32);
        assert_eq!(config.max_nodes, 16);
        assert_eq!(config.max_iterations, 32);
    }
}
