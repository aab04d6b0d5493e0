//! Edit-cycle operations
//!
//! An [`Operation`] is the unit handed to [`crate::Navmesh::load`] and
//! [`crate::Navmesh::update`]. Vertices are given in obstacle-local space and
//! mapped to the world by the operation's transform.

use clearway_common::{Transform, Vec2};

/// Obstacle insertion request
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Operation<K> {
    /// One removable obstacle.
    ///
    /// A single vertex is a point obstacle. The polyline is closed when its
    /// last vertex repeats the first.
    Insert {
        id: K,
        transform: Transform,
        vertices: Vec<Vec2>,
    },
    /// Several permanent obstacles in world space. `amounts[i]` vertices of
    /// `vertices` belong to the `i`-th obstacle.
    BulkInsert {
        vertices: Vec<Vec2>,
        amounts: Vec<usize>,
    },
}

impl<K> Operation<K> {
    /// Insert with the identity transform
    pub fn insert(id: K, vertices: Vec<Vec2>) -> Self {
        Operation::Insert {
            id,
            transform: Transform::IDENTITY,
            vertices,
        }
    }

    /// Insert with a local-to-world transform
    pub fn insert_transformed(id: K, transform: Transform, vertices: Vec<Vec2>) -> Self {
        Operation::Insert {
            id,
            transform,
            vertices,
        }
    }

    /// Closed polygon: the first vertex is repeated at the end
    pub fn insert_polygon(id: K, mut vertices: Vec<Vec2>) -> Self {
        if let Some(&first) = vertices.first() {
            vertices.push(first);
        }
        Self::insert(id, vertices)
    }

    pub fn bulk(vertices: Vec<Vec2>, amounts: Vec<usize>) -> Self {
        Operation::BulkInsert { vertices, amounts }
    }

    pub fn id(&self) -> Option<&K> {
        match self {
            Operation::Insert { id, .. } => Some(id),
            Operation::BulkInsert { .. } => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Operation::Insert {
                transform,
                vertices,
                ..
            } => {
                if vertices.is_empty() {
                    return Err("Obstacle has no vertices".to_string());
                }
                if !transform.is_finite() {
                    return Err("Obstacle transform is not finite".to_string());
                }
                check_finite(vertices)
            }
            Operation::BulkInsert { vertices, amounts } => {
                if amounts.iter().any(|&n| n == 0) {
                    return Err("Bulk insert contains an empty obstacle".to_string());
                }
                let total: usize = amounts.iter().sum();
                if total != vertices.len() {
                    return Err(format!(
                        "Bulk insert amounts sum to {} but {} vertices were given",
                        total,
                        vertices.len()
                    ));
                }
                check_finite(vertices)
            }
        }
    }

    /// World-space polylines of this operation
    pub(crate) fn world_polylines(&self) -> Vec<Vec<Vec2>> {
        match self {
            Operation::Insert {
                transform,
                vertices,
                ..
            } => vec![vertices
                .iter()
                .map(|&v| transform.transform_point2(v))
                .collect()],
            Operation::BulkInsert { vertices, amounts } => {
                let mut start = 0;
                amounts
                    .iter()
                    .map(|&n| {
                        let chunk = vertices[start..start + n].to_vec();
                        start += n;
                        chunk
                    })
                    .collect()
            }
        }
    }
}

fn check_finite(vertices: &[Vec2]) -> Result<(), String> {
    match vertices.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(format!("Vertex {} is not finite", i)),
        None => Ok(()),
    }
}
