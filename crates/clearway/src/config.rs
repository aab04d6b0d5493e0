use clearway_common::Vec2;

/// Navmesh construction parameters
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavmeshConfig {
    /// Lower corner of the domain rectangle
    pub min: Vec2,
    /// Upper corner of the domain rectangle
    pub max: Vec2,
    /// Insertions closer than this to an existing vertex reuse that vertex
    pub merge_point_distance: f64,
    /// Distance under which a vertex counts as lying on a segment or edge
    pub collinear_margin: f64,
    /// Pool pre-sizing hint
    pub expected_vertices: usize,
    /// Run disturbance refinement at the end of every edit cycle
    pub refine: bool,
    pub max_flip_iterations: usize,
    pub max_walk_iterations: usize,
    pub max_edge_search_iterations: usize,
    /// Steiner insertions per cycle before refinement gives up
    pub max_refinements: usize,
    /// Alternate split positions tried before a constraint is marked as failed
    pub refinement_retries: usize,
    pub quadtree_bucket_size: usize,
    pub quadtree_max_depth: u32,
}

impl NavmeshConfig {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        NavmeshConfig {
            min,
            max,
            merge_point_distance: 1e-3,
            collinear_margin: 1e-4,
            expected_vertices: 1024,
            refine: true,
            max_flip_iterations: 10_000,
            max_walk_iterations: 10_000,
            max_edge_search_iterations: 10_000,
            max_refinements: 10_000,
            refinement_retries: 5,
            quadtree_bucket_size: 8,
            quadtree_max_depth: 16,
        }
    }

    pub fn with_bounds(mut self, min: Vec2, max: Vec2) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_merge_point_distance(mut self, merge_point_distance: f64) -> Self {
        self.merge_point_distance = merge_point_distance;
        self
    }

    pub fn with_collinear_margin(mut self, collinear_margin: f64) -> Self {
        self.collinear_margin = collinear_margin;
        self
    }

    pub fn with_expected_vertices(mut self, expected_vertices: usize) -> Self {
        self.expected_vertices = expected_vertices;
        self
    }

    pub fn with_refinement(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    pub fn with_max_refinements(mut self, max_refinements: usize) -> Self {
        self.max_refinements = max_refinements;
        self
    }

    pub fn with_refinement_retries(mut self, refinement_retries: usize) -> Self {
        self.refinement_retries = refinement_retries;
        self
    }

    pub fn with_iteration_limits(mut self, flips: usize, walk: usize, edge_search: usize) -> Self {
        self.max_flip_iterations = flips;
        self.max_walk_iterations = walk;
        self.max_edge_search_iterations = edge_search;
        self
    }

    pub fn with_quadtree(mut self, bucket_size: usize, max_depth: u32) -> Self {
        self.quadtree_bucket_size = bucket_size;
        self.quadtree_max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err("Domain bounds must be finite".to_string());
        }
        if self.min.x >= self.max.x || self.min.y >= self.max.y {
            return Err("Domain bounds invalid: min must be less than max".to_string());
        }
        if self.merge_point_distance <= 0.0 {
            return Err("Merge point distance must be positive".to_string());
        }
        if self.collinear_margin <= 0.0 {
            return Err("Collinear margin must be positive".to_string());
        }
        if self.collinear_margin > self.merge_point_distance {
            return Err("Collinear margin cannot exceed the merge point distance".to_string());
        }
        let extent = (self.max - self.min).min_element();
        if self.merge_point_distance * 4.0 >= extent {
            return Err("Merge point distance is too large for the domain".to_string());
        }
        if self.max_flip_iterations == 0
            || self.max_walk_iterations == 0
            || self.max_edge_search_iterations == 0
        {
            return Err("Iteration limits must be positive".to_string());
        }
        if self.quadtree_bucket_size == 0 {
            return Err("Quadtree bucket size must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for NavmeshConfig {
    fn default() -> Self {
        Self::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NavmeshConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let base = NavmeshConfig::default();
        assert!(base
            .clone()
            .with_bounds(Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0))
            .validate()
            .is_err());
        assert!(base.clone().with_merge_point_distance(0.0).validate().is_err());
        assert!(base
            .clone()
            .with_merge_point_distance(1e-5)
            .with_collinear_margin(1e-4)
            .validate()
            .is_err());
        assert!(base
            .clone()
            .with_iteration_limits(0, 10, 10)
            .validate()
            .is_err());
        assert!(base
            .with_bounds(Vec2::ZERO, Vec2::new(f64::INFINITY, 1.0))
            .validate()
            .is_err());
    }
}
