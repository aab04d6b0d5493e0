//! Refinement and clearance scenario tests
//!
//! Random obstacle layouts are loaded and edited, then every corner of the
//! mesh is checked for hidden passages and for clearance values that exceed
//! the corner's own edges.

#[cfg(test)]
mod tests {
    use crate::quad_edge::EdgeId;
    use crate::{Navmesh, NavmeshConfig, Operation};
    use clearway_common::{Result, Vec2};

    const EPS: f64 = 1e-9;

    fn config() -> NavmeshConfig {
        NavmeshConfig::new(Vec2::new(-30.0, -30.0), Vec2::new(30.0, 30.0))
    }

    /// Long walls plus small triangles scattered between them
    fn scene(seed: u64, first_id: u32, count: usize) -> Vec<Operation<u32>> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut point = |extent: f64| {
            Vec2::new(
                rng.f64() * 2.0 * extent - extent,
                rng.f64() * 2.0 * extent - extent,
            )
        };
        (0..count)
            .map(|i| {
                let id = first_id + i as u32;
                if i % 3 == 0 {
                    Operation::insert(id, vec![point(25.0), point(25.0)])
                } else {
                    let center = point(24.0);
                    let offsets = [point(2.0), point(2.0), point(2.0)];
                    Operation::insert_polygon(id, offsets.iter().map(|&o| center + o).collect())
                }
            })
            .collect()
    }

    fn interior_corners(navmesh: &Navmesh<u32>) -> Vec<EdgeId> {
        let mesh = navmesh.mesh();
        mesh.edges()
            .flat_map(|e| [e, e.sym()])
            .filter(|&e| !mesh.is_exterior(e))
            .collect()
    }

    fn disturbed_corners(navmesh: &mut Navmesh<u32>) -> usize {
        interior_corners(navmesh)
            .into_iter()
            .filter(|&e| navmesh.tri.check_traversal(e).is_some())
            .count()
    }

    /// Every Steiner vertex splits a constraint, so it keeps at least two
    /// constrained edges
    fn assert_steiner_on_constraints(navmesh: &Navmesh<u32>) {
        let mesh = navmesh.mesh();
        for (v, vertex) in mesh.vertices() {
            if !vertex.is_steiner() {
                continue;
            }
            let constrained = mesh.ring(v).filter(|&e| mesh.is_constrained(e)).count();
            assert!(constrained >= 2, "steiner vertex {v:?} is off its constraint");
        }
    }

    fn assert_valid(navmesh: &Navmesh<u32>) {
        assert!(navmesh.validate_topology().is_empty());
        assert!(navmesh.validate_delaunay().is_empty());
    }

    #[test]
    fn test_loaded_mesh_has_no_disturbances() -> Result<()> {
        for seed in [3, 11, 29] {
            let mut navmesh = Navmesh::new(config())?;
            navmesh.load(&scene(seed, 1, 18))?;
            assert_valid(&navmesh);
            assert_eq!(disturbed_corners(&mut navmesh), 0, "seed {seed}");

            let stats = navmesh.statistics();
            assert_eq!(stats.steiner_vertices, stats.refinements);
            assert_steiner_on_constraints(&navmesh);
        }
        Ok(())
    }

    #[test]
    fn test_removal_refines_whole_mesh() -> Result<()> {
        let mut navmesh = Navmesh::new(config())?;
        navmesh.load(&scene(5, 1, 18))?;

        let removals: Vec<u32> = (1..=18).filter(|id| id % 2 == 0).collect();
        navmesh.update(&scene(6, 100, 4), &removals)?;
        assert_valid(&navmesh);
        assert_eq!(disturbed_corners(&mut navmesh), 0);
        assert_steiner_on_constraints(&navmesh);
        assert_eq!(navmesh.obstacle_ids().count(), 9 + 4);
        Ok(())
    }

    #[test]
    fn test_incremental_updates_stay_valid() -> Result<()> {
        let mut navmesh = Navmesh::new(config())?;
        navmesh.load(&scene(8, 1, 6))?;
        for round in 0..5u32 {
            let ops = scene(40 + u64::from(round), 10 + round * 10, 4);
            let removals: Vec<u32> = if round == 0 { vec![] } else { vec![round * 10 + 1] };
            navmesh.update(&ops, &removals)?;
            assert_valid(&navmesh);
            assert_steiner_on_constraints(&navmesh);
            assert_eq!(disturbed_corners(&mut navmesh), 0, "round {round}");
        }
        assert_eq!(navmesh.obstacle_ids().count(), 6 + 5 * 4 - 4);
        Ok(())
    }

    #[test]
    fn test_refine_failed_flags_reset_each_cycle() -> Result<()> {
        let mut navmesh = Navmesh::new(config())?;
        navmesh.load(&scene(2, 1, 6))?;
        let edges: Vec<EdgeId> = navmesh.edges().collect();
        for &e in &edges {
            navmesh.tri.mesh.set_refine_failed(e, true);
        }

        navmesh.update(&[], &[])?;
        assert!(navmesh.edges().all(|e| !navmesh.mesh().refine_failed(e)));
        assert_eq!(navmesh.statistics().refine_failures, 0);
        Ok(())
    }

    #[test]
    fn test_clearance_bounded_by_corner_edges() -> Result<()> {
        let mut navmesh = Navmesh::new(config())?;
        navmesh.load(&scene(13, 1, 15))?;

        let mesh = navmesh.mesh();
        for e in interior_corners(&navmesh) {
            let b = mesh.org_pos(e);
            let bound = b
                .distance(mesh.dest_pos(e))
                .min(b.distance(mesh.position(mesh.apex(e))));
            let value = navmesh.clearance_left(e);
            assert!(value >= 0.0);
            assert!(value <= bound + EPS, "corner {e:?}: {value} > {bound}");

            let right = navmesh.clearance_right(e);
            assert_eq!(right, navmesh.clearance_left(mesh.lnext(e)));
        }

        // Outside the domain nothing can pass
        let outside = mesh
            .edges()
            .flat_map(|e| [e, e.sym()])
            .find(|&e| mesh.is_exterior(e))
            .expect("domain boundary");
        assert_eq!(navmesh.clearance_left(outside), 0.0);
        Ok(())
    }

    #[test]
    fn test_refinement_can_be_disabled() -> Result<()> {
        let mut navmesh = Navmesh::new(config().with_refinement(false))?;
        navmesh.load(&scene(3, 1, 18))?;
        let stats = navmesh.statistics();
        assert_eq!(stats.refinements, 0);
        assert_eq!(stats.steiner_vertices, 0);
        assert_valid(&navmesh);
        Ok(())
    }
}
