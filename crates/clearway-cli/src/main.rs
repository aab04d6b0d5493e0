//! CLI utility for clearway navigation meshes

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use clearway::{Navmesh, NavmeshConfig, Operation};
use clearway_common::Vec2;
use clearway_path::{
    path_length, path_segments, Funnel, PathNode, PathQuery, PathQueryConfig, PathSegment,
};

/// Builds clearway navigation meshes from JSON scenes and runs path queries on them
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a scene and print mesh statistics
    Stats {
        /// Scene file (JSON)
        #[clap(value_parser)]
        scene: PathBuf,
    },

    /// Find a path for a disc of the given radius
    FindPath {
        /// Scene file (JSON)
        #[clap(value_parser)]
        scene: PathBuf,

        /// Start position as x,y
        #[clap(long, value_parser = parse_vector)]
        start: Vec2,

        /// Goal position as x,y
        #[clap(long, value_parser = parse_vector)]
        goal: Vec2,

        /// Agent radius
        #[clap(long, default_value = "0.5")]
        radius: f64,

        /// Write the path nodes and segments here as JSON
        #[clap(long, value_parser)]
        output: Option<PathBuf>,
    },
}

/// Scene file contents
#[derive(Debug, Deserialize)]
struct Scene {
    /// Lower corner of the domain
    min: [f64; 2],
    /// Upper corner of the domain
    max: [f64; 2],
    #[serde(default = "default_refine")]
    refine: bool,
    #[serde(default)]
    obstacles: Vec<SceneObstacle>,
}

fn default_refine() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SceneObstacle {
    id: u32,
    vertices: Vec<[f64; 2]>,
    /// Repeat the first vertex at the end
    #[serde(default)]
    closed: bool,
    /// Inserted as a fixed obstacle that can never be removed
    #[serde(default)]
    permanent: bool,
}

impl Scene {
    fn config(&self) -> NavmeshConfig {
        NavmeshConfig::new(Vec2::from(self.min), Vec2::from(self.max)).with_refinement(self.refine)
    }

    fn operations(&self) -> Vec<Operation<u32>> {
        let mut operations = Vec::with_capacity(self.obstacles.len() + 1);
        let mut permanent = Vec::new();
        let mut amounts = Vec::new();
        for obstacle in &self.obstacles {
            let mut vertices: Vec<Vec2> =
                obstacle.vertices.iter().copied().map(Vec2::from).collect();
            if obstacle.closed {
                if let Some(&first) = vertices.first() {
                    vertices.push(first);
                }
            }
            if obstacle.permanent {
                amounts.push(vertices.len());
                permanent.extend(vertices);
            } else {
                operations.push(Operation::insert(obstacle.id, vertices));
            }
        }
        if !amounts.is_empty() {
            operations.push(Operation::bulk(permanent, amounts));
        }
        operations
    }
}

#[derive(Debug, Serialize)]
struct PathOutput {
    start: Vec2,
    goal: Vec2,
    radius: f64,
    length: f64,
    triangles: Vec<u32>,
    nodes: Vec<PathNode>,
    segments: Vec<PathSegment>,
}

fn parse_vector(s: &str) -> Result<Vec2, String> {
    let parts: Vec<&str> = s.split(',').collect();

    if parts.len() != 2 {
        return Err(format!("Vector must have 2 components, got {}", parts.len()));
    }

    let x = parts[0].trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<f64>().map_err(|e| e.to_string())?;

    Ok(Vec2::new(x, y))
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Stats { scene } => print_stats(&scene),
        Commands::FindPath {
            scene,
            start,
            goal,
            radius,
            output,
        } => find_path(&scene, start, goal, radius, output.as_deref()),
    }
}

fn load_scene(path: &Path) -> Result<Navmesh<u32>> {
    println!("Loading scene from {}...", path.display());

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let scene: Scene = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut navmesh =
        Navmesh::new(scene.config()).map_err(|e| anyhow!("Invalid scene bounds: {}", e))?;
    navmesh
        .load(&scene.operations())
        .map_err(|e| anyhow!("Failed to load obstacles: {}", e))?;

    println!("Scene loaded: {} obstacles", scene.obstacles.len());
    Ok(navmesh)
}

fn print_stats(path: &Path) -> Result<()> {
    let navmesh = load_scene(path)?;
    let stats = navmesh.statistics();

    println!("Vertices:          {}", stats.vertices);
    println!("Edges:             {}", stats.edges);
    println!("Triangles:         {}", stats.triangles);
    println!("Constrained edges: {}", stats.constrained_edges);
    println!("Steiner vertices:  {}", stats.steiner_vertices);
    println!("Obstacles:         {} (+{} permanent)", stats.obstacles, stats.permanent_obstacles);
    println!("Refinements:       {}", stats.refinements);
    if stats.refine_failures > 0 {
        println!("Refine failures:   {}", stats.refine_failures);
    }

    let topology = navmesh.validate_topology();
    let delaunay = navmesh.validate_delaunay();
    if !topology.is_empty() || !delaunay.is_empty() {
        for violation in topology.iter().chain(&delaunay) {
            println!("  {}", violation);
        }
        bail!(
            "Mesh has {} topology and {} Delaunay violations",
            topology.len(),
            delaunay.len()
        );
    }
    println!("Mesh is valid");
    Ok(())
}

fn find_path(
    path: &Path,
    start: Vec2,
    goal: Vec2,
    radius: f64,
    output: Option<&Path>,
) -> Result<()> {
    let navmesh = load_scene(path)?;

    println!(
        "Finding path from {:?} to {:?} with radius {}...",
        start, goal, radius
    );

    let mut query = PathQuery::new(PathQueryConfig::default());
    let state = query.find_path(&navmesh, start, goal, radius);
    if !state.is_found() {
        bail!("Path query failed: {}", state);
    }

    let mut funnel = Funnel::new();
    let nodes: Vec<PathNode> = funnel
        .get_path(query.gates(), start, goal, radius)
        .iter()
        .copied()
        .collect();
    let length = path_length(&nodes, radius);

    println!(
        "Path found: {} triangles, {} nodes, length {:.3}",
        query.triangle_ids().len(),
        nodes.len(),
        length
    );
    for node in &nodes {
        println!("  {:?} {:?}", node.kind, node.position);
    }

    if let Some(output) = output {
        let result = PathOutput {
            start,
            goal,
            radius,
            length,
            triangles: query.triangle_ids().to_vec(),
            segments: path_segments(&nodes, radius),
            nodes,
        };
        let json = serde_json::to_string_pretty(&result)?;
        let mut file = File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        file.write_all(json.as_bytes())?;
        println!("Path saved to {}", output.display());
    }

    Ok(())
}
