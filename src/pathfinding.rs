//! A* search over a [`SpatialGrid`].
//!
//! A planner starts unbuilt and samples its grid once through [`PathPlanner::build`];
//! every later search reuses that grid and only recomputes per-search costs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::coords::Point3;
use crate::grid::{AgentShape, GridConfig, SpatialGrid};
use crate::world::OccupancySampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathError {
	#[error("Pathfinding grid has not been built")]
	GridNotBuilt,
	#[error("Obstructed endpoint (start blocked: {start}, goal blocked: {goal})")]
	Obstructed { start: bool, goal: bool },
	#[error("Search exhausted after {iterations} expansions")]
	SearchExhausted { iterations: usize },
	#[error("No path exists ({explored} cells explored)")]
	NoPathExists { explored: usize },
}

impl PathError {
	/// Whether repeating the same request later can succeed without the goal changing.
	pub fn is_retryable(&self) -> bool {
		matches!(self, PathError::SearchExhausted { .. } | PathError::NoPathExists { .. })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
	pub grid: GridConfig,
	pub max_iterations: usize,
	/// Consecutive waypoints closer than this are merged.
	pub waypoint_epsilon: f32,
	pub return_bias_factor: f32,
	pub simplify_collinear: bool,
}

impl Default for PlannerConfig {
	fn default() -> Self {
		Self {
			grid: GridConfig::default(),
			max_iterations: 1000,
			waypoint_epsilon: 0.1,
			return_bias_factor: 2.0,
			simplify_collinear: false,
		}
	}
}

/// Ordered waypoints from the start cell to the goal cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
	waypoints: Vec<Point3>,
}

impl Path {
	pub fn new(waypoints: Vec<Point3>) -> Self {
		Self { waypoints }
	}

	pub fn waypoints(&self) -> &[Point3] {
		&self.waypoints
	}

	pub fn len(&self) -> usize {
		self.waypoints.len()
	}

	pub fn is_empty(&self) -> bool {
		self.waypoints.is_empty()
	}

	pub fn get(&self, index: usize) -> Option<Point3> {
		self.waypoints.get(index).copied()
	}

	pub fn first(&self) -> Option<Point3> {
		self.waypoints.first().copied()
	}

	pub fn last(&self) -> Option<Point3> {
		self.waypoints.last().copied()
	}

	pub fn total_length(&self) -> f32 {
		self.waypoints.windows(2).map(|w| w[0].distance(w[1])).sum()
	}
}

#[derive(Debug, Clone, Copy)]
struct SearchNode {
	g_cost: f32,
	h_cost: f32,
	parent: Option<usize>,
	closed: bool,
}

impl SearchNode {
	fn f_cost(&self) -> f32 {
		self.g_cost + self.h_cost
	}
}

impl Default for SearchNode {
	fn default() -> Self {
		Self { g_cost: f32::INFINITY, h_cost: 0.0, parent: None, closed: false }
	}
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
	f_cost: f32,
	h_cost: f32,
	index: usize,
}

// BinaryHeap is a max-heap: invert so the lowest f (then lowest h) pops first.
impl Ord for OpenEntry {
	fn cmp(&self, other: &Self) -> Ordering {
		other
			.f_cost
			.total_cmp(&self.f_cost)
			.then_with(|| other.h_cost.total_cmp(&self.h_cost))
			.then_with(|| other.index.cmp(&self.index))
	}
}

impl PartialOrd for OpenEntry {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for OpenEntry {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for OpenEntry {}

#[derive(Debug, Clone)]
enum GridState {
	Unbuilt,
	Built(SpatialGrid),
}

#[derive(Debug, Clone)]
pub struct PathPlanner {
	config: PlannerConfig,
	shape: AgentShape,
	grid: GridState,
	scratch: Vec<SearchNode>,
}

impl PathPlanner {
	pub fn new(config: PlannerConfig, shape: AgentShape) -> Self {
		Self { config, shape, grid: GridState::Unbuilt, scratch: Vec::new() }
	}

	pub fn config(&self) -> &PlannerConfig {
		&self.config
	}

	pub fn is_built(&self) -> bool {
		matches!(self.grid, GridState::Built(_))
	}

	pub fn grid(&self) -> Option<&SpatialGrid> {
		match &self.grid {
			GridState::Built(grid) => Some(grid),
			GridState::Unbuilt => None,
		}
	}

	/// Samples the grid around `owner`. Later calls leave the built grid untouched.
	pub fn build(&mut self, owner: Point3, sampler: &dyn OccupancySampler) {
		if self.is_built() {
			return;
		}
		let grid = SpatialGrid::build(owner, &self.config.grid, self.shape, sampler);
		debug!(
			cells = grid.len(),
			walkable = grid.walkable_count(),
			"built navigation grid at ({:.1}, {:.1}, {:.1})",
			owner.x,
			owner.y,
			owner.z
		);
		self.scratch = vec![SearchNode::default(); grid.len()];
		self.grid = GridState::Built(grid);
	}

	/// Finds a route from `origin` to `goal`. With `return_bias`, moves that take the
	/// agent further from that point pay an extra penalty.
	pub fn find_path(&mut self, origin: Point3, goal: Point3, return_bias: Option<Point3>) -> Result<Path, PathError> {
		let GridState::Built(grid) = &self.grid else {
			return Err(PathError::GridNotBuilt);
		};
		let start = grid.index_from_world(origin);
		let target = grid.index_from_world(goal);
		let start_blocked = !grid.node_at(start).walkable;
		let goal_blocked = !grid.node_at(target).walkable;
		if start_blocked || goal_blocked {
			return Err(PathError::Obstructed { start: start_blocked, goal: goal_blocked });
		}

		let scratch = &mut self.scratch;
		scratch.fill(SearchNode::default());

		let target_pos = grid.node_at(target).position;
		let h = grid.node_at(start).position.distance(target_pos);
		scratch[start] = SearchNode { g_cost: 0.0, h_cost: h, parent: None, closed: false };

		let mut open = BinaryHeap::new();
		open.push(OpenEntry { f_cost: h, h_cost: h, index: start });
		let mut iterations = 0;

		while let Some(entry) = open.pop() {
			let current = entry.index;
			if scratch[current].closed {
				continue;
			}
			if iterations >= self.config.max_iterations {
				debug!(iterations, open = open.len() + 1, "A* iteration cap reached");
				return Err(PathError::SearchExhausted { iterations });
			}
			iterations += 1;
			scratch[current].closed = true;

			if current == target {
				let raw = retrace(grid, scratch, start, target);
				return Ok(Path::new(post_process(raw, &self.config)));
			}

			let current_pos = grid.node_at(current).position;
			let current_g = scratch[current].g_cost;
			for neighbor in grid.walkable_neighbors(grid.coord_of(current)) {
				let Some(ni) = grid.index(neighbor) else { continue };
				if scratch[ni].closed {
					continue;
				}
				let neighbor_pos = grid.node_at(ni).position;
				let mut cost = current_g + current_pos.distance(neighbor_pos);
				if let Some(bias) = return_bias {
					let backtrack = neighbor_pos.distance(bias) - current_pos.distance(bias);
					cost += backtrack.max(0.0) * self.config.return_bias_factor;
				}
				if cost < scratch[ni].g_cost {
					let node = SearchNode {
						g_cost: cost,
						h_cost: neighbor_pos.distance(target_pos),
						parent: Some(current),
						closed: false,
					};
					scratch[ni] = node;
					open.push(OpenEntry { f_cost: node.f_cost(), h_cost: node.h_cost, index: ni });
				}
			}
		}

		Err(PathError::NoPathExists { explored: iterations })
	}
}

fn retrace(grid: &SpatialGrid, scratch: &[SearchNode], start: usize, target: usize) -> Vec<Point3> {
	let mut points = Vec::new();
	let mut current = target;
	while current != start {
		points.push(grid.node_at(current).position);
		match scratch[current].parent {
			Some(parent) => current = parent,
			None => break,
		}
	}
	points.push(grid.node_at(start).position);
	points.reverse();
	points
}

fn post_process(points: Vec<Point3>, config: &PlannerConfig) -> Vec<Point3> {
	let mut merged: Vec<Point3> = Vec::with_capacity(points.len());
	for p in points {
		match merged.last() {
			Some(last) if last.distance(p) < config.waypoint_epsilon => {}
			_ => merged.push(p),
		}
	}
	if config.simplify_collinear {
		drop_collinear(merged)
	} else {
		merged
	}
}

const COLLINEAR_TOLERANCE: f32 = 1e-4;

fn drop_collinear(points: Vec<Point3>) -> Vec<Point3> {
	if points.len() < 3 {
		return points;
	}
	let mut out = vec![points[0]];
	for i in 1..points.len() - 1 {
		let prev = out[out.len() - 1];
		let incoming = points[i] - prev;
		let outgoing = points[i + 1] - points[i];
		let area = incoming.cross(outgoing).length();
		let straight = area <= COLLINEAR_TOLERANCE * incoming.length() * outgoing.length()
			&& incoming.dot(outgoing) > 0.0;
		if !straight {
			out.push(points[i]);
		}
	}
	out.push(points[points.len() - 1]);
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::world::{Obstacle, World};

	fn planar_config() -> PlannerConfig {
		PlannerConfig {
			grid: GridConfig { cell_size: 1.0, extent: Point3::new(20.0, 0.0, 20.0) },
			..PlannerConfig::default()
		}
	}

	fn shape() -> AgentShape {
		AgentShape { radius: 0.3, height: 0.5 }
	}

	fn planner(config: PlannerConfig, world: &World) -> PathPlanner {
		let mut p = PathPlanner::new(config, shape());
		p.build(Point3::ZERO, world);
		p
	}

	fn wall(center: Point3, half_x: f32, half_z: f32) -> Obstacle {
		Obstacle::cuboid(center, Point3::new(half_x, 10.0, half_z))
	}

	fn assert_valid(path: &Path, grid: &SpatialGrid) {
		let max_step = grid.max_step_distance() + 1e-4;
		for w in path.waypoints().windows(2) {
			assert!(w[0].distance(w[1]) <= max_step, "step {:?} -> {:?} too long", w[0], w[1]);
		}
		for p in path.waypoints() {
			assert!(grid.is_walkable(grid.cell_from_world(*p)));
		}
	}

	fn backtracking(path: &Path, goal: Point3) -> f32 {
		path.waypoints()
			.windows(2)
			.map(|w| (w[1].distance(goal) - w[0].distance(goal)).max(0.0))
			.sum()
	}

	#[test]
	fn unbuilt_planner_reports_missing_grid() {
		let mut p = PathPlanner::new(planar_config(), shape());
		assert_eq!(p.find_path(Point3::ZERO, Point3::new(1.0, 0.0, 0.0), None), Err(PathError::GridNotBuilt));
	}

	#[test]
	fn grid_is_built_once() {
		let world = World::empty();
		let mut p = planner(planar_config(), &world);
		p.build(Point3::new(5.0, 0.0, 5.0), &world);
		assert_eq!(p.grid().unwrap().center(), Point3::ZERO);
	}

	#[test]
	fn straight_corridor_keeps_every_cell() {
		let mut p = planner(planar_config(), &World::empty());
		let path = p.find_path(Point3::ZERO, Point3::new(5.0, 0.0, 0.0), None).unwrap();
		assert_eq!(path.len(), 6);
		assert_eq!(path.first(), Some(Point3::ZERO));
		assert_eq!(path.last(), Some(Point3::new(5.0, 0.0, 0.0)));
		assert!((path.total_length() - 5.0).abs() < 1e-4);
	}

	#[test]
	fn straight_corridor_collapses_when_simplifying() {
		let config = PlannerConfig { simplify_collinear: true, ..planar_config() };
		let mut p = planner(config, &World::empty());
		let path = p.find_path(Point3::ZERO, Point3::new(5.0, 0.0, 0.0), None).unwrap();
		assert_eq!(path.waypoints(), &[Point3::ZERO, Point3::new(5.0, 0.0, 0.0)]);
	}

	#[test]
	fn same_cell_yields_single_waypoint() {
		let mut p = planner(planar_config(), &World::empty());
		let path = p.find_path(Point3::new(0.1, 0.0, 0.0), Point3::new(-0.2, 0.0, 0.1), None).unwrap();
		assert_eq!(path.waypoints(), &[Point3::ZERO]);
	}

	#[test]
	fn detours_around_wall_with_valid_steps() {
		let world = World::new(vec![wall(Point3::new(3.0, 0.0, 0.0), 0.2, 4.2)]);
		let mut p = planner(planar_config(), &world);
		let goal = Point3::new(6.0, 0.0, 0.0);
		let path = p.find_path(Point3::ZERO, goal, None).unwrap();
		let grid = p.grid().unwrap();
		assert_valid(&path, grid);
		assert_eq!(path.first(), Some(Point3::ZERO));
		assert_eq!(path.last(), Some(goal));
		assert!(path.waypoints().iter().any(|w| w.z.abs() >= 5.0));
	}

	#[test]
	fn climbs_over_low_wall_in_3d() {
		let config = PlannerConfig {
			grid: GridConfig { cell_size: 1.0, extent: Point3::new(12.0, 6.0, 12.0) },
			max_iterations: 5000,
			..PlannerConfig::default()
		};
		let world = World::new(vec![Obstacle::cuboid(Point3::new(3.0, 0.0, 0.0), Point3::new(0.2, 1.2, 5.2))]);
		let mut p = planner(config, &world);
		let path = p.find_path(Point3::ZERO, Point3::new(6.0, 0.0, 0.0), None).unwrap();
		assert_valid(&path, p.grid().unwrap());
		assert_eq!(path.last(), Some(Point3::new(6.0, 0.0, 0.0)));
	}

	#[test]
	fn blocked_goal_is_obstructed() {
		let world = World::new(vec![wall(Point3::new(4.0, 0.0, 0.0), 0.5, 0.5)]);
		let mut p = planner(planar_config(), &world);
		let err = p.find_path(Point3::ZERO, Point3::new(4.0, 0.0, 0.0), None).unwrap_err();
		assert_eq!(err, PathError::Obstructed { start: false, goal: true });
		assert!(!err.is_retryable());
	}

	#[test]
	fn enclosed_goal_has_no_path() {
		let world = World::new(vec![
			wall(Point3::new(4.0, 0.0, 0.0), 0.2, 1.2),
			wall(Point3::new(6.0, 0.0, 0.0), 0.2, 1.2),
			wall(Point3::new(5.0, 0.0, 1.0), 1.2, 0.2),
			wall(Point3::new(5.0, 0.0, -1.0), 1.2, 0.2),
		]);
		let mut p = planner(planar_config(), &world);
		let err = p.find_path(Point3::ZERO, Point3::new(5.0, 0.0, 0.0), None).unwrap_err();
		assert!(matches!(err, PathError::NoPathExists { .. }), "{err:?}");
		assert!(err.is_retryable());
	}

	#[test]
	fn iteration_cap_is_distinct_failure() {
		let config = PlannerConfig { max_iterations: 3, ..planar_config() };
		let mut p = planner(config, &World::empty());
		let err = p.find_path(Point3::ZERO, Point3::new(9.0, 0.0, 9.0), None).unwrap_err();
		assert_eq!(err, PathError::SearchExhausted { iterations: 3 });
	}

	#[test]
	fn searches_do_not_leak_costs() {
		let mut p = planner(planar_config(), &World::empty());
		let first = p.find_path(Point3::ZERO, Point3::new(5.0, 0.0, 0.0), None).unwrap();
		let _ = p.find_path(Point3::ZERO, Point3::new(-7.0, 0.0, 3.0), None).unwrap();
		let again = p.find_path(Point3::ZERO, Point3::new(5.0, 0.0, 0.0), None).unwrap();
		assert_eq!(first, again);
	}

	#[test]
	fn return_bias_prefers_detour_with_shorter_final_approach() {
		// The wall's lower end is closer to the start, its upper end closer to the goal.
		let world = World::new(vec![wall(Point3::ZERO, 0.2, 6.2)]);
		let start = Point3::new(-1.0, 0.0, -4.0);
		let goal = Point3::new(1.0, 0.0, 3.0);
		let mut p = planner(planar_config(), &world);
		let plain = p.find_path(start, goal, None).unwrap();
		let biased = p.find_path(start, goal, Some(goal)).unwrap();
		let grid = p.grid().unwrap();
		assert_valid(&plain, grid);
		assert_valid(&biased, grid);
		assert_eq!(biased.last(), Some(goal));
		assert_ne!(plain, biased);

		let lowest = |path: &Path| path.waypoints().iter().map(|w| w.z).fold(f32::INFINITY, f32::min);
		let highest = |path: &Path| path.waypoints().iter().map(|w| w.z).fold(f32::NEG_INFINITY, f32::max);
		assert!(lowest(&plain) <= -7.0 && highest(&plain) <= 3.0);
		assert!(highest(&biased) >= 7.0 && lowest(&biased) >= -4.0);

		let approach = |path: &Path| {
			let past_wall = path.waypoints().iter().position(|w| w.x >= 0.0).unwrap();
			Path::new(path.waypoints()[past_wall..].to_vec()).total_length()
		};
		assert!(approach(&biased) < approach(&plain) - 1.0);
		assert!(plain.total_length() < biased.total_length());
		assert!(backtracking(&biased, goal) < backtracking(&plain, goal) - 1.0);
	}
}
