use serde::{Deserialize, Serialize};

use crate::coords::{CellBox3, CellCoord3, Point3};
use crate::world::OccupancySampler;

/// Collision envelope of the agent that owns a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentShape {
    pub radius: f32,
    pub height: f32,
}

impl Default for AgentShape {
    fn default() -> Self {
        Self { radius: 0.5, height: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub cell_size: f32,
    /// World-space size of the sampled volume along each axis.
    pub extent: Point3,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { cell_size: 1.0, extent: Point3::new(40.0, 30.0, 40.0) }
    }
}

impl GridConfig {
    /// Cells per axis; always odd so the owner sits on a node centre.
    pub fn cells_per_axis(&self) -> CellCoord3 {
        let axis = |extent: f32| -> i32 {
            let half = (extent / (2.0 * self.cell_size)).round().max(0.0) as i32;
            half.saturating_mul(2).saturating_add(1)
        };
        CellCoord3::new(axis(self.extent.x), axis(self.extent.y), axis(self.extent.z))
    }

    /// Total number of cells, saturating instead of overflowing.
    pub fn cell_count(&self) -> u64 {
        let dims = self.cells_per_axis();
        (dims.x as u64).saturating_mul(dims.y as u64).saturating_mul(dims.z as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridNode {
    pub position: Point3,
    pub walkable: bool,
}

/// Static walkability grid centred on its owner's position at build time.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    center: Point3,
    cell_size: f32,
    bounds: CellBox3,
    half: CellCoord3,
    nodes: Vec<GridNode>,
}

impl SpatialGrid {
    pub fn build(center: Point3, config: &GridConfig, shape: AgentShape, sampler: &dyn OccupancySampler) -> Self {
        let dims = config.cells_per_axis();
        let bounds = CellBox3::new(CellCoord3::new(0, 0, 0), CellCoord3::new(dims.x - 1, dims.y - 1, dims.z - 1));
        let half = CellCoord3::new(dims.x / 2, dims.y / 2, dims.z / 2);
        let mut grid = Self {
            center,
            cell_size: config.cell_size,
            bounds,
            half,
            nodes: Vec::with_capacity(usize::try_from(config.cell_count()).unwrap_or(0)),
        };
        for cell in bounds.iter_cells() {
            let position = grid.cell_center(cell);
            let walkable = sample_walkable(sampler, position, shape);
            grid.nodes.push(GridNode { position, walkable });
        }
        grid
    }

    pub fn center(&self) -> Point3 {
        self.center
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn bounds(&self) -> CellBox3 {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn walkable_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.walkable).count()
    }

    /// Longest distance between two neighbouring node centres.
    pub fn max_step_distance(&self) -> f32 {
        self.cell_size * 3f32.sqrt()
    }

    pub fn index(&self, c: CellCoord3) -> Option<usize> {
        if !self.bounds.contains(c) {
            return None;
        }
        Some(self.linear_index(c))
    }

    /// Index of the (clamped) cell containing `p`.
    pub fn index_from_world(&self, p: Point3) -> usize {
        self.linear_index(self.cell_from_world(p))
    }

    fn linear_index(&self, c: CellCoord3) -> usize {
        let w = self.bounds.width();
        let h = self.bounds.height();
        ((c.z * h + c.y) * w + c.x) as usize
    }

    pub fn coord_of(&self, index: usize) -> CellCoord3 {
        let w = self.bounds.width() as usize;
        let h = self.bounds.height() as usize;
        CellCoord3::new((index % w) as i32, ((index / w) % h) as i32, (index / (w * h)) as i32)
    }

    pub fn node(&self, c: CellCoord3) -> Option<&GridNode> {
        self.index(c).map(|i| &self.nodes[i])
    }

    pub fn node_at(&self, index: usize) -> &GridNode {
        &self.nodes[index]
    }

    pub fn is_walkable(&self, c: CellCoord3) -> bool {
        self.node(c).is_some_and(|n| n.walkable)
    }

    pub fn cell_center(&self, c: CellCoord3) -> Point3 {
        self.center
            + Point3::new(
                (c.x - self.half.x) as f32,
                (c.y - self.half.y) as f32,
                (c.z - self.half.z) as f32,
            ) * self.cell_size
    }

    /// Maps a world position to a cell, clamping to the boundary when outside.
    pub fn cell_from_world(&self, p: Point3) -> CellCoord3 {
        let local = (p - self.center) * (1.0 / self.cell_size);
        let raw = CellCoord3::new(
            local.x.round() as i32 + self.half.x,
            local.y.round() as i32 + self.half.y,
            local.z.round() as i32 + self.half.z,
        );
        self.bounds.clamp(raw)
    }

    /// Walkable cells of the 26-neighbourhood around `c`.
    pub fn walkable_neighbors(&self, c: CellCoord3) -> impl Iterator<Item = CellCoord3> + '_ {
        (-1..=1)
            .flat_map(|dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (dx, dy, dz))))
            .filter(|&(dx, dy, dz)| (dx, dy, dz) != (0, 0, 0))
            .map(move |(dx, dy, dz)| c.offset(dx, dy, dz))
            .filter(move |n| self.is_walkable(*n))
    }
}

fn sample_walkable(sampler: &dyn OccupancySampler, position: Point3, shape: AgentShape) -> bool {
    let top = position + Point3::UP * shape.height;
    !(sampler.overlaps_sphere(position, shape.radius)
        || sampler.overlaps_sphere(top, shape.radius)
        || sampler.overlaps_vertical_sweep(position, shape.height, shape.radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Obstacle, World};

    fn small_config() -> GridConfig {
        GridConfig { cell_size: 1.0, extent: Point3::new(10.0, 4.0, 10.0) }
    }

    #[test]
    fn dimensions_are_odd_and_centered() {
        let grid = SpatialGrid::build(Point3::new(3.0, 0.0, -2.0), &small_config(), AgentShape::default(), &World::empty());
        assert_eq!(grid.bounds().width(), 11);
        assert_eq!(grid.bounds().height(), 5);
        assert_eq!(grid.len(), 11 * 5 * 11);
        let c = grid.cell_from_world(Point3::new(3.0, 0.0, -2.0));
        assert_eq!(grid.cell_center(c), Point3::new(3.0, 0.0, -2.0));
        assert_eq!(grid.walkable_count(), grid.len());
    }

    #[test]
    fn huge_extent_saturates_cell_counts() {
        let wide = GridConfig { cell_size: 0.5, extent: Point3::new(1.0e9, 1.0e9, 1.0e9) };
        assert_eq!(wide.cells_per_axis().x, 2_000_000_001);
        assert_eq!(wide.cell_count(), u64::MAX);

        let absurd = GridConfig { cell_size: 1.0, extent: Point3::new(1.0e12, 0.0, 0.0) };
        assert_eq!(absurd.cells_per_axis(), CellCoord3::new(i32::MAX, 1, 1));
        assert_eq!(absurd.cell_count(), i32::MAX as u64);
        assert_eq!(small_config().cell_count(), 11 * 5 * 11);
    }

    #[test]
    fn lookups_clamp_to_boundary() {
        let grid = SpatialGrid::build(Point3::ZERO, &small_config(), AgentShape::default(), &World::empty());
        let far = grid.cell_from_world(Point3::new(100.0, -100.0, 2.2));
        assert_eq!(far, CellCoord3::new(10, 0, 7));
    }

    #[test]
    fn index_round_trips_coordinates() {
        let grid = SpatialGrid::build(Point3::ZERO, &small_config(), AgentShape::default(), &World::empty());
        let c = CellCoord3::new(4, 3, 9);
        let i = grid.index(c).unwrap();
        assert_eq!(grid.coord_of(i), c);
        assert!(grid.index(CellCoord3::new(11, 0, 0)).is_none());
    }

    #[test]
    fn obstacles_mark_cells_unwalkable() {
        let world = World::new(vec![Obstacle::cuboid(Point3::new(2.0, 0.0, 0.0), Point3::new(0.2, 10.0, 0.2))]);
        let shape = AgentShape { radius: 0.3, height: 0.5 };
        let grid = SpatialGrid::build(Point3::ZERO, &small_config(), shape, &world);
        assert!(!grid.is_walkable(grid.cell_from_world(Point3::new(2.0, 0.0, 0.0))));
        assert!(grid.is_walkable(grid.cell_from_world(Point3::new(3.0, 0.0, 0.0))));
    }

    #[test]
    fn raised_sample_blocks_cell_below_overhang() {
        // Thin slab between the two samples; only the vertical sweep touches it.
        let world = World::new(vec![Obstacle::Cuboid {
            min: Point3::new(-0.5, 0.4, -0.5),
            max: Point3::new(0.5, 0.6, 0.5),
        }]);
        let shape = AgentShape { radius: 0.1, height: 1.0 };
        let grid = SpatialGrid::build(Point3::ZERO, &small_config(), shape, &world);
        assert!(!grid.is_walkable(grid.cell_from_world(Point3::ZERO)));
    }

    #[test]
    fn interior_cell_has_26_neighbors() {
        let grid = SpatialGrid::build(Point3::ZERO, &small_config(), AgentShape::default(), &World::empty());
        let c = CellCoord3::new(5, 2, 5);
        assert_eq!(grid.walkable_neighbors(c).count(), 26);
        assert_eq!(grid.walkable_neighbors(CellCoord3::new(0, 0, 0)).count(), 7);
    }

    #[test]
    fn neighborhood_is_symmetric() {
        let world = World::new(vec![
            Obstacle::cuboid(Point3::new(1.0, 0.0, 1.0), Point3::new(0.6, 10.0, 0.6)),
            Obstacle::Sphere { center: Point3::new(-2.0, 1.0, -2.0), radius: 1.0 },
        ]);
        let grid = SpatialGrid::build(Point3::ZERO, &small_config(), AgentShape { radius: 0.3, height: 0.5 }, &world);
        for a in grid.bounds().iter_cells().filter(|c| grid.is_walkable(*c)) {
            for b in grid.walkable_neighbors(a) {
                assert!(grid.walkable_neighbors(b).any(|n| n == a), "{a:?} -> {b:?} not symmetric");
            }
        }
    }
}
