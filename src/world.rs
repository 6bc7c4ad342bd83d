use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::coords::Point3;

/// Static obstacle geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape")]
pub enum Obstacle {
    Sphere { center: Point3, radius: f32 },
    Cuboid { min: Point3, max: Point3 },
}

fn axis_gap(value: f32, min: f32, max: f32) -> f32 {
    (min - value).max(0.0).max(value - max)
}

impl Obstacle {
    pub fn cuboid(center: Point3, half_extents: Point3) -> Self {
        Obstacle::Cuboid {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Distance from `p` to the obstacle surface, zero when inside.
    pub fn distance_to_point(&self, p: Point3) -> f32 {
        match *self {
            Obstacle::Sphere { center, radius } => (p.distance(center) - radius).max(0.0),
            Obstacle::Cuboid { min, max } => Point3::new(
                axis_gap(p.x, min.x, max.x),
                axis_gap(p.y, min.y, max.y),
                axis_gap(p.z, min.z, max.z),
            )
            .length(),
        }
    }

    /// Distance from the vertical segment `bottom..bottom + height * UP` to the obstacle.
    pub fn distance_to_vertical_segment(&self, bottom: Point3, height: f32) -> f32 {
        let top_y = bottom.y + height;
        match *self {
            Obstacle::Sphere { center, radius } => {
                let closest = Point3::new(bottom.x, center.y.clamp(bottom.y, top_y), bottom.z);
                (closest.distance(center) - radius).max(0.0)
            }
            Obstacle::Cuboid { min, max } => {
                let dy = (min.y - top_y).max(0.0).max(bottom.y - max.y);
                Point3::new(axis_gap(bottom.x, min.x, max.x), dy, axis_gap(bottom.z, min.z, max.z))
                    .length()
            }
        }
    }
}

/// Occupancy queries against static geometry, used for grid sampling and spawn clearance.
pub trait OccupancySampler {
    fn overlaps_sphere(&self, center: Point3, radius: f32) -> bool;

    /// Sphere of `radius` swept straight up from `bottom` by `height`.
    fn overlaps_vertical_sweep(&self, bottom: Point3, height: f32, radius: f32) -> bool;

    fn is_clear(&self, center: Point3, radius: f32) -> bool {
        !self.overlaps_sphere(center, radius)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    obstacles: Vec<Obstacle>,
}

impl World {
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Scatters `count` pillars inside a square of `half_size` around the origin,
    /// keeping `keep_clear` points (e.g. bases) free of geometry.
    pub fn from_seed_with_distribution(count: usize, half_size: f32, keep_clear: &[Point3], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut obstacles = Vec::with_capacity(count);
        let mut attempts = 0;
        while obstacles.len() < count && attempts < count * 20 {
            attempts += 1;
            let center = Point3::new(
                rng.gen_range(-half_size..=half_size),
                0.0,
                rng.gen_range(-half_size..=half_size),
            );
            let half = Point3::new(rng.gen_range(0.5..2.0), 4.0, rng.gen_range(0.5..2.0));
            let pillar = Obstacle::cuboid(center, half);
            if keep_clear.iter().all(|p| pillar.distance_to_point(*p) > 4.0) {
                obstacles.push(pillar);
            }
        }
        Self { obstacles }
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }
}

impl OccupancySampler for World {
    fn overlaps_sphere(&self, center: Point3, radius: f32) -> bool {
        self.obstacles.iter().any(|o| o.distance_to_point(center) < radius)
    }

    fn overlaps_vertical_sweep(&self, bottom: Point3, height: f32, radius: f32) -> bool {
        self.obstacles
            .iter()
            .any(|o| o.distance_to_vertical_segment(bottom, height) < radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_distances() {
        let o = Obstacle::cuboid(Point3::ZERO, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(o.distance_to_point(Point3::ZERO), 0.0);
        assert_eq!(o.distance_to_point(Point3::new(3.0, 0.0, 0.0)), 2.0);
        // Segment passing under the box at x=0 reaches up into it.
        assert_eq!(o.distance_to_vertical_segment(Point3::new(0.0, -5.0, 0.0), 10.0), 0.0);
        assert_eq!(o.distance_to_vertical_segment(Point3::new(0.0, -5.0, 0.0), 2.0), 2.0);
    }

    #[test]
    fn sphere_distances() {
        let o = Obstacle::Sphere { center: Point3::new(0.0, 5.0, 0.0), radius: 1.0 };
        assert_eq!(o.distance_to_point(Point3::ZERO), 4.0);
        assert_eq!(o.distance_to_vertical_segment(Point3::new(2.0, 0.0, 0.0), 10.0), 1.0);
    }

    #[test]
    fn sampler_overlaps() {
        let w = World::new(vec![Obstacle::cuboid(Point3::ZERO, Point3::new(1.0, 1.0, 1.0))]);
        assert!(w.overlaps_sphere(Point3::new(1.2, 0.0, 0.0), 0.5));
        assert!(w.is_clear(Point3::new(2.0, 0.0, 0.0), 0.5));
        assert!(w.overlaps_vertical_sweep(Point3::new(0.0, -3.0, 0.0), 3.0, 0.1));
        assert!(!w.overlaps_vertical_sweep(Point3::new(0.0, -3.0, 0.0), 1.0, 0.1));
    }

    #[test]
    fn seeded_world_is_deterministic_and_keeps_clear_points() {
        let keep = [Point3::new(-10.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        let a = World::from_seed_with_distribution(12, 15.0, &keep, 7);
        let b = World::from_seed_with_distribution(12, 15.0, &keep, 7);
        assert_eq!(a.obstacles(), b.obstacles());
        for p in keep {
            assert!(a.is_clear(p, 4.0));
        }
    }
}
