//! Path following with local separation from sibling drones.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::coords::{CellCoord3, Point3};
use crate::drones::DroneId;
use crate::pathfinding::{Path, PathError, PathPlanner};
use crate::world::OccupancySampler;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub speed: f32,
    pub waypoint_reached_distance: f32,
    pub arrival_distance: f32,
    /// Seconds between stall checks, also the retry delay after a failed request.
    pub path_update_interval: f32,
    pub smooth_time: f32,
    pub avoidance_radius: f32,
    pub avoidance_force: f32,
    pub max_avoidance: f32,
    pub prediction_time: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: 5.0,
            waypoint_reached_distance: 0.5,
            arrival_distance: 0.2,
            path_update_interval: 2.0,
            smooth_time: 0.1,
            avoidance_radius: 2.0,
            avoidance_force: 2.0,
            max_avoidance: 5.0,
            prediction_time: 1.0,
        }
    }
}

/// Snapshot of a sibling drone taken at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: DroneId,
    pub position: Point3,
    pub velocity: Point3,
}

#[derive(Debug, Clone)]
pub struct MotionController {
    config: MotionConfig,
    planner: PathPlanner,
    destination: Option<Point3>,
    return_bias: bool,
    path: Option<Path>,
    path_index: usize,
    velocity: Point3,
    moving: bool,
    arrived: bool,
    since_path_update: f32,
    retry_cooldown: f32,
    last_error: Option<PathError>,
}

impl MotionController {
    pub fn new(config: MotionConfig, planner: PathPlanner) -> Self {
        Self {
            config,
            planner,
            destination: None,
            return_bias: false,
            path: None,
            path_index: 0,
            velocity: Point3::ZERO,
            moving: false,
            arrived: false,
            since_path_update: 0.0,
            retry_cooldown: 0.0,
            last_error: None,
        }
    }

    /// Builds the navigation grid around `owner`; must run before the first destination.
    pub fn prepare(&mut self, owner: Point3, sampler: &dyn OccupancySampler) {
        self.planner.build(owner, sampler);
    }

    pub fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    /// Starts a move toward `target`. Dropped while already moving or while a failed
    /// request is cooling down. Returns whether a path is now being followed.
    pub fn set_destination(&mut self, position: Point3, target: Point3, return_bias: bool) -> bool {
        if self.moving || self.retry_cooldown > 0.0 {
            return false;
        }
        self.destination = Some(target);
        self.return_bias = return_bias;
        self.moving = true;
        self.arrived = false;
        self.request_path(position)
    }

    fn request_path(&mut self, position: Point3) -> bool {
        let Some(destination) = self.destination else {
            return false;
        };
        let bias = self.return_bias.then_some(destination);
        match self.planner.find_path(position, destination, bias) {
            Ok(path) => {
                self.path_index = 0;
                if path.len() > 1
                    && path.first().is_some_and(|p| p.distance(position) < self.config.waypoint_reached_distance)
                {
                    self.path_index = 1;
                }
                self.path = Some(path);
                self.since_path_update = 0.0;
                self.last_error = None;
                true
            }
            Err(err) => {
                if err == PathError::GridNotBuilt {
                    error!("navigation grid missing; motion disabled until prepared");
                } else {
                    warn!(%err, "failed to plan path to ({:.1}, {:.1}, {:.1})", destination.x, destination.y, destination.z);
                }
                self.halt();
                self.retry_cooldown = self.config.path_update_interval;
                self.last_error = Some(err);
                false
            }
        }
    }

    fn halt(&mut self) {
        self.moving = false;
        self.path = None;
        self.velocity = Point3::ZERO;
    }

    /// Advances `position` by one tick along the current path.
    pub fn update(&mut self, id: DroneId, position: &mut Point3, dt: f32, neighbors: &[Neighbor]) {
        self.retry_cooldown = (self.retry_cooldown - dt).max(0.0);
        if !self.moving {
            return;
        }
        let (Some(destination), Some(path)) = (self.destination, self.path.as_ref()) else {
            return;
        };
        if position.distance(destination) <= self.config.arrival_distance {
            self.arrived = true;
            self.halt();
            return;
        }

        let last_index = path.len().saturating_sub(1);
        let steer_to = if self.path_index >= last_index {
            destination
        } else {
            path.get(self.path_index).unwrap_or(destination)
        };
        let desired = (steer_to - *position).normalized() * self.config.speed;
        let avoidance = avoidance_velocity(&self.config, id, *position, neighbors);
        let blend = if self.config.smooth_time > 0.0 {
            1.0 - (-dt / self.config.smooth_time).exp()
        } else {
            1.0
        };
        self.velocity = self.velocity.lerp(desired + avoidance, blend);
        *position += self.velocity * dt;

        if self.path_index < last_index {
            if let Some(waypoint) = path.get(self.path_index) {
                if position.distance(waypoint) < self.config.waypoint_reached_distance {
                    self.path_index += 1;
                }
            }
        }

        self.since_path_update += dt;
        if self.since_path_update >= self.config.path_update_interval {
            let waypoint = path.get(self.path_index).unwrap_or(destination);
            if position.distance(waypoint) > self.config.waypoint_reached_distance * 2.0 {
                self.request_path(*position);
            }
        }
    }

    pub fn has_reached_destination(&self) -> bool {
        self.arrived
    }

    /// Drops the current path and velocity. Safe to call when idle.
    pub fn stop_moving(&mut self) {
        self.halt();
        self.destination = None;
        self.last_error = None;
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn velocity(&self) -> Point3 {
        self.velocity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn path_index(&self) -> usize {
        self.path_index
    }

    pub fn destination(&self) -> Option<Point3> {
        self.destination
    }

    pub fn speed(&self) -> f32 {
        self.config.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.config.speed = speed;
    }

    pub fn is_cooling_down(&self) -> bool {
        self.retry_cooldown > 0.0
    }

    /// Why the latest path request failed. Cleared by a successful request or `stop_moving`.
    pub fn path_error(&self) -> Option<PathError> {
        self.last_error
    }

    /// Grid cell the drone currently occupies, if the grid exists.
    pub fn current_cell(&self, position: Point3) -> Option<CellCoord3> {
        self.planner.grid().map(|g| g.cell_from_world(position))
    }
}

/// Repulsion away from siblings inside the avoidance radius, using each sibling's
/// predicted position. Strength falls off linearly with distance; the sum is capped.
pub fn avoidance_velocity(config: &MotionConfig, id: DroneId, position: Point3, neighbors: &[Neighbor]) -> Point3 {
    let mut total = Point3::ZERO;
    for other in neighbors.iter().filter(|n| n.id != id) {
        let offset = position - other.position;
        let distance = offset.length();
        if distance >= config.avoidance_radius {
            continue;
        }
        let predicted = other.position + other.velocity * config.prediction_time;
        let mut away = (position - predicted).normalized();
        if away == Point3::ZERO {
            away = offset.normalized();
        }
        if away == Point3::ZERO {
            // Coincident: split deterministically along x.
            away = if id < other.id { Point3::new(-1.0, 0.0, 0.0) } else { Point3::new(1.0, 0.0, 0.0) };
        }
        let strength = config.avoidance_force * (1.0 - distance / config.avoidance_radius);
        total += away * strength;
    }
    total.clamp_length(config.max_avoidance)
}
