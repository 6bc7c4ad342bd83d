use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::behavior::BehaviorConfig;
use crate::coords::Point3;
use crate::drones::FactionId;
use crate::grid::AgentShape;
use crate::motion::MotionConfig;
use crate::pathfinding::PlannerConfig;
use crate::spawner::{SpawnerConfig, interval_from_rate};

/// Upper bound on cells in one drone's navigation grid.
pub const MAX_GRID_CELLS: u64 = 2_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactionSpec {
    pub id: FactionId,
    pub base: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub count: usize,
    /// Obstacles are scattered over a square of this half width around the origin.
    pub half_size: f32,
    pub seed: u64,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self { count: 14, half_size: 18.0, seed: 7 }
    }
}

/// Everything needed to start a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tick_seconds: f32,
    pub show_paths: bool,
    pub drones_per_faction: usize,
    pub max_drones_per_faction: usize,
    pub factions: Vec<FactionSpec>,
    pub agent: AgentShape,
    pub planner: PlannerConfig,
    pub motion: MotionConfig,
    pub behavior: BehaviorConfig,
    pub spawner: SpawnerConfig,
    pub obstacles: ObstacleConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1.0 / 60.0,
            show_paths: true,
            drones_per_faction: 5,
            max_drones_per_faction: 10,
            factions: vec![
                FactionSpec { id: FactionId::RED, base: Point3::new(-12.0, 0.0, 0.0) },
                FactionSpec { id: FactionId::BLUE, base: Point3::new(12.0, 0.0, 0.0) },
            ],
            agent: AgentShape::default(),
            planner: PlannerConfig::default(),
            motion: MotionConfig::default(),
            behavior: BehaviorConfig::default(),
            spawner: SpawnerConfig { radius: 15.0, ..SpawnerConfig::default() },
            obstacles: ObstacleConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parses a JSON document; missing sections fall back to their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("tick_seconds", self.tick_seconds)?;
        positive("motion.speed", self.motion.speed)?;
        positive("planner.grid.cell_size", self.planner.grid.cell_size)?;
        positive("agent.radius", self.agent.radius)?;
        let cells = self.planner.grid.cell_count();
        if cells > MAX_GRID_CELLS {
            return Err(invalid(
                "planner.grid.extent",
                format!("{cells} cells exceeds the limit of {MAX_GRID_CELLS}"),
            ));
        }
        if self.planner.max_iterations == 0 {
            return Err(invalid("planner.max_iterations", "must be at least 1"));
        }
        if self.factions.is_empty() {
            return Err(invalid("factions", "at least one faction is required"));
        }
        for (i, f) in self.factions.iter().enumerate() {
            if self.factions[..i].iter().any(|other| other.id == f.id) {
                return Err(invalid("factions", format!("duplicate faction id {}", f.id.0)));
            }
        }
        if self.drones_per_faction > self.max_drones_per_faction {
            return Err(invalid(
                "drones_per_faction",
                format!("{} exceeds max_drones_per_faction {}", self.drones_per_faction, self.max_drones_per_faction),
            ));
        }
        interval_from_rate(self.spawner.spawns_per_second)?;
        Ok(())
    }

    /// Obstacle clearance used when spawning resources. Never smaller than the
    /// distance that keeps the nearest grid cell of any drone walkable.
    pub fn spawn_clearance(&self) -> f32 {
        let snap = self.planner.grid.cell_size * 3f32.sqrt() / 2.0;
        self.spawner.clearance.max(self.agent.radius + self.agent.height + snap)
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {value}")))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}
