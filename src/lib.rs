pub mod base;
pub mod behavior;
pub mod claim;
pub mod config;
pub mod coords;
pub mod drones;
pub mod engine;
pub mod grid;
pub mod hud;
pub mod motion;
pub mod pathfinding;
pub mod resources;
pub mod spawner;
pub mod world;

// Re-exports for convenience in tests and integration users.
pub use base::{Base, Delivery};
pub use behavior::{BehaviorConfig, DroneState, StateKind, StateTransition};
pub use claim::ResourceClaim;
pub use config::{ConfigError, SimConfig};
pub use coords::{CellBox3, CellCoord3, Point3};
pub use drones::{Drone, DroneId, FactionId};
pub use engine::{Command, Engine, EngineError, TickReport};
pub use grid::{AgentShape, GridConfig, SpatialGrid};
pub use hud::{format_hud, format_side_panel};
pub use motion::{MotionConfig, MotionController};
pub use pathfinding::{Path, PathError, PathPlanner, PlannerConfig};
pub use resources::{Resource, ResourceField, ResourceId};
pub use spawner::{ResourceSpawner, SpawnerConfig};
pub use world::{Obstacle, OccupancySampler, World};
