use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::base::{Base, Delivery};
use crate::behavior::{self, StateTransition, TickContext};
use crate::config::{ConfigError, SimConfig};
use crate::coords::Point3;
use crate::drones::{Drone, DroneId, FactionId};
use crate::motion::{MotionController, Neighbor};
use crate::pathfinding::PathPlanner;
use crate::resources::{ResourceField, ResourceId};
use crate::spawner::{ResourceSpawner, SpawnerConfig};
use crate::world::World;

/// Radius of the ring drones start on around their base.
const SPAWN_RING_RADIUS: f32 = 3.0;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("No {what} registered for faction {}", .faction.0)]
	MissingCollaborator { faction: FactionId, what: &'static str },
	#[error("Unknown faction {}", .faction.0)]
	UnknownFaction { faction: FactionId },
	#[error("Drone speed must be positive, got {0}")]
	InvalidSpeed(f32),
	#[error("Cannot activate {requested} drones per faction (max {max})")]
	InvalidDroneCount { requested: usize, max: usize },
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Runtime adjustments coming from the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
	SetDroneSpeed(f32),
	/// Resources spawned per second; must be positive.
	SetSpawnRate(f32),
	SetPathVisible(bool),
	SetActiveDronesPerFaction(usize),
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
	pub spawned: Option<ResourceId>,
	pub deliveries: Vec<Delivery>,
	pub transitions: Vec<StateTransition>,
}

#[derive(Debug)]
pub struct Engine {
	pub world: World,
	pub bases: Vec<Base>,
	pub drones: Vec<Drone>,
	pub resources: ResourceField,
	spawner: ResourceSpawner,
	config: SimConfig,
	show_paths: bool,
	next_drone_id: u32,
	elapsed: f32,
	ticks: u64,
}

impl Engine {
	/// An engine with no bases or drones yet.
	pub fn new(world: World, config: SimConfig) -> Result<Self, EngineError> {
		config.validate()?;
		let spawner = ResourceSpawner::new(SpawnerConfig { clearance: config.spawn_clearance(), ..config.spawner })?;
		Ok(Self {
			world,
			bases: Vec::new(),
			drones: Vec::new(),
			resources: ResourceField::new(),
			spawner,
			show_paths: config.show_paths,
			config,
			next_drone_id: 1,
			elapsed: 0.0,
			ticks: 0,
		})
	}

	/// Scatters obstacles, places one base per faction and a full pool of drones
	/// around each, then activates `drones_per_faction` of them.
	pub fn from_config(config: SimConfig) -> Result<Self, EngineError> {
		let keep_clear: Vec<Point3> = config.factions.iter().map(|f| f.base).collect();
		let o = config.obstacles;
		let world = World::from_seed_with_distribution(o.count, o.half_size, &keep_clear, o.seed);
		let mut engine = Self::new(world, config)?;

		let factions = engine.config.factions.clone();
		let pool = engine.config.max_drones_per_faction;
		for faction in &factions {
			engine.add_base(faction.id, faction.base);
			for i in 0..pool {
				let angle = i as f32 / pool as f32 * std::f32::consts::TAU;
				let offset = Point3::new(angle.cos(), 0.0, angle.sin()) * SPAWN_RING_RADIUS;
				engine.add_drone(faction.id, faction.base + offset)?;
			}
		}
		engine.set_active_per_faction(engine.config.drones_per_faction)?;
		info!(
			factions = factions.len(),
			drones = engine.drones.len(),
			obstacles = engine.world.obstacles().len(),
			"session ready"
		);
		Ok(engine)
	}

	pub fn add_base(&mut self, faction: FactionId, position: Point3) {
		self.bases.push(Base::new(faction, position));
	}

	/// Adds an active drone homed on its faction's base. The drone's navigation grid
	/// is sampled here, around its spawn position.
	pub fn add_drone(&mut self, faction: FactionId, position: Point3) -> Result<DroneId, EngineError> {
		let Some(home) = self.base(faction).map(|b| b.position) else {
			error!(faction = faction.0, "cannot add drone without a base");
			return Err(EngineError::MissingCollaborator { faction, what: "base" });
		};
		let id = DroneId(self.next_drone_id);
		self.next_drone_id += 1;
		let planner = PathPlanner::new(self.config.planner, self.config.agent);
		let mut motion = MotionController::new(self.config.motion, planner);
		motion.prepare(position, &self.world);
		self.drones.push(Drone::new(id, faction, position, home, motion));
		Ok(id)
	}

	pub fn base(&self, faction: FactionId) -> Option<&Base> {
		self.bases.iter().find(|b| b.faction == faction)
	}

	pub fn drone(&self, id: DroneId) -> Option<&Drone> {
		self.drones.iter().find(|d| d.id == id)
	}

	/// Advances the session by one fixed step.
	pub fn tick(&mut self) -> TickReport {
		let dt = self.config.tick_seconds;
		let mut report = TickReport {
			spawned: self.spawner.update(dt, &self.world, &mut self.resources),
			..TickReport::default()
		};

		// Every active drone, whatever its faction; avoidance skips the drone's own entry.
		let snapshot: Vec<Neighbor> = self.drones.iter().filter(|d| d.active).map(Drone::neighbor).collect();

		for drone in self.drones.iter_mut().filter(|d| d.active) {
			let mut ctx = TickContext {
				dt,
				config: &self.config.behavior,
				resources: &mut self.resources,
				deliveries: &mut report.deliveries,
				transitions: &mut report.transitions,
			};
			behavior::update(drone, &mut ctx);
			drone.motion.update(drone.id, &mut drone.position, dt, &snapshot);
		}

		for delivery in &report.deliveries {
			match self.bases.iter_mut().find(|b| b.faction == delivery.faction) {
				Some(base) => {
					base.on_delivery(delivery);
				}
				None => warn!(faction = delivery.faction.0, "delivery for faction without a base dropped"),
			}
		}

		self.elapsed += dt;
		self.ticks += 1;
		report
	}

	pub fn apply(&mut self, command: Command) -> Result<(), EngineError> {
		match command {
			Command::SetDroneSpeed(speed) => {
				if !(speed.is_finite() && speed > 0.0) {
					return Err(EngineError::InvalidSpeed(speed));
				}
				self.config.motion.speed = speed;
				for d in &mut self.drones {
					d.motion.set_speed(speed);
				}
			}
			Command::SetSpawnRate(rate) => {
				self.spawner.set_spawns_per_second(rate)?;
				self.config.spawner.spawns_per_second = rate;
			}
			Command::SetPathVisible(visible) => self.show_paths = visible,
			Command::SetActiveDronesPerFaction(count) => self.set_active_per_faction(count)?,
		}
		Ok(())
	}

	/// Deactivates every drone, then reactivates the first `count` of each faction
	/// in list order.
	pub fn set_active_per_faction(&mut self, count: usize) -> Result<(), EngineError> {
		let max = self.config.max_drones_per_faction;
		if count > max {
			return Err(EngineError::InvalidDroneCount { requested: count, max });
		}
		for d in &mut self.drones {
			behavior::deactivate(d, &mut self.resources);
		}
		let mut activated: BTreeMap<FactionId, usize> = BTreeMap::new();
		for d in &mut self.drones {
			let n = activated.entry(d.faction).or_insert(0);
			if *n < count {
				d.active = true;
				*n += 1;
			}
		}
		self.config.drones_per_faction = count;
		info!(count, "active drones per faction updated");
		Ok(())
	}

	pub fn score(&self, faction: FactionId) -> Result<u32, EngineError> {
		self.base(faction).map(Base::collected).ok_or(EngineError::UnknownFaction { faction })
	}

	pub fn scores(&self) -> Vec<(FactionId, u32)> {
		self.bases.iter().map(|b| (b.faction, b.collected())).collect()
	}

	pub fn active_count(&self, faction: FactionId) -> usize {
		self.drones.iter().filter(|d| d.active && d.faction == faction).count()
	}

	pub fn show_paths(&self) -> bool {
		self.show_paths
	}

	pub fn spawner(&self) -> &ResourceSpawner {
		&self.spawner
	}

	pub fn config(&self) -> &SimConfig {
		&self.config
	}

	pub fn elapsed(&self) -> f32 {
		self.elapsed
	}

	pub fn ticks(&self) -> u64 {
		self.ticks
	}
}
