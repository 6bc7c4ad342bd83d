use serde::{Deserialize, Serialize};

use crate::behavior::{DroneState, StateKind};
use crate::coords::Point3;
use crate::motion::{MotionController, Neighbor};
use crate::resources::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DroneId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactionId(pub u32);

impl FactionId {
	pub const RED: FactionId = FactionId(1);
	pub const BLUE: FactionId = FactionId(2);

	pub fn name(self) -> String {
		match self {
			FactionId::RED => "Red".to_string(),
			FactionId::BLUE => "Blue".to_string(),
			FactionId(n) => format!("Faction {}", n),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Drone {
	pub id: DroneId,
	pub faction: FactionId,
	pub position: Point3,
	pub home: Point3,
	pub motion: MotionController,
	pub(crate) active: bool,
	pub(crate) state: DroneState,
	pub(crate) carrying: bool,
	pub(crate) target: Option<ResourceId>,
	/// Resources whose goal cell is blocked in this drone's grid.
	pub(crate) unreachable: Vec<ResourceId>,
}

impl Drone {
	pub fn new(id: DroneId, faction: FactionId, position: Point3, home: Point3, motion: MotionController) -> Self {
		Self {
			id,
			faction,
			position,
			home,
			motion,
			active: true,
			state: DroneState::search(),
			carrying: false,
			target: None,
			unreachable: Vec::new(),
		}
	}

	pub fn state(&self) -> &DroneState {
		&self.state
	}

	pub fn state_kind(&self) -> StateKind {
		self.state.kind()
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn is_carrying(&self) -> bool {
		self.carrying
	}

	pub fn target(&self) -> Option<ResourceId> {
		self.target
	}

	pub fn neighbor(&self) -> Neighbor {
		Neighbor { id: self.id, position: self.position, velocity: self.motion.velocity() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::grid::AgentShape;
	use crate::motion::MotionConfig;
	use crate::pathfinding::{PathPlanner, PlannerConfig};

	#[test]
	fn drone_init() {
		let motion = MotionController::new(
			MotionConfig::default(),
			PathPlanner::new(PlannerConfig::default(), AgentShape::default()),
		);
		let d = Drone::new(DroneId(1), FactionId::RED, Point3::ZERO, Point3::ZERO, motion);
		assert_eq!(d.id, DroneId(1));
		assert_eq!(d.state_kind(), StateKind::Search);
		assert!(d.is_active());
		assert!(!d.is_carrying());
		assert!(d.target().is_none());
	}

	#[test]
	fn faction_names() {
		assert_eq!(FactionId::RED.name(), "Red");
		assert_eq!(FactionId::BLUE.name(), "Blue");
		assert_eq!(FactionId(7).name(), "Faction 7");
	}
}
