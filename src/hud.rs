use crate::drones::{Drone, FactionId};

pub fn format_hud(scores: &[(FactionId, u32)], resources_left: usize) -> String {
	let mut parts: Vec<String> = scores.iter().map(|(f, n)| format!("{}: {}", f.name(), n)).collect();
	parts.push(format!("Resources: {}", resources_left));
	parts.join(" | ")
}

pub fn format_side_panel(drones: &[Drone]) -> Vec<String> {
	let mut out = Vec::new();
	out.push("[Drones]".to_string());
	for d in drones.iter().filter(|d| d.is_active()) {
		let cargo = if d.is_carrying() { " (loaded)" } else { "" };
		let target = d.target().map(|r| format!("resource #{}", r.0)).unwrap_or_else(|| "None".to_string());
		out.push(format!(
			"Drone #{} [{}] – {}{} – {}",
			d.id.0,
			d.faction.name(),
			d.state_kind().label(),
			cargo,
			target
		));
	}
	let idle = drones.iter().filter(|d| !d.is_active()).count();
	if idle > 0 {
		out.push(format!("{} inactive", idle));
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coords::Point3;
	use crate::drones::DroneId;
	use crate::grid::AgentShape;
	use crate::motion::{MotionConfig, MotionController};
	use crate::pathfinding::{PathPlanner, PlannerConfig};

	fn drone(id: u32, faction: FactionId) -> Drone {
		let motion = MotionController::new(
			MotionConfig::default(),
			PathPlanner::new(PlannerConfig::default(), AgentShape::default()),
		);
		Drone::new(DroneId(id), faction, Point3::ZERO, Point3::ZERO, motion)
	}

	#[test]
	fn hud_format() {
		let s = format_hud(&[(FactionId::RED, 3), (FactionId::BLUE, 5)], 7);
		assert_eq!(s, "Red: 3 | Blue: 5 | Resources: 7");
	}

	#[test]
	fn side_panel_lists_active_drones() {
		let mut parked = drone(2, FactionId::BLUE);
		parked.active = false;
		let drones = vec![drone(1, FactionId::RED), parked];
		let lines = format_side_panel(&drones);
		assert_eq!(lines[0], "[Drones]");
		assert!(lines.iter().any(|l| l.contains("Drone #1 [Red]") && l.contains("Searching")));
		assert!(!lines.iter().any(|l| l.contains("Drone #2")));
		assert_eq!(lines.last().map(String::as_str), Some("1 inactive"));
	}
}
