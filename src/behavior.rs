//! Harvest cycle state machine.
//!
//! Each drone carries a [`DroneState`] tag; the free functions here take the drone
//! and a [`TickContext`] explicitly and return the next state, so states hold no
//! reference back to their drone. Timed steps (collecting, unloading) are countdown
//! fields advanced once per tick.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::base::Delivery;
use crate::drones::{Drone, DroneId};
use crate::pathfinding::PathError;
use crate::resources::{ResourceField, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
	Search,
	MoveToResource,
	Collect,
	MoveToHome,
	Unload,
}

impl StateKind {
	pub fn label(self) -> &'static str {
		match self {
			StateKind::Search => "Searching",
			StateKind::MoveToResource => "To resource",
			StateKind::Collect => "Collecting",
			StateKind::MoveToHome => "Returning",
			StateKind::Unload => "Unloading",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DroneState {
	Search { scan_timer: f32, pending: Option<ResourceId> },
	MoveToResource,
	Collect { remaining: Option<f32> },
	MoveToHome,
	Unload { remaining: Option<f32> },
}

impl DroneState {
	pub fn search() -> Self {
		DroneState::Search { scan_timer: 0.0, pending: None }
	}

	pub fn kind(&self) -> StateKind {
		match self {
			DroneState::Search { .. } => StateKind::Search,
			DroneState::MoveToResource => StateKind::MoveToResource,
			DroneState::Collect { .. } => StateKind::Collect,
			DroneState::MoveToHome => StateKind::MoveToHome,
			DroneState::Unload { .. } => StateKind::Unload,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
	pub scan_interval: f32,
	pub search_radius: f32,
	pub resource_arrival_distance: f32,
	pub home_arrival_distance: f32,
	pub collect_duration: f32,
	pub unload_duration: f32,
}

impl Default for BehaviorConfig {
	fn default() -> Self {
		Self {
			scan_interval: 0.5,
			search_radius: 25.0,
			resource_arrival_distance: 0.7,
			home_arrival_distance: 2.0,
			collect_duration: 2.0,
			unload_duration: 2.0,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
	pub drone: DroneId,
	pub from: StateKind,
	pub to: StateKind,
}

pub struct TickContext<'a> {
	pub dt: f32,
	pub config: &'a BehaviorConfig,
	pub resources: &'a mut ResourceField,
	pub deliveries: &'a mut Vec<Delivery>,
	pub transitions: &'a mut Vec<StateTransition>,
}

/// Runs one behaviour tick for `drone`.
pub fn update(drone: &mut Drone, ctx: &mut TickContext) {
	let next = match drone.state {
		DroneState::Search { .. } => update_search(drone, ctx),
		DroneState::MoveToResource => update_move_to_resource(drone, ctx),
		DroneState::Collect { .. } => update_collect(drone, ctx),
		DroneState::MoveToHome => update_move_to_home(drone, ctx),
		DroneState::Unload { .. } => update_unload(drone, ctx),
	};
	if let Some(next) = next {
		change_state(drone, ctx, next);
	}
}

fn change_state(drone: &mut Drone, ctx: &mut TickContext, next: DroneState) {
	let mut next = next;
	loop {
		exit(drone, ctx);
		let from = drone.state.kind();
		drone.state = next;
		ctx.transitions.push(StateTransition { drone: drone.id, from, to: next.kind() });
		debug!(drone = drone.id.0, ?from, to = ?next.kind(), "state change");
		match enter(drone, ctx) {
			Some(redirect) => next = redirect,
			None => return,
		}
	}
}

fn enter(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	match drone.state {
		DroneState::Search { .. } => {
			drone.target = None;
			None
		}
		DroneState::MoveToResource => {
			let position = drone.target.and_then(|id| ctx.resources.get(id)).map(|r| r.position);
			match position {
				Some(p) => {
					drone.motion.set_destination(drone.position, p, false);
					give_up_if_unreachable(drone, ctx)
				}
				None => Some(DroneState::search()),
			}
		}
		DroneState::Collect { .. } | DroneState::Unload { .. } => {
			drone.motion.stop_moving();
			None
		}
		DroneState::MoveToHome => {
			drone.motion.set_destination(drone.position, drone.home, true);
			None
		}
	}
}

fn exit(drone: &mut Drone, ctx: &mut TickContext) {
	match drone.state {
		DroneState::Search { pending: Some(id), .. } => leave_queue(drone.id, id, ctx.resources),
		DroneState::MoveToResource | DroneState::MoveToHome => drone.motion.stop_moving(),
		_ => {}
	}
}

fn leave_queue(drone: DroneId, id: ResourceId, resources: &mut ResourceField) {
	if let Some(resource) = resources.get_mut(id) {
		if !resource.claim.is_current_owner(drone) {
			resource.claim.remove_from_queue(drone);
		}
	}
}

fn update_search(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	if drone.carrying {
		return Some(DroneState::MoveToHome);
	}
	let me = drone.id;
	let position = drone.position;
	let DroneState::Search { scan_timer, pending } = &mut drone.state else {
		return None;
	};
	*scan_timer -= ctx.dt;
	if *scan_timer > 0.0 {
		return None;
	}
	*scan_timer = ctx.config.scan_interval;

	let unreachable = &mut drone.unreachable;
	unreachable.retain(|id| ctx.resources.contains(*id));
	let radius = ctx.config.search_radius;
	let free = ctx
		.resources
		.nearest_within(position, radius, |r| !r.claim.is_claimed() && !unreachable.contains(&r.id));

	if let Some(id) = *pending {
		match ctx.resources.get(id) {
			Some(r) if r.claim.is_current_owner(me) => {
				*pending = None;
				drone.target = Some(id);
				return Some(DroneState::MoveToResource);
			}
			// Keep the queue slot unless something free turned up; exit() leaves the queue.
			Some(r) if r.claim.is_in_queue(me) => {
				let found = free?;
				let resource = ctx.resources.get_mut(found)?;
				if !resource.claim.try_claim(me) {
					return None;
				}
				drone.target = Some(found);
				return Some(DroneState::MoveToResource);
			}
			_ => *pending = None,
		}
	}

	let found = free.or_else(|| {
		ctx.resources
			.nearest_within(position, radius, |r| !r.claim.is_current_owner(me) && !unreachable.contains(&r.id))
	})?;
	let resource = ctx.resources.get_mut(found)?;
	if resource.claim.try_claim(me) {
		drone.target = Some(found);
		Some(DroneState::MoveToResource)
	} else {
		*pending = Some(found);
		None
	}
}

fn update_move_to_resource(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	let resource = drone.target.and_then(|id| ctx.resources.get(id));
	let Some(resource) = resource.filter(|r| r.claim.is_current_owner(drone.id)) else {
		return Some(DroneState::search());
	};
	let target = resource.position;
	drone.motion.set_destination(drone.position, target, false);
	if let Some(next) = give_up_if_unreachable(drone, ctx) {
		return Some(next);
	}
	if drone.position.distance(target) <= ctx.config.resource_arrival_distance {
		return Some(DroneState::Collect { remaining: None });
	}
	None
}

/// After a path failure that retrying cannot fix, hands the claim on and goes back to
/// searching. A blocked goal cell is remembered so the next scan skips the resource.
fn give_up_if_unreachable(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	let err = drone.motion.path_error().filter(|e| !e.is_retryable())?;
	let id = drone.target.take()?;
	if let Some(resource) = ctx.resources.get_mut(id) {
		if resource.claim.is_current_owner(drone.id) {
			resource.claim.release();
		}
	}
	if matches!(err, PathError::Obstructed { goal: true, .. }) {
		drone.unreachable.push(id);
	}
	warn!(drone = drone.id.0, resource = id.0, %err, "giving up on resource");
	Some(DroneState::search())
}

fn update_collect(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	let DroneState::Collect { remaining } = &mut drone.state else {
		return None;
	};
	if !countdown(remaining, ctx.config.collect_duration, ctx.dt) {
		return None;
	}
	let Some(id) = drone.target else {
		return Some(DroneState::search());
	};
	match ctx.resources.get_mut(id) {
		Some(resource) => {
			resource.claim.release();
			ctx.resources.remove(id);
			drone.target = None;
			drone.carrying = true;
			Some(DroneState::MoveToHome)
		}
		None => Some(DroneState::search()),
	}
}

fn update_move_to_home(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	if drone.position.distance(drone.home) <= ctx.config.home_arrival_distance {
		return Some(DroneState::Unload { remaining: None });
	}
	if !drone.motion.is_moving() {
		drone.motion.set_destination(drone.position, drone.home, true);
	}
	None
}

fn update_unload(drone: &mut Drone, ctx: &mut TickContext) -> Option<DroneState> {
	let DroneState::Unload { remaining } = &mut drone.state else {
		return None;
	};
	if !countdown(remaining, ctx.config.unload_duration, ctx.dt) {
		return None;
	}
	drone.carrying = false;
	ctx.deliveries.push(Delivery { faction: drone.faction, amount: 1 });
	Some(DroneState::search())
}

/// Starts the timer on the first tick, then counts down; true once it has run out.
fn countdown(remaining: &mut Option<f32>, duration: f32, dt: f32) -> bool {
	match remaining {
		None => {
			*remaining = Some(duration);
			false
		}
		Some(t) => {
			*t -= dt;
			*t <= 0.0
		}
	}
}

/// Takes a drone out of the cycle: drops its claim or queue slot, stops motion and
/// resets it to a fresh search. Cargo stays aboard and is delivered once reactivated.
pub fn deactivate(drone: &mut Drone, resources: &mut ResourceField) {
	let mut interests: Vec<ResourceId> = drone.target.into_iter().collect();
	if let DroneState::Search { pending: Some(id), .. } = drone.state {
		interests.push(id);
	}
	for id in interests {
		if let Some(resource) = resources.get_mut(id) {
			resource.claim.abandon(drone.id);
		}
	}
	drone.motion.stop_moving();
	drone.state = DroneState::search();
	drone.target = None;
	drone.active = false;
}
