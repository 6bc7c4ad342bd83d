use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::drones::DroneId;

/// Exclusive-access arbiter for a single resource: one owner slot plus a FIFO
/// queue of drones waiting their turn.
///
/// When a queue exists, `release` hands ownership straight to the next waiting
/// drone, so the resource is never observed free between two holders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClaim {
    owner: Option<DroneId>,
    queue: VecDeque<DroneId>,
}

impl ResourceClaim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<DroneId> {
        self.owner
    }

    /// Claims a free resource. A busy resource queues the caller (once) and refuses.
    pub fn try_claim(&mut self, drone: DroneId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(drone);
                true
            }
            Some(owner) => {
                if owner != drone && !self.queue.contains(&drone) {
                    self.queue.push_back(drone);
                }
                false
            }
        }
    }

    pub fn release(&mut self) {
        self.owner = self.queue.pop_front();
    }

    pub fn is_in_queue(&self, drone: DroneId) -> bool {
        self.queue.contains(&drone)
    }

    pub fn remove_from_queue(&mut self, drone: DroneId) {
        self.queue.retain(|d| *d != drone);
    }

    pub fn is_current_owner(&self, drone: DroneId) -> bool {
        self.owner == Some(drone)
    }

    /// Drops every interest `drone` holds: releases ownership or leaves the queue.
    pub fn abandon(&mut self, drone: DroneId) {
        if self.is_current_owner(drone) {
            self.release();
        } else {
            self.remove_from_queue(drone);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = DroneId> + '_ {
        self.queue.iter().copied()
    }
}
