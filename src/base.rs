use serde::{Deserialize, Serialize};

use crate::coords::Point3;
use crate::drones::FactionId;

/// Emitted when a drone finishes unloading at its home base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub faction: FactionId,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub faction: FactionId,
    pub position: Point3,
    collected: u32,
}

impl Base {
    pub fn new(faction: FactionId, position: Point3) -> Self {
        Self { faction, position, collected: 0 }
    }

    pub fn collected(&self) -> u32 {
        self.collected
    }

    /// Counts a delivery addressed to this base's faction; returns whether it applied.
    pub fn on_delivery(&mut self, delivery: &Delivery) -> bool {
        if delivery.faction != self.faction {
            return false;
        }
        self.collected = self.collected.saturating_add(delivery.amount);
        true
    }
}
