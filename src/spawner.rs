use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::coords::Point3;
use crate::resources::{ResourceField, ResourceId};
use crate::world::OccupancySampler;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    pub enabled: bool,
    pub spawns_per_second: f32,
    pub center: Point3,
    pub radius: f32,
    /// No obstacle may lie within this distance of a spawned resource.
    pub clearance: f32,
    pub max_resources: usize,
    pub max_attempts: u32,
    pub seed: u64,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawns_per_second: 0.2,
            center: Point3::ZERO,
            radius: 20.0,
            clearance: 1.0,
            max_resources: 40,
            max_attempts: 16,
            seed: 42,
        }
    }
}

pub fn interval_from_rate(spawns_per_second: f32) -> Result<f32, ConfigError> {
    if !(spawns_per_second.is_finite() && spawns_per_second > 0.0) {
        return Err(ConfigError::Invalid {
            field: "spawns_per_second",
            reason: format!("must be a positive number, got {spawns_per_second}"),
        });
    }
    Ok(1.0 / spawns_per_second)
}

#[derive(Debug, Clone)]
pub struct ResourceSpawner {
    config: SpawnerConfig,
    interval: f32,
    until_next: f32,
    rng: StdRng,
}

impl ResourceSpawner {
    pub fn new(config: SpawnerConfig) -> Result<Self, ConfigError> {
        let interval = interval_from_rate(config.spawns_per_second)?;
        Ok(Self {
            config,
            interval,
            until_next: interval,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn set_spawns_per_second(&mut self, rate: f32) -> Result<(), ConfigError> {
        self.interval = interval_from_rate(rate)?;
        self.config.spawns_per_second = rate;
        self.until_next = self.until_next.min(self.interval);
        Ok(())
    }

    pub fn update(&mut self, dt: f32, sampler: &dyn OccupancySampler, field: &mut ResourceField) -> Option<ResourceId> {
        if !self.config.enabled {
            return None;
        }
        self.until_next -= dt;
        if self.until_next > 0.0 {
            return None;
        }
        self.until_next += self.interval;
        if field.len() >= self.config.max_resources {
            return None;
        }
        self.try_spawn(sampler, field)
    }

    /// Places one resource at a random clear point inside the spawn disc.
    pub fn try_spawn(&mut self, sampler: &dyn OccupancySampler, field: &mut ResourceField) -> Option<ResourceId> {
        for _ in 0..self.config.max_attempts {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = self.config.radius * self.rng.gen_range(0.0f32..1.0).sqrt();
            let position = self.config.center + Point3::new(angle.cos() * distance, 0.0, angle.sin() * distance);
            if sampler.is_clear(position, self.config.clearance) {
                let id = field.spawn(position);
                debug!(?id, "spawned resource at ({:.1}, {:.1})", position.x, position.z);
                return Some(id);
            }
        }
        warn!(attempts = self.config.max_attempts, "no clear spawn position found");
        None
    }
}
