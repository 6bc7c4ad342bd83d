use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::claim::ResourceClaim;
use crate::coords::Point3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub position: Point3,
    pub claim: ResourceClaim,
}

/// Live resources in the session, keyed by id in spawn order.
#[derive(Debug, Clone, Default)]
pub struct ResourceField {
    next_id: u32,
    items: BTreeMap<ResourceId, Resource>,
}

impl ResourceField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, position: Point3) -> ResourceId {
        self.next_id = self.next_id.saturating_add(1);
        let id = ResourceId(self.next_id);
        self.items.insert(id, Resource { id, position, claim: ResourceClaim::new() });
        id
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn remove(&mut self, id: ResourceId) -> Option<Resource> {
        self.items.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.items.values_mut()
    }

    /// Nearest resource within `radius` matching `filter`.
    pub fn nearest_within(
        &self,
        from: Point3,
        radius: f32,
        filter: impl Fn(&Resource) -> bool,
    ) -> Option<ResourceId> {
        self.items
            .values()
            .filter(|r| filter(r))
            .map(|r| (r.id, r.position.distance(from)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}
