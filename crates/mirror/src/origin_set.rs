use std::collections::HashMap;

use crossframe_common::InstanceId;

use crate::error::MirrorError;
use crate::origin::Origin;

/// Dense store of the origins owned by one thread.
#[derive(Debug, Default)]
pub struct OriginSet {
    origins: Vec<Origin>,
    index: HashMap<InstanceId, usize>,
}

impl OriginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an origin. Returns its id.
    pub fn insert(&mut self, origin: Origin) -> InstanceId {
        let id = origin.id();
        match self.index.get(&id) {
            Some(&i) => self.origins[i] = origin,
            None => {
                self.index.insert(id, self.origins.len());
                self.origins.push(origin);
            }
        }
        id
    }

    pub fn get(&self, id: InstanceId) -> Option<&Origin> {
        self.index.get(&id).map(|&i| &self.origins[i])
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Origin> {
        self.index.get(&id).map(|&i| &mut self.origins[i])
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.index.contains_key(&id)
    }

    /// Remove an origin, moving the last one into its slot.
    pub fn remove(&mut self, id: InstanceId) -> Option<Origin> {
        let i = self.index.remove(&id)?;
        let origin = self.origins.swap_remove(i);
        if let Some(moved) = self.origins.get(i) {
            self.index.insert(moved.id(), i);
        }
        Some(origin)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Origin> {
        self.origins.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Origin> {
        self.origins.iter_mut()
    }

    /// Publish every dirty origin. Returns how many were published.
    pub fn publish_all(&mut self) -> Result<usize, MirrorError> {
        let mut published = 0;
        for origin in &mut self.origins {
            if origin.publish()? {
                published += 1;
            }
        }
        Ok(published)
    }
}
