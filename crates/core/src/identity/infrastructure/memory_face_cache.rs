use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::identity::domain::cache_error::CacheError;
use crate::identity::domain::encoding::{Encoding, FaceId, NO_FACE};
use crate::identity::domain::face_cache::{validate_user_id, FaceCache};
use crate::identity::domain::profile::Profile;

/// In-memory identity store.
///
/// Entries keep insertion order so `query` scans deterministically. Minted
/// ids count down from -1; positive ids never collide with them.
#[derive(Clone, Debug)]
pub struct MemoryFaceCache {
    entries: Vec<(FaceId, Encoding)>,
    /// Sparse: ids without a recorded profile have none here.
    profiles: BTreeMap<FaceId, Profile>,
    /// `None` once the negative id space is used up.
    next_unknown: Option<FaceId>,
}

impl MemoryFaceCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            profiles: BTreeMap::new(),
            next_unknown: Some(-1),
        }
    }

    /// Callers guarantee unique non-zero ids and a counter below every
    /// stored negative id.
    pub(crate) fn from_parts(
        entries: Vec<(FaceId, Encoding)>,
        profiles: BTreeMap<FaceId, Profile>,
        next_unknown: Option<FaceId>,
    ) -> Self {
        Self {
            entries,
            profiles,
            next_unknown,
        }
    }

    pub(crate) fn entries(&self) -> &[(FaceId, Encoding)] {
        &self.entries
    }

    pub(crate) fn profiles(&self) -> &BTreeMap<FaceId, Profile> {
        &self.profiles
    }

    pub(crate) fn next_unknown(&self) -> Option<FaceId> {
        self.next_unknown
    }

    fn position(&self, id: FaceId) -> Option<usize> {
        self.entries.iter().position(|(eid, _)| *eid == id)
    }

    fn profile_mut(&mut self, id: FaceId) -> Result<&mut Profile, CacheError> {
        if self.position(id).is_none() {
            return Err(CacheError::UnknownId(id));
        }
        Ok(self.profiles.entry(id).or_default())
    }
}

impl Default for MemoryFaceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceCache for MemoryFaceCache {
    fn insert(&mut self, id: FaceId, encoding: Encoding) -> Result<(), CacheError> {
        validate_user_id(id)?;
        if self.position(id).is_some() {
            return Err(CacheError::DuplicateId(id));
        }
        self.entries.push((id, encoding));
        Ok(())
    }

    fn insert_unknown(&mut self, encoding: Encoding) -> Result<FaceId, CacheError> {
        let id = self.next_unknown.ok_or(CacheError::Exhausted)?;
        self.next_unknown = id.checked_sub(1);
        self.entries.push((id, encoding));
        Ok(id)
    }

    fn remove(&mut self, id: FaceId) -> Result<(), CacheError> {
        let pos = self.position(id).ok_or(CacheError::UnknownId(id))?;
        self.entries.remove(pos);
        self.profiles.remove(&id);
        Ok(())
    }

    fn rename(&mut self, old: FaceId, new: FaceId) -> Result<(), CacheError> {
        validate_user_id(new)?;
        let pos = self.position(old).ok_or(CacheError::UnknownId(old))?;
        if old == new {
            return Ok(());
        }
        // Last write wins: the moved encoding replaces whatever `new` held.
        let pos = match self.position(new) {
            Some(existing) => {
                self.entries.remove(existing);
                if existing < pos {
                    pos - 1
                } else {
                    pos
                }
            }
            None => pos,
        };
        self.entries[pos].0 = new;
        self.profiles.remove(&new);
        if let Some(profile) = self.profiles.remove(&old) {
            self.profiles.insert(new, profile);
        }
        Ok(())
    }

    fn retrieve(&self, id: FaceId) -> Result<Encoding, CacheError> {
        self.entries
            .iter()
            .find(|(eid, _)| *eid == id)
            .map(|(_, e)| e.clone())
            .ok_or(CacheError::UnknownId(id))
    }

    fn query(&self, encoding: &Encoding, tolerance: f64) -> FaceId {
        let limit = tolerance * tolerance;
        self.entries
            .iter()
            .find(|(_, stored)| stored.dissimilarity(encoding) < limit)
            .map(|(id, _)| *id)
            .unwrap_or(NO_FACE)
    }

    fn ids(&self) -> Vec<FaceId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn profile(&self, id: FaceId) -> Result<Profile, CacheError> {
        if self.position(id).is_none() {
            return Err(CacheError::UnknownId(id));
        }
        Ok(self.profiles.get(&id).cloned().unwrap_or_default())
    }

    fn set_name(&mut self, id: FaceId, name: Option<String>) -> Result<(), CacheError> {
        self.profile_mut(id)?.name = name;
        Ok(())
    }

    fn mark_seen(&mut self, id: FaceId, at: DateTime<Utc>) -> Result<(), CacheError> {
        self.profile_mut(id)?.mark_seen(at);
        Ok(())
    }
}
