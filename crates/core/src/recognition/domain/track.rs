//! Per-identity lifetime bookkeeping.
//!
//! A track is created on an identity's first detection and refreshed to the
//! full budget whenever that identity is matched again. Every frame it goes
//! unmatched costs one unit; it disappears on the `ttl_max`-th consecutive
//! miss, which lets brief detection dropouts pass without churn.
use std::collections::{BTreeMap, HashSet};

use crate::identity::domain::encoding::{Encoding, FaceId};
use crate::recognition::domain::face_event::FaceEvent;
use crate::shared::rectangle::Rectangle;

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: FaceId,
    /// Unmatched frames still tolerated, counting the current one.
    pub ttl: u32,
    pub rect: Rectangle,
}

/// One face resolved to an identity in the current frame.
#[derive(Clone, Debug)]
pub struct Sighting {
    pub id: FaceId,
    pub rect: Rectangle,
    pub encoding: Encoding,
}

pub struct TrackTable {
    /// Ordered so stale tracks are reported in id order.
    tracks: BTreeMap<FaceId, Track>,
    ttl_max: u32,
}

impl TrackTable {
    pub fn new(ttl_max: u32) -> Self {
        Self {
            tracks: BTreeMap::new(),
            ttl_max,
        }
    }

    /// Applies one frame's sightings and returns the resulting events:
    /// appear/move in sighting order, then disappearances.
    pub fn update(&mut self, sightings: Vec<Sighting>) -> Vec<FaceEvent> {
        let mut events = Vec::with_capacity(sightings.len());
        let mut refreshed = HashSet::with_capacity(sightings.len());

        for Sighting { id, rect, encoding } in sightings {
            events.push(self.observe(id, rect, encoding));
            refreshed.insert(id);
        }
        events.extend(self.age_unrefreshed(&refreshed));
        events
    }

    fn observe(&mut self, id: FaceId, rect: Rectangle, encoding: Encoding) -> FaceEvent {
        let ttl = self.ttl_max;
        match self.tracks.get_mut(&id) {
            Some(track) => {
                track.rect = rect;
                track.ttl = ttl;
                FaceEvent::Move { id, rect }
            }
            None => {
                self.tracks.insert(id, Track { id, ttl, rect });
                FaceEvent::Appear { id, rect, encoding }
            }
        }
    }

    fn age_unrefreshed(&mut self, refreshed: &HashSet<FaceId>) -> Vec<FaceEvent> {
        let mut stale = Vec::new();
        for track in self.tracks.values_mut() {
            if refreshed.contains(&track.id) {
                continue;
            }
            track.ttl = track.ttl.saturating_sub(1);
            if track.ttl == 0 {
                stale.push(track.id);
            }
        }
        stale
            .into_iter()
            .map(|id| {
                self.tracks.remove(&id);
                FaceEvent::Disappear { id }
            })
            .collect()
    }

    /// Re-keys a live track after its identity was renamed.
    ///
    /// If `new` already has a track, that one is kept with the larger budget
    /// and the `old` track ends with a disappearance.
    pub fn rename(&mut self, old: FaceId, new: FaceId) -> Option<FaceEvent> {
        if old == new {
            return None;
        }
        let mut moved = self.tracks.remove(&old)?;
        match self.tracks.get_mut(&new) {
            Some(existing) => {
                existing.ttl = existing.ttl.max(moved.ttl);
                Some(FaceEvent::Disappear { id: old })
            }
            None => {
                moved.id = new;
                self.tracks.insert(new, moved);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
