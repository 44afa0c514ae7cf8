use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::foundation::error::CutlineResult;
use crate::media::element::{MediaElement, MediaElementFactory};
use crate::model::material::{Material, MaterialId};

/// How long a preload may stay pending before the slot is reclaimed.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

struct Slot {
    material: MaterialId,
    element: Box<dyn MediaElement>,
    ready: bool,
    requested_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Outcome of a preload request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreloadStatus {
    Ready,
    Pending,
}

/// Bounded pool of live media elements with O(1) LRU eviction.
///
/// Recency is an intrusive doubly-linked list over the slot slab
/// (head = most recent, tail = eviction candidate), with a map from material
/// id to slot index for O(1) lookup.
pub struct MediaPool {
    capacity: usize,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<MaterialId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl MediaPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn has(&self, id: MaterialId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn is_ready(&self, id: MaterialId) -> bool {
        self.index
            .get(&id)
            .and_then(|&i| self.slots[i].as_ref())
            .is_some_and(|s| s.ready)
    }

    pub fn is_pending(&self, id: MaterialId) -> bool {
        self.index
            .get(&id)
            .and_then(|&i| self.slots[i].as_ref())
            .is_some_and(|s| !s.ready)
    }

    // ---- intrusive list maintenance ----------------------------------------

    fn detach(&mut self, i: usize) {
        let (prev, next) = {
            let slot = self.slots[i].as_ref().expect("detaching a live slot");
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => {
                if let Some(s) = self.slots[p].as_mut() {
                    s.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(s) = self.slots[n].as_mut() {
                    s.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(s) = self.slots[i].as_mut() {
            s.prev = None;
            s.next = None;
        }
    }

    fn push_head(&mut self, i: usize) {
        let old_head = self.head;
        if let Some(s) = self.slots[i].as_mut() {
            s.prev = None;
            s.next = old_head;
        }
        if let Some(h) = old_head
            && let Some(s) = self.slots[h].as_mut()
        {
            s.prev = Some(i);
        }
        self.head = Some(i);
        if self.tail.is_none() {
            self.tail = Some(i);
        }
    }

    fn touch(&mut self, i: usize) {
        if self.head == Some(i) {
            return;
        }
        self.detach(i);
        self.push_head(i);
    }

    fn remove_slot(&mut self, i: usize) -> Option<Slot> {
        self.detach(i);
        let slot = self.slots[i].take()?;
        self.index.remove(&slot.material);
        self.free.push(i);
        Some(slot)
    }

    /// Release the least-recently-used element (pause, drop, destroy).
    fn evict_lru(&mut self) {
        if let Some(tail) = self.tail
            && let Some(mut slot) = self.remove_slot(tail)
        {
            slot.element.pause();
            tracing::debug!(material = ?slot.material, "evicting LRU media element");
        }
    }

    /// Request an element for `material`. Concurrent requests deduplicate onto
    /// the existing slot; a full pool evicts its LRU entry first.
    pub fn preload(
        &mut self,
        material_id: MaterialId,
        material: &Material,
        factory: &dyn MediaElementFactory,
        now: Instant,
    ) -> CutlineResult<PreloadStatus> {
        if let Some(&i) = self.index.get(&material_id) {
            let ready = self.slots[i].as_ref().is_some_and(|s| s.ready);
            return Ok(if ready {
                PreloadStatus::Ready
            } else {
                PreloadStatus::Pending
            });
        }

        while self.index.len() >= self.capacity {
            self.evict_lru();
        }

        let element = factory.create(material)?;
        let slot = Slot {
            material: material_id,
            element,
            ready: false,
            requested_at: now,
            prev: None,
            next: None,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(material_id, i);
        self.push_head(i);
        Ok(PreloadStatus::Pending)
    }

    /// Advance pending loads one step each; reclaim failed or timed-out slots.
    pub fn poll_pending(&mut self, now: Instant) {
        let pending: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().filter(|s| !s.ready).map(|_| i))
            .collect();
        for i in pending {
            let Some(slot) = self.slots[i].as_mut() else {
                continue;
            };
            match slot.element.poll_ready() {
                Ok(true) => slot.ready = true,
                Ok(false) => {
                    if now.saturating_duration_since(slot.requested_at) > LOAD_TIMEOUT {
                        tracing::warn!(material = ?slot.material, "media load timed out");
                        self.remove_slot(i);
                    }
                }
                Err(err) => {
                    tracing::warn!(material = ?slot.material, %err, "media load failed");
                    self.remove_slot(i);
                }
            }
        }
    }

    /// Borrow a ready element, marking it most-recently-used.
    pub fn get(&mut self, id: MaterialId) -> Option<&mut Box<dyn MediaElement>> {
        let i = *self.index.get(&id)?;
        if !self.slots[i].as_ref().is_some_and(|s| s.ready) {
            return None;
        }
        self.touch(i);
        self.slots[i].as_mut().map(|s| &mut s.element)
    }

    /// Release everything not in `keep`.
    pub fn evict_except(&mut self, keep: &BTreeSet<MaterialId>) {
        let drop_ids: Vec<MaterialId> = self
            .index
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        for id in drop_ids {
            if let Some(&i) = self.index.get(&id)
                && let Some(mut slot) = self.remove_slot(i)
            {
                slot.element.pause();
            }
        }
    }

    /// Pause every live element.
    pub fn pause_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.element.pause();
        }
    }
}
