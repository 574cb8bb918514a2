//! Fixed-capacity ring buffer of ranking sessions.
//!
//! Slots are allocated once at construction. `cursor` is the next slot to
//! write; once `len == capacity` that slot holds the oldest session, so a
//! push overwrites it.

use std::iter;

use crate::error::{Error, Result};

pub struct SessionHistory<T> {
    slots: Vec<Option<T>>,
    cursor: usize,
    len: usize,
}

impl<T> SessionHistory<T> {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "session history capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            slots: iter::repeat_with(|| None).take(capacity).collect(),
            cursor: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append, returning the evicted oldest entry when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.cursor].replace(item);
        self.cursor = (self.cursor + 1) % self.capacity();
        if evicted.is_none() {
            self.len += 1;
        }
        evicted
    }

    /// Slot indices from newest to oldest.
    fn newest_first(&self) -> impl Iterator<Item = usize> + '_ {
        let cap = self.capacity();
        (1..=self.len).map(move |back| (self.cursor + cap - back) % cap)
    }

    /// Mutable access to the newest entry matching `pred`.
    pub fn find_newest_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        let slot = self
            .newest_first()
            .find(|&i| self.slots[i].as_ref().is_some_and(&mut pred))?;
        self.slots[slot].as_mut()
    }

    /// Entries from newest to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        self.newest_first().filter_map(move |i| self.slots[i].as_ref())
    }
}
