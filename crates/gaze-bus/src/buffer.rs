//! Bounded ring that overwrites its oldest entry when full

use std::collections::VecDeque;

use crate::BusError;

/// Default mailbox capacity (a few frames' worth of events)
pub const DEFAULT_CAPACITY: usize = 8;

/// Bounded FIFO where the newest value always wins
#[derive(Debug)]
pub struct LatestRing<T> {
    items: VecDeque<T>,
    capacity: usize,
    overwritten: usize,
}

impl<T> LatestRing<T> {
    /// Create a new ring with given capacity
    pub fn new(capacity: usize) -> Result<Self, BusError> {
        if capacity == 0 {
            return Err(BusError::ZeroCapacity);
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            overwritten: 0,
        })
    }

    /// Push a value, evicting and returning the oldest one if the ring is full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.overwritten += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Take the oldest retained value
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values evicted before anyone read them
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
