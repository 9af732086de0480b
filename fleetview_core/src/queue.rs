//! FIFO buffer of coordinates waiting to be animated.

use crate::coordinate::Coordinate;
use std::collections::VecDeque;

/// Ordered buffer of pending positions.
///
/// Coordinates leave in exactly the order they arrived. All operations are
/// total: dequeuing an empty queue returns `None` rather than failing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateQueue {
    items: VecDeque<Coordinate>,
}

impl CoordinateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail.
    pub fn enqueue(&mut self, c: Coordinate) {
        self.items.push_back(c);
    }

    /// Appends all, preserving their relative order.
    pub fn enqueue_all(&mut self, cs: &[Coordinate]) {
        self.items.extend(cs.iter().copied());
    }

    /// Removes and returns the head.
    pub fn dequeue(&mut self) -> Option<Coordinate> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pending coordinates, head first.
    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.items.iter()
    }
}
