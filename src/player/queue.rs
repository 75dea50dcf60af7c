use std::collections::VecDeque;

use crate::protocol::TrackItem;

/// Pending tracks of one guild, played first-in first-out.
///
/// Not synchronized; the owning session serializes access.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    items: VecDeque<TrackItem>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail and returns the item's 1-based position.
    pub fn enqueue(&mut self, item: TrackItem) -> usize {
        self.items.push_back(item);
        self.items.len()
    }

    pub fn dequeue_next(&mut self) -> Option<TrackItem> {
        self.items.pop_front()
    }

    /// Drops every pending track, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackItem> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_in_insertion_order() {
        let mut queue = TrackQueue::new();
        assert_eq!(queue.enqueue(TrackItem::new("a", "A")), 1);
        assert_eq!(queue.enqueue(TrackItem::new("b", "B")), 2);
        assert_eq!(queue.enqueue(TrackItem::new("c", "C")), 3);

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue_next())
            .map(|t| t.title)
            .collect();
        assert_eq!(order, ["A", "B", "C"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_yields_none() {
        let mut queue = TrackQueue::new();
        assert!(queue.dequeue_next().is_none());
        assert_eq!(queue.iter().count(), 0);
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut queue = TrackQueue::new();
        queue.enqueue(TrackItem::new("a", "A"));
        queue.enqueue(TrackItem::new("b", "B"));
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.clear(), 0);
    }
}
