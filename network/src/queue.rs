use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// FIFO queue shared between the reactor and the main thread. The lock is
/// held only for the duration of a single push or pop.
#[derive(Debug)]
pub struct SharedQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn push_back(&self, item: T) {
        self.inner.lock().expect("queue lock poisoned").push_back(item);
    }

    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().expect("queue lock poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("queue lock poisoned").is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().expect("queue lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_fifo_order_across_clones() {
        let q = SharedQueue::new();
        let q2 = q.clone();
        q.push_back(1);
        q2.push_back(2);
        q.push_back(3);
        assert_eq!(q2.len(), 3);
        assert_eq!(q.pop_front(), Some(1));
        assert_eq!(q2.pop_front(), Some(2));
        assert_eq!(q.pop_front(), Some(3));
        assert!(q.pop_front().is_none());
        assert!(q2.is_empty());
    }
}
