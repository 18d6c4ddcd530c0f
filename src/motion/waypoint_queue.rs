// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the FIFO of waypoints shared between callers and the real-time thread.
use std::collections::LinkedList;
use std::mem;

use parking_lot::Mutex;

/// Thread-safe FIFO of waypoints.
///
/// Callers append while the real-time thread pops. Nodes are allocated and freed outside the
/// lock, so every critical section is a constant number of pointer updates.
#[derive(Debug)]
pub(crate) struct WaypointQueue<T> {
    waypoints: Mutex<LinkedList<T>>,
}

impl<T> Default for WaypointQueue<T> {
    fn default() -> Self {
        WaypointQueue {
            waypoints: Mutex::new(LinkedList::new()),
        }
    }
}

impl<T> WaypointQueue<T> {
    pub fn push(&self, waypoint: T) {
        let mut node = LinkedList::new();
        node.push_back(waypoint);
        self.waypoints.lock().append(&mut node);
    }
    /// Appends all waypoints in order, atomically with respect to [`pop`](`Self::pop`).
    ///
    /// The iterator is drained before the lock is taken.
    pub fn extend<I: IntoIterator<Item = T>>(&self, waypoints: I) {
        let mut batch: LinkedList<T> = waypoints.into_iter().collect();
        self.waypoints.lock().append(&mut batch);
    }
    pub fn pop(&self) -> Option<T> {
        let mut rest = {
            let mut waypoints = self.waypoints.lock();
            let at = waypoints.len().min(1);
            let rest = waypoints.split_off(at);
            mem::replace(&mut *waypoints, rest)
        };
        rest.pop_front()
    }
    pub fn clear(&self) {
        let dropped = mem::take(&mut *self.waypoints.lock());
        drop(dropped);
    }
    pub fn is_empty(&self) -> bool {
        self.waypoints.lock().is_empty()
    }
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.waypoints.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use crate::motion::waypoint_queue::WaypointQueue;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn pops_in_insertion_order() {
        let queue = WaypointQueue::default();
        queue.push(1);
        queue.extend(vec![2, 3]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn batches_stay_contiguous() {
        let queue = Arc::new(WaypointQueue::default());
        let producers: Vec<_> = (0..4)
            .map(|id| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for batch in 0..50 {
                        queue.extend((0..3).map(|i| (id, batch, i)));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(queue.len(), 600);
        while let Some(first) = queue.pop() {
            assert_eq!(first.2, 0);
            let second = queue.pop().unwrap();
            let third = queue.pop().unwrap();
            assert_eq!((second.0, second.1, second.2), (first.0, first.1, 1));
            assert_eq!((third.0, third.1, third.2), (first.0, first.1, 2));
        }
    }

    #[test]
    fn slow_producer_iterator_does_not_block_pop() {
        let queue = Arc::new(WaypointQueue::default());
        queue.push(0);
        let iterating = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = queue.clone();
            let iterating = iterating.clone();
            thread::spawn(move || {
                queue.extend((1..4).map(|i| {
                    iterating.store(true, Ordering::Release);
                    thread::sleep(Duration::from_millis(50));
                    i
                }));
            })
        };
        while !iterating.load(Ordering::Acquire) {
            thread::yield_now();
        }
        let start = Instant::now();
        assert_eq!(queue.pop(), Some(0));
        assert!(start.elapsed() < Duration::from_millis(40));
        producer.join().unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
    }
}
