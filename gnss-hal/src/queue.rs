//! Type-indexed family of bounded FIFO queues.
//!
//! Every parcel type gets its own sub-queue with its own mutex and condition
//! variable; sub-queues are created lazily on first use and shared through
//! one [`MessageQueue`] handle. Ordering is FIFO within one type only. A full
//! queue drops its oldest entry on push.

use crate::constants::MAX_QUEUE_DEPTH;
use log::trace;
use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// One bounded FIFO with its own lock and condition variable.
pub struct TypedQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for TypedQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }
}

impl<T> TypedQueue<T> {
    /// Push an item, dropping the oldest entry first when the queue is at
    /// capacity, then wake all waiters.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        if items.len() >= MAX_QUEUE_DEPTH {
            trace!("queue at capacity ({MAX_QUEUE_DEPTH}), dropping oldest");
            items.pop_front();
        }
        items.push_back(item);
        drop(items);
        self.available.notify_all();
    }

    /// Non-blocking pop of the oldest item.
    pub fn pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    /// Copy of the oldest item without removing it.
    pub fn front(&self) -> Option<T>
    where
        T: Clone,
    {
        self.items.lock().unwrap().front().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.items.lock().unwrap().clear();
    }

    /// Block until the queue is non-empty or the timeout elapses. Returns
    /// whether an item is available.
    pub fn wait_not_empty(&self, timeout: Duration) -> bool {
        let items = self.items.lock().unwrap();
        let (items, _) = self
            .available
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap();
        !items.is_empty()
    }

    /// Pop, waiting up to `timeout` for an item to arrive.
    pub fn pop_wait(&self, timeout: Duration) -> Option<T> {
        let items = self.items.lock().unwrap();
        let (mut items, _) = self
            .available
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap();
        items.pop_front()
    }

    /// Wake every waiter without pushing; used on shutdown.
    pub fn notify_all(&self) {
        self.available.notify_all();
    }
}

/// Registry of per-type sub-queues. Cheap to clone via `Arc`; consumers keep
/// the `Arc<TypedQueue<T>>` they obtain from [`MessageQueue::of`].
#[derive(Default)]
pub struct MessageQueue {
    slots: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MessageQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The sub-queue for `T`, created on first use.
    pub fn of<T: Send + Sync + 'static>(&self) -> Arc<TypedQueue<T>> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(TypedQueue::<T>::default()) as Arc<dyn Any + Send + Sync>)
            .clone();
        drop(slots);
        match slot.downcast::<TypedQueue<T>>() {
            Ok(queue) => queue,
            Err(_) => unreachable!("queue slot holds the queue of its own type id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_within_one_type() {
        let queue = MessageQueue::new();
        let ints = queue.of::<u32>();
        ints.push(1);
        ints.push(2);
        ints.push(3);
        assert_eq!(ints.pop(), Some(1));
        assert_eq!(ints.front(), Some(2));
        assert_eq!(ints.pop(), Some(2));
        assert_eq!(ints.pop(), Some(3));
        assert_eq!(ints.pop(), None);
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = MessageQueue::new();
        let ints = queue.of::<usize>();
        for i in 1..=130 {
            ints.push(i);
        }
        assert_eq!(ints.len(), MAX_QUEUE_DEPTH);
        // Items 1 and 2 were dropped on overflow.
        assert_eq!(ints.pop(), Some(3));
    }

    #[test]
    fn distinct_types_get_distinct_queues() {
        let queue = MessageQueue::new();
        queue.of::<u32>().push(7);
        assert!(queue.of::<i64>().is_empty());
        assert_eq!(queue.of::<u32>().len(), 1);
        // The same type resolves to the same sub-queue.
        assert_eq!(queue.of::<u32>().pop(), Some(7));
    }

    #[test]
    fn wait_not_empty_wakes_on_push() {
        let queue = MessageQueue::new();
        let strings = queue.of::<String>();
        let producer = {
            let strings = Arc::clone(&strings);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                strings.push("hello".to_owned());
            })
        };
        assert!(strings.wait_not_empty(Duration::from_secs(2)));
        assert_eq!(strings.pop(), Some("hello".to_owned()));
        producer.join().unwrap();
    }

    #[test]
    fn wait_not_empty_times_out() {
        let queue = MessageQueue::new();
        let ints = queue.of::<u8>();
        assert!(!ints.wait_not_empty(Duration::from_millis(10)));
    }
}
