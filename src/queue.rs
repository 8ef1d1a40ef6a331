//! The inter-stage hand-off between capture and processing (spec §4.4,
//! §5, §9): a single-slot queue. At most one [`AudioWindow`] is ever in
//! flight between C1 and C2. On overflow the *newest* arrival is
//! dropped, preserving strict acquisition-timestamp ordering at the
//! consumer without unbounded memory growth.
//!
//! [`AudioWindow`]: crate::audio::AudioWindow

use std::sync::{Condvar, Mutex};

pub struct SingleSlotQueue<T> {
	slot: Mutex<Option<T>>,
	not_empty: Condvar,
}

impl<T> SingleSlotQueue<T> {
	pub fn new() -> Self {
		Self { slot: Mutex::new(None), not_empty: Condvar::new() }
	}

	/// Attempts to enqueue `item`. Returns `false` (and the item is
	/// dropped) if the slot is already occupied.
	pub fn try_push(&self, item: T) -> bool {
		let mut slot = self.slot.lock().expect("queue lock poisoned");
		if slot.is_some() {
			return false;
		}
		*slot = Some(item);
		self.not_empty.notify_one();
		true
	}

	/// Blocks until an item is available, then removes and returns it.
	pub fn pop_blocking(&self) -> T {
		let mut slot = self.slot.lock().expect("queue lock poisoned");
		while slot.is_none() {
			slot = self.not_empty.wait(slot).expect("queue lock poisoned");
		}
		slot.take().expect("slot checked non-empty")
	}

	#[cfg(test)]
	pub fn is_occupied(&self) -> bool {
		self.slot.lock().expect("queue lock poisoned").is_some()
	}
}

impl<T> Default for SingleSlotQueue<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn push_then_pop_round_trips() {
		let q: SingleSlotQueue<u32> = SingleSlotQueue::new();
		assert!(q.try_push(7));
		assert_eq!(q.pop_blocking(), 7);
	}

	#[test]
	fn second_push_while_occupied_is_dropped() {
		let q: SingleSlotQueue<u32> = SingleSlotQueue::new();
		assert!(q.try_push(1));
		assert!(!q.try_push(2));
		assert_eq!(q.pop_blocking(), 1);
	}

	#[test]
	fn three_pushes_two_processed_newest_dropped() {
		let q: SingleSlotQueue<u32> = SingleSlotQueue::new();
		assert!(q.try_push(1));
		let first = q.pop_blocking();
		assert!(q.try_push(2));
		assert!(!q.try_push(3));
		let second = q.pop_blocking();
		assert_eq!((first, second), (1, 2));
	}

	#[test]
	fn pop_blocks_until_pushed() {
		let q = Arc::new(SingleSlotQueue::<u32>::new());
		let q2 = q.clone();
		let handle = thread::spawn(move || q2.pop_blocking());
		thread::sleep(Duration::from_millis(20));
		assert!(q.try_push(42));
		assert_eq!(handle.join().unwrap(), 42);
	}
}
