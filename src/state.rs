//! Shared system state (spec §3, §9's design note on replacing a
//! shared mutable `current_state` variable with message passing): the
//! supervisor owns transitions and publishes them on a broadcast
//! channel; every other task only reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

/// Finite enumeration of lifecycle states (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
	Init,
	Connecting,
	Sampling,
	Processing,
	Transmitting,
	Config,
	Error,
}

impl SystemState {
	pub fn label(&self) -> &'static str {
		match self {
			SystemState::Init => "Init",
			SystemState::Connecting => "Connecting",
			SystemState::Sampling => "Sampling",
			SystemState::Processing => "Processing",
			SystemState::Transmitting => "Transmitting",
			SystemState::Config => "Config",
			SystemState::Error => "Error",
		}
	}
}

/// Monotonic totals, reset only on reboot (spec §3).
#[derive(Default)]
pub struct Counters {
	pub samples_processed: AtomicU64,
	pub transmissions_sent: AtomicU64,
}

impl Counters {
	pub fn record_window(&self) {
		self.samples_processed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_transmission(&self) {
		self.transmissions_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> (u64, u64) {
		(
			self.samples_processed.load(Ordering::Relaxed),
			self.transmissions_sent.load(Ordering::Relaxed),
		)
	}
}

/// Broadcasts state transitions from the supervisor to every reader
/// (currently only the display task) without a shared mutable variable.
/// `StateBus` holds the latest value plus a list of subscriber senders;
/// each subscriber gets its own unbounded `mpsc` channel.
pub struct StateBus {
	current: Mutex<SystemState>,
	subscribers: Mutex<Vec<Sender<SystemState>>>,
}

impl StateBus {
	pub fn new(initial: SystemState) -> Self {
		Self { current: Mutex::new(initial), subscribers: Mutex::new(Vec::new()) }
	}

	pub fn current(&self) -> SystemState {
		*self.current.lock().expect("state bus lock poisoned")
	}

	pub fn publish(&self, next: SystemState) {
		*self.current.lock().expect("state bus lock poisoned") = next;
		let mut subs = self.subscribers.lock().expect("state bus lock poisoned");
		subs.retain(|tx| tx.send(next).is_ok());
	}

	pub fn subscribe(&self) -> Receiver<SystemState> {
		let (tx, rx) = channel();
		self.subscribers.lock().expect("state bus lock poisoned").push(tx);
		rx
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counters_start_at_zero_and_increment() {
		let counters = Counters::default();
		assert_eq!(counters.snapshot(), (0, 0));
		counters.record_window();
		counters.record_transmission();
		assert_eq!(counters.snapshot(), (1, 1));
	}

	#[test]
	fn subscribers_observe_published_transitions() {
		let bus = StateBus::new(SystemState::Init);
		let rx = bus.subscribe();
		bus.publish(SystemState::Connecting);
		assert_eq!(bus.current(), SystemState::Connecting);
		assert_eq!(rx.recv().unwrap(), SystemState::Connecting);
	}
}
