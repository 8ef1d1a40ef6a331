//! System Monitor task (spec §5's task table, detailed in
//! SPEC_FULL.md §F): a low-priority background task that logs free
//! heap and uptime every 30 seconds. Purely observational — it never
//! mutates shared state.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use esp_idf_hal::cpu::Core;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use log::info;

use crate::constants::{priority, SYSTEM_MONITOR_INTERVAL_SECS};
use crate::state::Counters;

pub fn spawn_system_monitor(counters: Arc<Counters>) {
	let thread_config = ThreadSpawnConfiguration {
		name: Some(b"sys-monitor\0"),
		priority: priority::SYSTEM_MONITOR,
		pin_to_core: Some(Core::Core0),
		..Default::default()
	};
	thread_config.set().expect("failed to set system monitor thread configuration");

	thread::Builder::new()
		.stack_size(3072)
		.name("sys-monitor".into())
		.spawn(move || loop {
			let free_heap = unsafe { esp_idf_svc::sys::esp_get_free_heap_size() };
			let (samples, transmissions) = counters.snapshot();
			info!("heap={free_heap}B samples_processed={samples} transmissions_sent={transmissions}");
			thread::sleep(Duration::from_secs(SYSTEM_MONITOR_INTERVAL_SECS));
		})
		.expect("failed to spawn system monitor thread");
}
