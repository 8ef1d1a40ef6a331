//! Pipeline Supervisor (C4).
//!
//! Owns the lifecycle state machine (spec §4.4) and drives the capture
//! -> queue -> process -> transmit cycle on two cooperating tasks: the
//! Audio Capture task pushes windows into the single-slot queue on its
//! own cadence; the Audio Processing task pops, fingerprints, and
//! transmits, publishing every transition it makes to the `StateBus`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_hal::cpu::Core;
use log::{info, warn};

use crate::audio::AudioSource;
use crate::config::ConfigStore;
use crate::constants::{priority, ERROR_STATE_DWELL_SECS, PUBLISH_THRESHOLD};
use crate::dsp::Fingerprinter;
use crate::queue::SingleSlotQueue;
use crate::state::{Counters, StateBus, SystemState};
use crate::transport::{Transport, TransportError};

/// Button-driven request from the HMI, observed by the supervisor
/// alongside ordinary pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
	EnterConfig,
	ExitConfig,
	ErrorAcknowledge,
}

/// The pure transition function behind spec §4.4's table. Kept free of
/// any hardware or I/O so it can be exercised directly in tests.
pub fn next_state(
	current: SystemState,
	link_up: bool,
	confidence: Option<f32>,
	transmit_ok: Option<bool>,
	error_elapsed: bool,
	event: Option<SupervisorEvent>,
) -> SystemState {
	if let Some(SupervisorEvent::EnterConfig) = event {
		if matches!(current, SystemState::Sampling | SystemState::Processing | SystemState::Transmitting) {
			return SystemState::Config;
		}
	}
	if current == SystemState::Config {
		return match event {
			Some(SupervisorEvent::ExitConfig) => SystemState::Sampling,
			_ => SystemState::Config,
		};
	}
	if !link_up && matches!(current, SystemState::Sampling | SystemState::Processing | SystemState::Transmitting) {
		return SystemState::Init;
	}

	match current {
		SystemState::Init => {
			if link_up {
				SystemState::Connecting
			} else {
				SystemState::Init
			}
		}
		SystemState::Connecting => {
			if link_up {
				SystemState::Sampling
			} else {
				SystemState::Connecting
			}
		}
		SystemState::Sampling => SystemState::Processing,
		SystemState::Processing => match confidence {
			Some(c) if c >= PUBLISH_THRESHOLD => SystemState::Transmitting,
			Some(_) => SystemState::Sampling,
			None => SystemState::Processing,
		},
		SystemState::Transmitting => match transmit_ok {
			Some(true) => SystemState::Sampling,
			Some(false) => SystemState::Error,
			None => SystemState::Transmitting,
		},
		SystemState::Error => {
			if !link_up {
				SystemState::Init
			} else if error_elapsed || event == Some(SupervisorEvent::ErrorAcknowledge) {
				SystemState::Sampling
			} else {
				SystemState::Error
			}
		}
		SystemState::Config => unreachable!("handled above"),
	}
}

pub struct Supervisor {
	pub bus: Arc<StateBus>,
	pub counters: Arc<Counters>,
	pub config: Arc<ConfigStore>,
	pub queue: Arc<SingleSlotQueue<crate::audio::AudioWindow>>,
	link_up: Arc<AtomicBool>,
}

impl Supervisor {
	pub fn new(config: Arc<ConfigStore>) -> Self {
		Self {
			bus: Arc::new(StateBus::new(SystemState::Init)),
			counters: Arc::new(Counters::default()),
			config,
			queue: Arc::new(SingleSlotQueue::new()),
			link_up: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn set_link_up(&self, up: bool) {
		self.link_up.store(up, Ordering::Relaxed);
	}

	pub fn link_up(&self) -> bool {
		self.link_up.load(Ordering::Relaxed)
	}

	/// Applies the spec §4.4 transition table to the current state and
	/// publishes the result on the bus. This is the only place that
	/// drives `StateBus` transitions outside of capture's initial push.
	pub fn transition(
		&self,
		confidence: Option<f32>,
		transmit_ok: Option<bool>,
		error_elapsed: bool,
		event: Option<SupervisorEvent>,
	) -> SystemState {
		let current = self.bus.current();
		let next = next_state(current, self.link_up(), confidence, transmit_ok, error_elapsed, event);
		if next != current {
			self.bus.publish(next);
		}
		next
	}

	/// Spawns the Audio Capture task: acquires windows on cadence and
	/// pushes them into the single-slot queue, dropping the newest
	/// arrival on overflow (spec §4.1, §4.4, §5).
	pub fn spawn_capture(self: &Arc<Self>, mut source: AudioSource<'static>) {
		let sup = self.clone();

		let thread_config = ThreadSpawnConfiguration {
			name: Some(b"audio-capture\0"),
			priority: priority::AUDIO_CAPTURE,
			pin_to_core: Some(Core::Core1),
			..Default::default()
		};
		thread_config.set().expect("failed to set capture thread configuration");

		thread::Builder::new()
			.stack_size(16384)
			.name("audio-capture".into())
			.spawn(move || loop {
				if sup.bus.current() == SystemState::Config {
					FreeRtos::delay_ms(50);
					continue;
				}
				let cfg = sup.config.get();
				match source.acquire_window(cfg) {
					Ok(window) => {
						sup.counters.record_window();
						if !sup.queue.try_push(window) {
							warn!("processing slower than capture, dropping newest window");
						}
					}
					Err(e) => {
						log::error!("fatal I2S read error: {e:?}");
						loop {
							FreeRtos::delay_ms(u32::MAX);
						}
					}
				}
				AudioSource::wait_interval(&cfg);
			})
			.expect("failed to spawn audio capture thread");
	}

	/// Spawns the Audio Processing task: pops windows, fingerprints
	/// them, and transmits fingerprints that clear the confidence gate
	/// (spec §4.2, §4.3, §4.4, §5).
	pub fn spawn_processing(self: &Arc<Self>) {
		let sup = self.clone();

		let thread_config = ThreadSpawnConfiguration {
			name: Some(b"audio-processing\0"),
			priority: priority::AUDIO_PROCESSING,
			pin_to_core: Some(Core::Core0),
			..Default::default()
		};
		thread_config.set().expect("failed to set processing thread configuration");

		thread::Builder::new()
			.stack_size(32768)
			.name("audio-processing".into())
			.spawn(move || {
				let mut fingerprinter = Fingerprinter::new();
				let mut transport = Transport::new();

				loop {
					if sup.bus.current() == SystemState::Config {
						FreeRtos::delay_ms(100);
						continue;
					}

					let window = sup.queue.pop_blocking();
					sup.transition(None, None, false, None);

					let fingerprint = fingerprinter.process(&window);
					let confidence = fingerprint.confidence;
					if sup.transition(Some(confidence), None, false, None) != SystemState::Transmitting {
						log::debug!("window discarded below publish threshold: confidence={confidence}");
						continue;
					}

					transport.set_link_associated(sup.link_up());
					match transport.publish(&fingerprint) {
						Ok(()) => {
							sup.counters.record_transmission();
							info!("transmitted fingerprint {}", fingerprint.hash);
							sup.transition(None, Some(true), false, None);
						}
						Err(e) => {
							log_transport_failure(&e);
							sup.transition(None, Some(false), false, None);
							FreeRtos::delay_ms((ERROR_STATE_DWELL_SECS * 1000) as u32);
							sup.transition(None, None, true, None);
						}
					}
				}
			})
			.expect("failed to spawn audio processing thread");
	}
}

fn log_transport_failure(e: &TransportError) {
	match e {
		TransportError::NotReady => warn!("transport not ready: link down"),
		TransportError::Timeout => warn!("transport timed out"),
		TransportError::ServerError(status) => warn!("server rejected fingerprint: {status}"),
		TransportError::TransportError(msg) => warn!("transport error: {msg}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn init_waits_for_link_then_connects() {
		assert_eq!(next_state(SystemState::Init, false, None, None, false, None), SystemState::Init);
		assert_eq!(next_state(SystemState::Init, true, None, None, false, None), SystemState::Connecting);
	}

	#[test]
	fn connecting_advances_to_sampling_once_link_up() {
		assert_eq!(next_state(SystemState::Connecting, true, None, None, false, None), SystemState::Sampling);
	}

	#[test]
	fn processing_routes_on_confidence_gate() {
		assert_eq!(next_state(SystemState::Processing, true, Some(0.5), None, false, None), SystemState::Transmitting);
		assert_eq!(next_state(SystemState::Processing, true, Some(0.05), None, false, None), SystemState::Sampling);
	}

	#[test]
	fn transmitting_success_returns_to_sampling_failure_to_error() {
		assert_eq!(next_state(SystemState::Transmitting, true, None, Some(true), false, None), SystemState::Sampling);
		assert_eq!(next_state(SystemState::Transmitting, true, None, Some(false), false, None), SystemState::Error);
	}

	#[test]
	fn error_resumes_after_dwell_or_button_else_drops_to_init_if_link_lost() {
		assert_eq!(next_state(SystemState::Error, true, None, None, false, None), SystemState::Error);
		assert_eq!(next_state(SystemState::Error, true, None, None, true, None), SystemState::Sampling);
		assert_eq!(
			next_state(SystemState::Error, true, None, None, false, Some(SupervisorEvent::ErrorAcknowledge)),
			SystemState::Sampling
		);
		assert_eq!(next_state(SystemState::Error, false, None, None, true, None), SystemState::Init);
	}

	#[test]
	fn link_loss_demotes_active_pipeline_states_to_init() {
		for s in [SystemState::Sampling, SystemState::Processing, SystemState::Transmitting] {
			assert_eq!(next_state(s, false, None, None, false, None), SystemState::Init);
		}
	}

	#[test]
	fn button_one_enters_config_from_any_active_state() {
		for s in [SystemState::Sampling, SystemState::Processing, SystemState::Transmitting] {
			assert_eq!(next_state(s, true, None, None, false, Some(SupervisorEvent::EnterConfig)), SystemState::Config);
		}
	}

	#[test]
	fn config_exit_returns_to_sampling_otherwise_stays() {
		assert_eq!(next_state(SystemState::Config, true, None, None, false, None), SystemState::Config);
		assert_eq!(
			next_state(SystemState::Config, true, None, None, false, Some(SupervisorEvent::ExitConfig)),
			SystemState::Sampling
		);
	}
}
