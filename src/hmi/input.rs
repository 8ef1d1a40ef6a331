//! HMI button handler task (C6): debounces two GPIO buttons and
//! translates presses into menu navigation, config edits, and
//! supervisor events (spec §4.6).

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use esp_idf_hal::cpu::Core;
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver, Pull};
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use log::info;

use crate::constants::{priority, BUTTON_DEBOUNCE_MS, BUTTON_POLL_MS};
use crate::hmi::menu::{MenuCursor, MenuItem};
use crate::state::SystemState;
use crate::supervisor::{Supervisor, SupervisorEvent};

/// Debounces a single active-low button behind an internal pull-up.
struct DebouncedButton<'d> {
	pin: PinDriver<'d, AnyIOPin, Input>,
	was_pressed: bool,
	last_edge: std::time::Instant,
}

impl<'d> DebouncedButton<'d> {
	fn new(mut pin: PinDriver<'d, AnyIOPin, Input>) -> anyhow::Result<Self> {
		pin.set_pull(Pull::Up)?;
		Ok(Self { pin, was_pressed: false, last_edge: std::time::Instant::now() })
	}

	/// Returns `true` exactly once per physical press, after the
	/// debounce window has elapsed (spec §4.6: "200 ms debounce").
	fn poll_pressed(&mut self) -> bool {
		let pressed = self.pin.is_low();
		let now = std::time::Instant::now();
		let rising_edge = pressed && !self.was_pressed;
		let debounced = rising_edge && now.duration_since(self.last_edge).as_millis() as u64 >= BUTTON_DEBOUNCE_MS;
		if pressed != self.was_pressed {
			self.last_edge = now;
		}
		self.was_pressed = pressed;
		debounced
	}
}

/// Spawns the button handler task: polls every 50 ms (spec §5's task
/// table) and applies the Button 1 (Navigate) / Button 2 (Edit/Exit)
/// semantics from spec §4.6.
pub fn spawn_button_thread(
	supervisor: Arc<Supervisor>,
	cursor: Arc<MenuCursor>,
	nvs: Arc<Mutex<EspNvs<NvsDefault>>>,
	nav_pin: PinDriver<'static, AnyIOPin, Input>,
	edit_pin: PinDriver<'static, AnyIOPin, Input>,
) {
	let thread_config = ThreadSpawnConfiguration {
		name: Some(b"hmi-input\0"),
		priority: priority::BUTTON_HANDLER,
		pin_to_core: Some(Core::Core0),
		..Default::default()
	};
	thread_config.set().expect("failed to set button thread configuration");

	thread::Builder::new()
		.stack_size(4096)
		.name("hmi-input".into())
		.spawn(move || {
			let mut navigate = match DebouncedButton::new(nav_pin) {
				Ok(b) => b,
				Err(e) => {
					log::error!("failed to initialise navigate button: {e:?}");
					return;
				}
			};
			let mut edit = match DebouncedButton::new(edit_pin) {
				Ok(b) => b,
				Err(e) => {
					log::error!("failed to initialise edit button: {e:?}");
					return;
				}
			};

			loop {
				if navigate.poll_pressed() {
					handle_navigate(&supervisor, &cursor);
				}
				if edit.poll_pressed() {
					handle_edit(&supervisor, &cursor, &nvs);
				}
				thread::sleep(Duration::from_millis(BUTTON_POLL_MS));
			}
		})
		.expect("failed to spawn button thread");
}

/// Button 1: outside Config, enter Config; inside Config, advance the
/// cursor; in Error, acknowledge (resumes to Sampling, or Init if the
/// link is down) (spec §4.4, §4.6).
fn handle_navigate(supervisor: &Supervisor, cursor: &MenuCursor) {
	match supervisor.bus.current() {
		SystemState::Config => {
			cursor.advance();
		}
		SystemState::Error => {
			info!("button 1: acknowledging error, resetting to Init");
			supervisor.transition(None, None, false, Some(SupervisorEvent::ErrorAcknowledge));
		}
		SystemState::Sampling | SystemState::Processing | SystemState::Transmitting => {
			cursor.reset();
			supervisor.transition(None, None, false, Some(SupervisorEvent::EnterConfig));
		}
		_ => {}
	}
}

/// Button 2: inside Config, advance the current parameter's value, or
/// exit to Sampling (and trigger persist) on the "Exit" item (spec §4.6).
fn handle_edit(supervisor: &Supervisor, cursor: &MenuCursor, nvs: &Mutex<EspNvs<NvsDefault>>) {
	if supervisor.bus.current() != SystemState::Config {
		return;
	}
	match cursor.current() {
		MenuItem::Exit => {
			supervisor.config.persist(&mut nvs.lock().expect("nvs lock poisoned"));
			supervisor.transition(None, None, false, Some(SupervisorEvent::ExitConfig));
		}
		item => {
			if let Some(field) = item.field() {
				if let Err(e) = supervisor.config.advance(field) {
					log::warn!("rejected config edit: {e}");
				}
			}
		}
	}
}
