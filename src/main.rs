//! # Audience Measurement Endpoint
//!
//! Firmware for a battery-or-mains-powered embedded sensor that
//! continuously listens to ambient television audio, condenses each
//! captured window into a compact acoustic fingerprint, and transmits
//! that fingerprint to a central aggregation server over Wi-Fi.
//!
//! ## Hardware
//! - ESP32 dual-core MCU
//! - INMP441 MEMS microphone over I2S (BCLK/DIN/WS)
//! - SSD1306 128x64 OLED over I2C
//! - Two momentary buttons (Navigate, Edit/Exit)
//!
//! ## Task layout (spec §5)
//! Six long-running tasks cooperate through a single-slot queue and a
//! handful of shared atomics: Audio Capture (C1, highest priority, its
//! own core), Audio Processing (C2 fingerprinting + C3 transport),
//! Button Handler and Display (C6), Time Sync and System Monitor
//! (ambient housekeeping).

mod audio;
mod config;
mod constants;
mod dsp;
mod error;
mod hmi;
mod monitor;
mod net;
mod queue;
mod state;
mod supervisor;
mod transport;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use esp_idf_hal::gpio::{AnyIOPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use log::info;

use crate::audio::AudioSource;
use crate::config::ConfigStore;
use crate::constants::NVS_NAMESPACE;
use crate::hmi::menu::MenuCursor;
use crate::supervisor::Supervisor;

fn main() -> Result<()> {
	esp_idf_svc::sys::link_patches();
	EspLogger::initialize_default();
	info!("audimeter starting...");

	let peripherals = Peripherals::take()?;
	let pins = peripherals.pins;

	let nvs_partition = EspDefaultNvsPartition::take()?;
	let nvs = EspNvs::new(nvs_partition.clone(), NVS_NAMESPACE, true)?;
	let config_store = Arc::new(ConfigStore::load(&nvs));
	let nvs = Arc::new(Mutex::new(nvs));

	let supervisor = Arc::new(Supervisor::new(config_store.clone()));

	let initial_config = config_store.get();
	let audio_source = AudioSource::new(
		peripherals.i2s0,
		pins.gpio25,
		pins.gpio26,
		pins.gpio27,
		&initial_config,
	)?;
	info!("I2S audio source configured at {} Hz", initial_config.sample_rate);

	supervisor.spawn_capture(audio_source);
	supervisor.spawn_processing();
	monitor::spawn_system_monitor(supervisor.counters.clone());

	let cursor = Arc::new(MenuCursor::new());
	hmi::display::spawn_display_thread(
		supervisor.bus.clone(),
		supervisor.counters.clone(),
		supervisor.config.clone(),
		cursor.clone(),
		peripherals.i2c0,
		pins.gpio21,
		pins.gpio22,
	);

	let nav_pin = PinDriver::input(AnyIOPin::from(pins.gpio32))?;
	let edit_pin = PinDriver::input(AnyIOPin::from(pins.gpio33))?;
	hmi::input::spawn_button_thread(supervisor.clone(), cursor, nvs, nav_pin, edit_pin);

	// Link layer: associate Wi-Fi, then sync wall-clock time. The
	// supervisor's `Init -> Connecting -> Sampling` transitions are
	// gated on `link_up`, which these drive. `_wifi` is kept bound for
	// the rest of `main` (which never returns) so the driver stays up.
	let _wifi = match net::connect_wifi(peripherals.modem, nvs_partition) {
		Ok(wifi) => {
			supervisor.set_link_up(true);
			supervisor.transition(None, None, false, None);
			supervisor.transition(None, None, false, None);

			match net::sync_time() {
				Ok(sntp) => net::spawn_time_sync_task(sntp),
				Err(e) => log::warn!("SNTP setup failed, continuing with system clock: {e:?}"),
			}
			Some(wifi)
		}
		Err(e) => {
			log::error!("fatal: Wi-Fi association failed: {e:?}");
			None
		}
	};

	// The working tasks run forever on their own threads; main just
	// supervises link-up/link-down transitions and otherwise idles.
	loop {
		let wifi_ok = _wifi.as_ref().map(net::is_connected).unwrap_or(false);
		supervisor.set_link_up(wifi_ok);
		if !wifi_ok && supervisor.bus.current() != state::SystemState::Init {
			supervisor.transition(None, None, false, None);
		}
		esp_idf_hal::delay::FreeRtos::delay_ms(1000);
	}
}
