//! HMI display task (C6): renders the current state/metrics on the
//! 128x64 OLED as four 32-column text lines, in the teacher's
//! embedded-graphics/ssd1306 idiom.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_graphics::{
	mono_font::{ascii::FONT_6X10, MonoTextStyle},
	pixelcolor::BinaryColor,
	prelude::*,
	text::{Baseline, Text},
};
use esp_idf_hal::cpu::Core;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver, I2C0};
use esp_idf_hal::prelude::*;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use log::{error, info};
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use crate::config::ConfigStore;
use crate::constants::{priority, DISPLAY_REFRESH_MS};
use crate::error::FatalError;
use crate::hmi::menu::MenuCursor;
use crate::state::{Counters, StateBus, SystemState};

type Oled = Ssd1306<I2CInterface<I2cDriver<'static>>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub fn init_oled_display(i2c: I2cDriver<'static>) -> Result<Oled, FatalError> {
	let interface = I2CDisplayInterface::new(i2c);
	let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0).into_buffered_graphics_mode();

	display.init().map_err(|e| FatalError::DisplayInit(anyhow::anyhow!("display init error: {e:?}")))?;
	display
		.clear(BinaryColor::Off)
		.map_err(|e| FatalError::DisplayInit(anyhow::anyhow!("display clear error: {e:?}")))?;
	display.flush().map_err(|e| FatalError::DisplayInit(anyhow::anyhow!("display flush error: {e:?}")))?;

	Ok(display)
}

/// Spawns the display task: wakes every 500 ms and redraws only when
/// state, sample count, or transmission count has changed (spec §4.6).
pub fn spawn_display_thread(
	bus: Arc<StateBus>,
	counters: Arc<Counters>,
	config: Arc<ConfigStore>,
	cursor: Arc<MenuCursor>,
	i2c0: I2C0,
	sda: impl Into<AnyIOPin> + Send + 'static,
	scl: impl Into<AnyIOPin> + Send + 'static,
) {
	let thread_config = ThreadSpawnConfiguration {
		name: Some(b"hmi-display\0"),
		priority: priority::DISPLAY,
		pin_to_core: Some(Core::Core0),
		..Default::default()
	};
	thread_config.set().expect("failed to set display thread configuration");

	thread::Builder::new()
		.stack_size(8192)
		.name("hmi-display".into())
		.spawn(move || {
			let sda = sda.into();
			let scl = scl.into();
			let i2c_config = I2cConfig::new().baudrate(400.kHz().into());
			let i2c = match I2cDriver::new(i2c0, sda, scl, &i2c_config) {
				Ok(i2c) => i2c,
				Err(e) => {
					error!("failed to initialise display I2C driver: {e:?}");
					return;
				}
			};

			let mut display = match init_oled_display(i2c) {
				Ok(display) => display,
				Err(e) => {
					error!("failed to initialise OLED display: {e:?}");
					return;
				}
			};

			info!("OLED display initialised");
			let transitions = bus.subscribe();
			let mut state = bus.current();
			let mut last_drawn: Option<(SystemState, u64, u64)> = None;

			loop {
				while let Ok(next) = transitions.try_recv() {
					state = next;
				}
				let (samples, transmissions) = counters.snapshot();
				let current = (state, samples, transmissions);

				if last_drawn != Some(current) {
					draw_screen(&mut display, state, samples, transmissions, &config, &cursor);
					last_drawn = Some(current);
				}

				thread::sleep(Duration::from_millis(DISPLAY_REFRESH_MS));
			}
		})
		.expect("failed to spawn display thread");
}

fn draw_screen(
	display: &mut Oled,
	state: SystemState,
	samples: u64,
	transmissions: u64,
	config: &ConfigStore,
	cursor: &MenuCursor,
) {
	let _ = display.clear(BinaryColor::Off);

	if state == SystemState::Config {
		let cfg = config.get();
		let item = cursor.current_label(&cfg);
		draw_line(display, "Config", 0);
		draw_line(display, &item, 16);
		draw_line(display, "B1 next  B2 edit", 48);
	} else {
		let cfg = config.get();
		draw_line(display, state.label(), 0);
		draw_line(display, &format!("rate {} Hz", cfg.sample_rate), 16);
		draw_line(display, &format!("samples {samples}"), 32);
		draw_line(display, &format!("sent {transmissions}"), 48);
	}

	let _ = display.flush();
}

fn draw_line(display: &mut Oled, text: &str, y: i32) {
	let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
	let truncated: String = text.chars().take(32).collect();
	let _ = Text::with_baseline(&truncated, Point::new(0, y), style, Baseline::Top).draw(display);
}
