//! Audio Source (C1).
//!
//! Reads PCM samples from the I²S microphone into normalised
//! floating-point windows. Mirrors the teacher's I2S setup (Philips
//! slot format, 32-bit width, mono) but reshaped around the spec's
//! acquire-one-window contract rather than a free-running accumulator.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2s::config::{Config, DataBitWidth, SlotMode, StdClkConfig, StdConfig, StdGpioConfig, StdSlotConfig};
use esp_idf_hal::i2s::{I2sDriver, I2S0};
use log::debug;

use crate::config::AudioConfig;
use crate::error::FatalError;

/// One unit of work handed from capture to processing (spec §3).
pub struct AudioWindow {
	pub samples: Vec<f32>,
	pub timestamp_us: u64,
	pub config: AudioConfig,
}

pub struct AudioSource<'d> {
	i2s: I2sDriver<'d, esp_idf_hal::i2s::I2sRx>,
}

impl<'d> AudioSource<'d> {
	/// Opens the I²S slave-clocked stereo-mono channel at `config.sample_rate`
	/// with 32-bit sample width (spec §4.1).
	pub fn new(
		i2s0: I2S0,
		bclk: impl Into<AnyIOPin>,
		din: impl Into<AnyIOPin>,
		ws: impl Into<AnyIOPin>,
		config: &AudioConfig,
	) -> Result<Self> {
		let bclk = bclk.into();
		let din = din.into();
		let ws = ws.into();

		let clock_config = StdClkConfig::from_sample_rate_hz(config.sample_rate);
		let slot_config = StdSlotConfig::philips_slot_default(DataBitWidth::Bits32, SlotMode::Mono);
		let std_config = StdConfig::new(Config::default(), clock_config, slot_config, StdGpioConfig::default());

		let mut i2s = I2sDriver::new_std_rx(i2s0, &std_config, bclk, din, None::<AnyIOPin>, ws)
			.map_err(|e| FatalError::I2sInstall(e.into()))?;
		i2s.rx_enable().map_err(|e| FatalError::I2sInstall(e.into()))?;
		Ok(Self { i2s })
	}

	/// Blocks until exactly `sample_rate * capture_duration` samples have
	/// been gathered, then returns the window timestamped at the start
	/// of acquisition (spec §4.1). Never returns a short window.
	pub fn acquire_window(&mut self, config: AudioConfig) -> Result<AudioWindow> {
		let start_us = now_micros();
		let target_samples = config.sample_rate as usize * config.capture_duration as usize;
		let mut raw = Vec::with_capacity(target_samples * 4);

		let mut chunk = [0u8; 512];
		while raw.len() < target_samples * 4 {
			let read = self.i2s.read(&mut chunk, esp_idf_hal::delay::BLOCK)?;
			raw.extend_from_slice(&chunk[..read]);
		}
		raw.truncate(target_samples * 4);

		let samples = raw
			.chunks_exact(4)
			.map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / i32::MAX as f32)
			.collect::<Vec<f32>>();
		debug_assert_eq!(samples.len(), target_samples);

		Ok(AudioWindow { samples, timestamp_us: start_us, config })
	}

	/// Sleeps `capture_interval` seconds between acquisitions (spec
	/// §4.1's cadence: the interval does not include acquisition time).
	pub fn wait_interval(config: &AudioConfig) {
		FreeRtos::delay_ms(config.capture_interval * 1000);
	}
}

fn now_micros() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_micros() as u64)
		.unwrap_or_else(|_| {
			debug!("system clock before epoch, falling back to 0");
			0
		})
}

/// Converts one little-endian 32-bit I2S sample to the normalised
/// [-1.0, 1.0] range (spec §4.1). Factored out for host-side testing.
pub fn normalize_sample(raw: i32) -> f32 {
	raw as f32 / i32::MAX as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalize_extremes() {
		assert!((normalize_sample(i32::MAX) - 1.0).abs() < 1e-6);
		assert!(normalize_sample(i32::MIN) < -0.999);
		assert_eq!(normalize_sample(0), 0.0);
	}
}
