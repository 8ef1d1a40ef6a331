//! Config Store + Presets (C5).
//!
//! Holds the active [`AudioConfig`], validates mutations against the
//! ranges in spec §6, applies quality presets, and persists the
//! resulting byte image to NVS under the `"audio_config"` key.

use std::sync::RwLock;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_AUDIO_CONFIG, NVS_CONFIG_KEY};

/// The live tuning parameters for capture and DSP (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
	pub sample_rate: u32,
	pub fft_size: usize,
	pub hop_length: usize,
	pub n_mels: usize,
	pub min_freq: f32,
	pub max_freq: f32,
	pub capture_duration: u32,
	pub capture_interval: u32,
	pub noise_threshold: f32,
	pub quality_level: u8,
}

impl Default for AudioConfig {
	fn default() -> Self {
		DEFAULT_AUDIO_CONFIG
	}
}

impl AudioConfig {
	/// Validates the struct-level invariants from spec §3: `fft_size` is
	/// a power of two, `hop_length <= fft_size`, and
	/// `min_freq < max_freq <= sample_rate / 2`.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.fft_size.is_power_of_two() {
			return Err(ConfigError::OutOfRange {
				field: "fft_size",
				value: self.fft_size as f64,
			});
		}
		if self.hop_length > self.fft_size {
			return Err(ConfigError::OutOfRange {
				field: "hop_length",
				value: self.hop_length as f64,
			});
		}
		if !(self.min_freq < self.max_freq && self.max_freq <= self.sample_rate as f32 / 2.0) {
			return Err(ConfigError::OutOfRange {
				field: "max_freq",
				value: self.max_freq as f64,
			});
		}
		Ok(())
	}
}

/// A single configurable field, used by the HMI to cycle values and by
/// `ConfigStore::set` to validate a single mutation (spec §4.5, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
	SampleRate,
	FftSize,
	NMels,
	CaptureDuration,
	CaptureInterval,
	NoiseThreshold,
	QualityLevel,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("field {field} out of range: {value}")]
	OutOfRange { field: &'static str, value: f64 },
	#[error("unknown preset level {0}")]
	UnknownPreset(u8),
}

/// Quality preset rows from spec §6, indexed by `level - 1`.
struct Preset {
	sample_rate: u32,
	fft_size: usize,
	n_mels: usize,
	capture_duration: u32,
	capture_interval: u32,
}

const PRESETS: [Preset; 5] = [
	Preset { sample_rate: 8000, fft_size: 512, n_mels: 10, capture_duration: 15, capture_interval: 120 },
	Preset { sample_rate: 16000, fft_size: 512, n_mels: 12, capture_duration: 20, capture_interval: 90 },
	Preset { sample_rate: 16000, fft_size: 1024, n_mels: 13, capture_duration: 30, capture_interval: 60 },
	Preset { sample_rate: 22050, fft_size: 1024, n_mels: 15, capture_duration: 45, capture_interval: 45 },
	Preset { sample_rate: 44100, fft_size: 2048, n_mels: 20, capture_duration: 60, capture_interval: 30 },
];

/// Wrap-around sequences from spec §6, cycled by Button 2 in `Config`.
fn next_sample_rate(v: u32) -> u32 {
	match v {
		16000 => 22050,
		22050 => 44100,
		_ => 16000,
	}
}

fn next_fft_size(v: usize) -> usize {
	match v {
		512 => 1024,
		1024 => 2048,
		_ => 512,
	}
}

fn next_n_mels(v: usize) -> usize {
	match v {
		10 => 12,
		12 => 14,
		14 => 16,
		16 => 18,
		18 => 20,
		_ => 10,
	}
}

fn next_capture_duration(v: u32) -> u32 {
	match v {
		15 => 30,
		30 => 45,
		45 => 60,
		_ => 15,
	}
}

fn next_capture_interval(v: u32) -> u32 {
	if v >= 300 {
		30
	} else {
		v + 30
	}
}

fn next_noise_threshold(v: f32) -> f32 {
	if v >= 0.1 - 1e-6 {
		0.001
	} else {
		(v + 0.01).min(0.1)
	}
}

fn next_quality_level(v: u8) -> u8 {
	if v >= 5 {
		1
	} else {
		v + 1
	}
}

/// Read-mostly, single-writer config holder shared by every task (spec
/// §4.5, §9's design note on promoting config to a guarded snapshot
/// instead of sharing a mutable struct without locks).
pub struct ConfigStore {
	inner: RwLock<AudioConfig>,
}

impl ConfigStore {
	pub fn new(initial: AudioConfig) -> Self {
		Self { inner: RwLock::new(initial) }
	}

	/// Cheap snapshot read; called by C1 at the start of every capture
	/// cycle and by C2/C6 wherever the active tuning is needed.
	pub fn get(&self) -> AudioConfig {
		*self.inner.read().expect("config lock poisoned")
	}

	/// Validates and applies a full config snapshot. Rejected writes
	/// leave the store untouched (spec §7: configuration errors never
	/// propagate beyond the caller).
	pub fn set(&self, value: AudioConfig) -> Result<(), ConfigError> {
		value.validate()?;
		*self.inner.write().expect("config lock poisoned") = value;
		Ok(())
	}

	/// Advances one field to its next wrap-around value (spec §6 table),
	/// validating the resulting config before committing it.
	pub fn advance(&self, field: Field) -> Result<(), ConfigError> {
		let mut next = self.get();
		match field {
			Field::SampleRate => next.sample_rate = next_sample_rate(next.sample_rate),
			Field::FftSize => {
				next.fft_size = next_fft_size(next.fft_size);
				next.hop_length = next.hop_length.min(next.fft_size);
			}
			Field::NMels => next.n_mels = next_n_mels(next.n_mels),
			Field::CaptureDuration => next.capture_duration = next_capture_duration(next.capture_duration),
			Field::CaptureInterval => next.capture_interval = next_capture_interval(next.capture_interval),
			Field::NoiseThreshold => next.noise_threshold = next_noise_threshold(next.noise_threshold),
			Field::QualityLevel => next.quality_level = next_quality_level(next.quality_level),
		}
		self.set(next)
	}

	/// Overwrites the five preset fields atomically (spec §4.5, §6).
	pub fn apply_preset(&self, level: u8) -> Result<(), ConfigError> {
		let idx = level
			.checked_sub(1)
			.filter(|&i| (i as usize) < PRESETS.len())
			.ok_or(ConfigError::UnknownPreset(level))?;
		let preset = &PRESETS[idx as usize];
		let mut next = self.get();
		next.sample_rate = preset.sample_rate;
		next.fft_size = preset.fft_size;
		next.hop_length = preset.fft_size / 2;
		next.n_mels = preset.n_mels;
		next.capture_duration = preset.capture_duration;
		next.capture_interval = preset.capture_interval;
		next.quality_level = level;
		next.validate()?;
		*self.inner.write().expect("config lock poisoned") = next;
		Ok(())
	}

	/// Persists the current config to NVS. Failures are logged and
	/// swallowed: the device must remain operational even if flash
	/// storage is unavailable (spec §7).
	pub fn persist(&self, nvs: &mut esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>) {
		let snapshot = self.get();
		match serde_json::to_vec(&snapshot) {
			Ok(bytes) => {
				if let Err(e) = nvs.set_raw(NVS_CONFIG_KEY, &bytes) {
					warn!("failed to persist audio_config to NVS: {e:?}");
				}
			}
			Err(e) => warn!("failed to serialize audio_config: {e:?}"),
		}
	}

	/// Loads the config from NVS, falling back silently to the default
	/// on any failure (spec §4.5, §7: "the default config is used
	/// silently").
	pub fn load(nvs: &esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>) -> Self {
		let mut buf = [0u8; 256];
		let loaded = nvs
			.get_raw(NVS_CONFIG_KEY, &mut buf)
			.ok()
			.flatten()
			.and_then(|bytes| serde_json::from_slice::<AudioConfig>(bytes).ok())
			.and_then(|cfg| cfg.validate().is_ok().then_some(cfg));
		match loaded {
			Some(cfg) => Self::new(cfg),
			None => {
				warn!("no valid stored audio_config, using defaults");
				Self::new(AudioConfig::default())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_validates() {
		assert!(AudioConfig::default().validate().is_ok());
	}

	#[test]
	fn set_then_get_round_trips() {
		let store = ConfigStore::new(AudioConfig::default());
		let mut next = store.get();
		next.sample_rate = 22050;
		store.set(next).unwrap();
		assert_eq!(store.get().sample_rate, 22050);
	}

	#[test]
	fn out_of_range_is_rejected_and_previous_value_kept() {
		let store = ConfigStore::new(AudioConfig::default());
		let before = store.get();
		let mut bad = before;
		bad.hop_length = bad.fft_size + 1;
		assert!(store.set(bad).is_err());
		assert_eq!(store.get(), before);
	}

	#[test]
	fn apply_preset_sets_all_five_fields() {
		let store = ConfigStore::new(AudioConfig::default());
		store.apply_preset(5).unwrap();
		let cfg = store.get();
		assert_eq!(cfg.sample_rate, 44100);
		assert_eq!(cfg.fft_size, 2048);
		assert_eq!(cfg.n_mels, 20);
		assert_eq!(cfg.capture_duration, 60);
		assert_eq!(cfg.capture_interval, 30);
		assert_eq!(cfg.quality_level, 5);
	}

	#[test]
	fn preset_then_mutate_then_reapply_restores_preset_fields() {
		let store = ConfigStore::new(AudioConfig::default());
		let before_mutate = store.get().noise_threshold;
		store.advance(Field::NoiseThreshold).unwrap();
		assert_ne!(store.get().noise_threshold, before_mutate);

		store.apply_preset(3).unwrap();
		let cfg = store.get();
		assert_eq!(cfg.sample_rate, 16000);
		assert_eq!(cfg.fft_size, 1024);
		assert_eq!(cfg.n_mels, 13);
		assert_eq!(cfg.capture_duration, 30);
		assert_eq!(cfg.capture_interval, 60);
	}

	#[test]
	fn unknown_preset_level_is_rejected() {
		let store = ConfigStore::new(AudioConfig::default());
		assert!(store.apply_preset(0).is_err());
		assert!(store.apply_preset(6).is_err());
	}

	#[test]
	fn wrap_around_sequences_match_spec_table() {
		assert_eq!(next_sample_rate(16000), 22050);
		assert_eq!(next_sample_rate(22050), 44100);
		assert_eq!(next_sample_rate(44100), 16000);

		assert_eq!(next_fft_size(512), 1024);
		assert_eq!(next_fft_size(2048), 512);

		assert_eq!(next_n_mels(20), 10);
		assert_eq!(next_capture_duration(60), 15);

		assert_eq!(next_capture_interval(300), 30);
		assert_eq!(next_capture_interval(30), 60);

		let mut t = 0.001_f32;
		for _ in 0..11 {
			t = next_noise_threshold(t);
		}
		assert!((t - 0.001).abs() < 1e-6);

		assert_eq!(next_quality_level(5), 1);
		assert_eq!(next_quality_level(2), 3);
	}
}
