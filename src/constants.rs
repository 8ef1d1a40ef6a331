//! Build-time constants: network credentials, server endpoint, device
//! identity, GPIO assignments, and task scheduling parameters.
//!
//! These are compiled in rather than configured at runtime, per the
//! link-layer contract in the spec (SSID/PSK, server URL, and device_id
//! are build-time constants).

use crate::config::AudioConfig;

pub const WIFI_SSID: &str = "audimeter-net";
pub const WIFI_PASSWORD: &str = "change-me-before-flashing";

pub const SERVER_URL: &str = "https://ingest.example.com/v1/fingerprints";
pub const DEVICE_ID: &str = "audimeter-0001";

pub const NTP_SERVER: &str = "pool.ntp.org";

// I2S (INMP441) pins, matching the teacher's wiring.
pub const I2S_BCLK_PIN: i32 = 25;
pub const I2S_DIN_PIN: i32 = 26;
pub const I2S_WS_PIN: i32 = 27;

// SSD1306 OLED over I2C.
pub const OLED_SDA_PIN: i32 = 21;
pub const OLED_SCL_PIN: i32 = 22;

// Two-button HMI input.
pub const BUTTON_NAVIGATE_PIN: i32 = 32;
pub const BUTTON_EDIT_PIN: i32 = 33;
pub const BUTTON_DEBOUNCE_MS: u64 = 200;

// Display refresh cadence (spec 4.6).
pub const DISPLAY_REFRESH_MS: u64 = 500;
// Button poll cadence (spec 5's task table).
pub const BUTTON_POLL_MS: u64 = 50;
// Time Sync task cadence.
pub const TIME_SYNC_INTERVAL_SECS: u64 = 3600;
// System Monitor task cadence.
pub const SYSTEM_MONITOR_INTERVAL_SECS: u64 = 30;

// Error-state dwell before auto-resuming (spec 4.4).
pub const ERROR_STATE_DWELL_SECS: u64 = 5;

// Transport timeout (spec 4.3).
pub const HTTP_TIMEOUT_MS: u64 = 10_000;

// Publish threshold: fingerprints below this confidence are never
// transmitted (spec 3, 4.4, glossary).
pub const PUBLISH_THRESHOLD: f32 = 0.1;

pub const NVS_NAMESPACE: &str = "audimeter";
pub const NVS_CONFIG_KEY: &str = "audio_config";

pub const DEFAULT_AUDIO_CONFIG: AudioConfig = AudioConfig {
	sample_rate: 16000,
	fft_size: 1024,
	hop_length: 512,
	n_mels: 13,
	min_freq: 80.0,
	max_freq: 7500.0,
	capture_duration: 30,
	capture_interval: 60,
	noise_threshold: 0.001,
	quality_level: 3,
};

// Task priorities and core affinities (spec 5's task table). Higher
// number is higher priority, matching esp-idf-hal's FreeRTOS convention.
pub mod priority {
	pub const AUDIO_CAPTURE: u8 = 5;
	pub const AUDIO_PROCESSING: u8 = 4;
	pub const BUTTON_HANDLER: u8 = 3;
	pub const DISPLAY: u8 = 2;
	pub const TIME_SYNC: u8 = 1;
	pub const SYSTEM_MONITOR: u8 = 1;
}
