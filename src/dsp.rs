//! DSP / Fingerprinter (C2).
//!
//! Turns one [`AudioWindow`] into a [`Fingerprint`] through the
//! deterministic pipeline in spec §4.2: noise gate, pre-emphasis,
//! framing, Hamming windowing, FFT, simplified mel-band pooling,
//! base64 payload encoding, content hashing, and confidence scoring.
//!
//! The pipeline here omits the DCT step a full MFCC would apply,
//! producing one log-summed-energy value per frame instead of true
//! cepstral coefficients. Spec §9 acknowledges this as intentional
//! ("simplified") and asks that it be preserved rather than "fixed" —
//! the server-side matcher is assumed to expect this exact shape.

use base64::Engine;
use md5::{Digest, Md5};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::audio::AudioWindow;
use crate::config::AudioConfig;

const PRE_EMPHASIS_ALPHA: f32 = 0.97;

/// The artifact transmitted to the server (spec §3, §6).
#[derive(Debug, Clone)]
pub struct Fingerprint {
	pub hash: String,
	pub timestamp_us: u64,
	pub confidence: f32,
	pub duration_secs: u32,
	pub features_b64: String,
	pub sample_rate: u32,
	pub quality_level: u8,
}

pub struct Fingerprinter {
	planner: FftPlanner<f32>,
}

impl Fingerprinter {
	pub fn new() -> Self {
		Self { planner: FftPlanner::new() }
	}

	/// Runs the full pipeline over one window. Always returns a
	/// `Fingerprint`; a rejected (below noise-gate) window comes back
	/// with `confidence == 0.0`, which the caller must not transmit
	/// (spec §3, §4.2 step 1).
	pub fn process(&mut self, window: &AudioWindow) -> Fingerprint {
		let cfg = window.config;

		if mean_square_energy(&window.samples) < cfg.noise_threshold {
			return silent_fingerprint(window, &cfg);
		}

		let mut samples = window.samples.clone();
		pre_emphasize(&mut samples, PRE_EMPHASIS_ALPHA);

		let n_frames = frame_count(samples.len(), cfg.fft_size, cfg.hop_length).min(cfg.n_mels);
		let fft = self.planner.plan_fft_forward(cfg.fft_size);
		let hamming = hamming_window(cfg.fft_size);

		let mut features = Vec::with_capacity(cfg.n_mels);
		for k in 0..n_frames {
			let offset = k * cfg.hop_length;
			let frame = &samples[offset..offset + cfg.fft_size];
			features.push(process_frame(frame, &hamming, fft.as_ref(), &cfg));
		}

		build_fingerprint(window, &cfg, features)
	}
}

impl Default for Fingerprinter {
	fn default() -> Self {
		Self::new()
	}
}

fn mean_square_energy(samples: &[f32]) -> f32 {
	if samples.is_empty() {
		return 0.0;
	}
	samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32
}

/// First-order pre-emphasis high-pass, applied in place from the last
/// index down to 1 (spec §4.2 step 2): `x[i] -= alpha * x[i-1]`.
fn pre_emphasize(samples: &mut [f32], alpha: f32) {
	for i in (1..samples.len()).rev() {
		samples[i] -= alpha * samples[i - 1];
	}
}

fn frame_count(n: usize, fft_size: usize, hop_length: usize) -> usize {
	if n < fft_size || hop_length == 0 {
		return 0;
	}
	(n - fft_size) / hop_length + 1
}

/// Hamming window coefficients: `w[i] = 0.54 - 0.46*cos(2*pi*i/(L-1))`.
fn hamming_window(len: usize) -> Vec<f32> {
	if len <= 1 {
		return vec![1.0; len];
	}
	(0..len)
		.map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32).cos())
		.collect()
}

/// Windows one frame, FFTs it, and pools the power spectrum over the
/// configured frequency band into a single log-energy value (spec
/// §4.2 steps 4–6).
fn process_frame(frame: &[f32], hamming: &[f32], fft: &dyn rustfft::Fft<f32>, cfg: &AudioConfig) -> f32 {
	let mut signal: Vec<Complex<f32>> = frame
		.iter()
		.zip(hamming.iter())
		.map(|(s, w)| Complex::new(s * w, 0.0))
		.collect();
	fft.process(&mut signal);

	let bin_lo = mel_bin(cfg.min_freq, cfg.fft_size, cfg.sample_rate);
	let bin_hi = mel_bin(cfg.max_freq, cfg.fft_size, cfg.sample_rate).min(cfg.fft_size / 2);

	let sum: f32 = signal[bin_lo..bin_hi].iter().map(|c| c.re * c.re + c.im * c.im).sum();
	clamp_finite((sum + 1e-10).ln())
}

fn mel_bin(freq: f32, fft_size: usize, sample_rate: u32) -> usize {
	((freq * fft_size as f32 / sample_rate as f32).round() as isize).clamp(0, fft_size as isize) as usize
}

fn clamp_finite(v: f32) -> f32 {
	if v.is_finite() {
		v
	} else {
		0.0
	}
}

fn build_fingerprint(window: &AudioWindow, cfg: &AudioConfig, features: Vec<f32>) -> Fingerprint {
	let features_bytes: Vec<u8> = features.iter().flat_map(|f| f.to_ne_bytes()).collect();
	let features_b64 = base64::engine::general_purpose::STANDARD.encode(&features_bytes);

	let confidence = confidence_score(&features);

	Fingerprint {
		hash: content_hash(&features_b64),
		timestamp_us: window.timestamp_us,
		confidence,
		duration_secs: cfg.capture_duration,
		features_b64,
		sample_rate: cfg.sample_rate,
		quality_level: cfg.quality_level,
	}
}

/// 128-bit content digest of the base64 feature text, rendered as 32
/// lowercase hex characters (spec §4.2 step 8, §9: hashing the base64
/// text rather than the raw bytes is intentional and preserved for
/// server-side compatibility).
fn content_hash(features_b64: &str) -> String {
	let mut hasher = Md5::new();
	hasher.update(features_b64.as_bytes());
	let digest = hasher.finalize();
	digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// `confidence = min(1.0, sqrt(E) * sqrt(variance) * 10)` (spec §4.2
/// step 9). NaN/Inf anomalies downstream of log/sqrt are clamped to
/// 0.0, treating them as noise (spec §4.2, §7).
fn confidence_score(features: &[f32]) -> f32 {
	if features.is_empty() {
		return 0.0;
	}
	let n = features.len() as f32;
	let mean = features.iter().sum::<f32>() / n;
	let variance = features.iter().map(|f| (f - mean) * (f - mean)).sum::<f32>() / n;
	let energy: f32 = features.iter().map(|f| f * f).sum();

	let raw = energy.sqrt() * variance.sqrt() * 10.0;
	if raw.is_finite() {
		raw.clamp(0.0, 1.0)
	} else {
		0.0
	}
}

/// A window rejected by the noise gate still produces a `Fingerprint`,
/// with confidence 0.0 so transport never sends it (spec §4.2 step 1,
/// §8's noise-idempotence law).
fn silent_fingerprint(window: &AudioWindow, cfg: &AudioConfig) -> Fingerprint {
	Fingerprint {
		hash: content_hash(""),
		timestamp_us: window.timestamp_us,
		confidence: 0.0,
		duration_secs: cfg.capture_duration,
		features_b64: String::new(),
		sample_rate: cfg.sample_rate,
		quality_level: cfg.quality_level,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn window(samples: Vec<f32>, cfg: AudioConfig) -> AudioWindow {
		AudioWindow { samples, timestamp_us: 1_000_000, config: cfg }
	}

	fn test_config() -> AudioConfig {
		AudioConfig {
			sample_rate: 16000,
			fft_size: 256,
			hop_length: 128,
			n_mels: 13,
			min_freq: 80.0,
			max_freq: 7500.0,
			capture_duration: 1,
			capture_interval: 30,
			noise_threshold: 0.001,
			quality_level: 3,
		}
	}

	#[test]
	fn silent_room_yields_zero_confidence_and_does_not_qualify_for_transmit() {
		let cfg = test_config();
		let samples = vec![0.0f32; cfg.sample_rate as usize];
		let w = window(samples, cfg);
		let mut fp = Fingerprinter::new();
		let out = fp.process(&w);
		assert_eq!(out.confidence, 0.0);
	}

	#[test]
	fn hash_is_32_lowercase_hex_chars() {
		let cfg = test_config();
		let samples: Vec<f32> = (0..cfg.sample_rate as usize)
			.map(|i| 0.3 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / cfg.sample_rate as f32).sin())
			.collect();
		let w = window(samples, cfg);
		let mut fp = Fingerprinter::new();
		let out = fp.process(&w);
		assert_eq!(out.hash.len(), 32);
		assert!(out.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn steady_tone_is_deterministic_across_two_runs() {
		let cfg = test_config();
		let samples: Vec<f32> = (0..cfg.sample_rate as usize)
			.map(|i| 0.3 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / cfg.sample_rate as f32).sin())
			.collect();
		let w1 = window(samples.clone(), cfg);
		let w2 = window(samples, cfg);

		let mut fp1 = Fingerprinter::new();
		let mut fp2 = Fingerprinter::new();
		let out1 = fp1.process(&w1);
		let out2 = fp2.process(&w2);

		assert_eq!(out1.hash, out2.hash);
		assert_eq!(out1.features_b64, out2.features_b64);
		assert!(out1.confidence > 0.0);
	}

	#[test]
	fn confidence_is_always_within_unit_interval() {
		let cfg = test_config();
		let samples: Vec<f32> = (0..cfg.sample_rate as usize)
			.map(|i| if i % 7 == 0 { 0.9 } else { -0.9 })
			.collect();
		let w = window(samples, cfg);
		let mut fp = Fingerprinter::new();
		let out = fp.process(&w);
		assert!(out.confidence >= 0.0 && out.confidence <= 1.0);
	}

	#[test]
	fn pre_emphasis_leaves_index_zero_untouched() {
		let mut samples = vec![1.0, 1.0, 1.0, 1.0];
		pre_emphasize(&mut samples, 0.97);
		assert_eq!(samples[0], 1.0);
		assert!((samples[1] - (1.0 - 0.97)).abs() < 1e-6);
	}

	#[test]
	fn frame_count_matches_spec_formula() {
		assert_eq!(frame_count(16000, 1024, 512), (16000 - 1024) / 512 + 1);
		assert_eq!(frame_count(100, 1024, 512), 0);
	}
}
