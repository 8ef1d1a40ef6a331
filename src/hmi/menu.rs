//! The 8-item config menu cursor (spec §4.6): sample rate, FFT size,
//! MFCC coefficients, capture duration, capture interval, noise
//! threshold, quality level, "Exit" — cycled by Button 1 while in
//! `Config`, in this fixed cyclic order.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{AudioConfig, Field};

const ITEM_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
	SampleRate,
	FftSize,
	NMels,
	CaptureDuration,
	CaptureInterval,
	NoiseThreshold,
	QualityLevel,
	Exit,
}

impl MenuItem {
	const ORDER: [MenuItem; ITEM_COUNT] = [
		MenuItem::SampleRate,
		MenuItem::FftSize,
		MenuItem::NMels,
		MenuItem::CaptureDuration,
		MenuItem::CaptureInterval,
		MenuItem::NoiseThreshold,
		MenuItem::QualityLevel,
		MenuItem::Exit,
	];

	fn at(index: usize) -> MenuItem {
		Self::ORDER[index % ITEM_COUNT]
	}

	/// `None` for "Exit", which has no backing field to advance.
	pub fn field(&self) -> Option<Field> {
		match self {
			MenuItem::SampleRate => Some(Field::SampleRate),
			MenuItem::FftSize => Some(Field::FftSize),
			MenuItem::NMels => Some(Field::NMels),
			MenuItem::CaptureDuration => Some(Field::CaptureDuration),
			MenuItem::CaptureInterval => Some(Field::CaptureInterval),
			MenuItem::NoiseThreshold => Some(Field::NoiseThreshold),
			MenuItem::QualityLevel => Some(Field::QualityLevel),
			MenuItem::Exit => None,
		}
	}
}

pub struct MenuCursor {
	index: AtomicUsize,
}

impl MenuCursor {
	pub fn new() -> Self {
		Self { index: AtomicUsize::new(0) }
	}

	pub fn reset(&self) {
		self.index.store(0, Ordering::Relaxed);
	}

	/// Advances the cursor modulo 8 (spec §4.6: "advance cursor (mod 8)").
	pub fn advance(&self) -> MenuItem {
		let next = (self.index.load(Ordering::Relaxed) + 1) % ITEM_COUNT;
		self.index.store(next, Ordering::Relaxed);
		MenuItem::at(next)
	}

	pub fn current(&self) -> MenuItem {
		MenuItem::at(self.index.load(Ordering::Relaxed))
	}

	pub fn current_label(&self, cfg: &AudioConfig) -> String {
		match self.current() {
			MenuItem::SampleRate => format!("Rate: {} Hz", cfg.sample_rate),
			MenuItem::FftSize => format!("FFT size: {}", cfg.fft_size),
			MenuItem::NMels => format!("Coeffs: {}", cfg.n_mels),
			MenuItem::CaptureDuration => format!("Duration: {}s", cfg.capture_duration),
			MenuItem::CaptureInterval => format!("Interval: {}s", cfg.capture_interval),
			MenuItem::NoiseThreshold => format!("Noise: {:.3}", cfg.noise_threshold),
			MenuItem::QualityLevel => format!("Quality: {}", cfg.quality_level),
			MenuItem::Exit => "Exit".to_string(),
		}
	}
}

impl Default for MenuCursor {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cursor_cycles_through_all_eight_items_in_order() {
		let cursor = MenuCursor::new();
		assert_eq!(cursor.current(), MenuItem::SampleRate);
		let expected = [
			MenuItem::FftSize,
			MenuItem::NMels,
			MenuItem::CaptureDuration,
			MenuItem::CaptureInterval,
			MenuItem::NoiseThreshold,
			MenuItem::QualityLevel,
			MenuItem::Exit,
			MenuItem::SampleRate,
		];
		for item in expected {
			assert_eq!(cursor.advance(), item);
		}
	}

	#[test]
	fn reset_returns_to_sample_rate() {
		let cursor = MenuCursor::new();
		cursor.advance();
		cursor.advance();
		cursor.reset();
		assert_eq!(cursor.current(), MenuItem::SampleRate);
	}
}
