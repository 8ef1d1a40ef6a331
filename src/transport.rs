//! Transport (C3).
//!
//! Serialises a [`Fingerprint`] into the wire JSON shape from spec §6
//! and POSTs it to the configured server, reporting success iff the
//! response status is 200 or 201.

use embedded_svc::http::client::Client;
use embedded_svc::http::Method;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::client::{Configuration as HttpClientConfig, EspHttpConnection};
use log::{debug, warn};
use serde::Serialize;

use crate::constants::{DEVICE_ID, HTTP_TIMEOUT_MS, SERVER_URL};
use crate::dsp::Fingerprint;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("network link not associated")]
	NotReady,
	#[error("request timed out")]
	Timeout,
	#[error("server returned status {0}")]
	ServerError(u16),
	#[error("transport error: {0}")]
	TransportError(String),
}

/// The exact wire shape from spec §6.
#[derive(Debug, Serialize)]
struct FingerprintWire<'a> {
	device_id: &'a str,
	timestamp: u64,
	hash: &'a str,
	confidence: f32,
	duration: u32,
	features: &'a str,
	sample_rate: u32,
	quality_level: u8,
}

impl<'a> From<&'a Fingerprint> for FingerprintWire<'a> {
	fn from(fp: &'a Fingerprint) -> Self {
		Self {
			device_id: DEVICE_ID,
			timestamp: fp.timestamp_us,
			hash: &fp.hash,
			confidence: fp.confidence,
			duration: fp.duration_secs,
			features: &fp.features_b64,
			sample_rate: fp.sample_rate,
			quality_level: fp.quality_level,
		}
	}
}

pub struct Transport {
	link_associated: bool,
}

impl Transport {
	pub fn new() -> Self {
		Self { link_associated: false }
	}

	pub fn set_link_associated(&mut self, associated: bool) {
		self.link_associated = associated;
	}

	/// POSTs one fingerprint. Returns `NotReady` immediately without
	/// attempting I/O if the link is down (spec §4.3's precondition).
	pub fn publish(&self, fingerprint: &Fingerprint) -> Result<(), TransportError> {
		if !self.link_associated {
			return Err(TransportError::NotReady);
		}

		let wire = FingerprintWire::from(fingerprint);
		let body = serde_json::to_vec(&wire)
			.map_err(|e| TransportError::TransportError(format!("serialize: {e}")))?;

		let connection = EspHttpConnection::new(&HttpClientConfig {
			timeout: Some(std::time::Duration::from_millis(HTTP_TIMEOUT_MS)),
			crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
			..Default::default()
		})
		.map_err(|e| TransportError::TransportError(e.to_string()))?;
		let mut client = Client::wrap(connection);

		let content_length = body.len().to_string();
		let headers = [("Content-Type", "application/json"), ("Content-Length", content_length.as_str())];

		let mut request = client
			.request(Method::Post, SERVER_URL, &headers)
			.map_err(|e| classify_io_error(e.to_string()))?;
		request.write_all(&body).map_err(|e| classify_io_error(e.to_string()))?;
		request.flush().map_err(|e| classify_io_error(e.to_string()))?;

		let mut response = request.submit().map_err(|e| classify_io_error(e.to_string()))?;
		let status = response.status();
		let mut discard = [0u8; 64];
		while response.read(&mut discard).unwrap_or(0) > 0 {}

		match status {
			200 | 201 => {
				debug!("fingerprint accepted, status {status}");
				Ok(())
			}
			other => {
				warn!("server rejected fingerprint: status {other}");
				Err(TransportError::ServerError(other))
			}
		}
	}
}

impl Default for Transport {
	fn default() -> Self {
		Self::new()
	}
}

fn classify_io_error(message: String) -> TransportError {
	if message.to_lowercase().contains("timeout") {
		TransportError::Timeout
	} else {
		TransportError::TransportError(message)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dsp::Fingerprint;

	fn sample_fingerprint() -> Fingerprint {
		Fingerprint {
			hash: "0".repeat(32),
			timestamp_us: 42,
			confidence: 0.5,
			duration_secs: 30,
			features_b64: "AAAA".to_string(),
			sample_rate: 16000,
			quality_level: 3,
		}
	}

	#[test]
	fn not_ready_short_circuits_without_io() {
		let transport = Transport::new();
		assert!(matches!(transport.publish(&sample_fingerprint()), Err(TransportError::NotReady)));
	}

	#[test]
	fn wire_shape_has_exactly_the_spec_keys() {
		let fp = sample_fingerprint();
		let wire = FingerprintWire::from(&fp);
		let value = serde_json::to_value(&wire).unwrap();
		let obj = value.as_object().unwrap();
		let expected = ["device_id", "timestamp", "hash", "confidence", "duration", "features", "sample_rate", "quality_level"];
		assert_eq!(obj.len(), expected.len());
		for key in expected {
			assert!(obj.contains_key(key), "missing key {key}");
		}
	}
}
