//! Fatal error classification (spec §7). Anything reaching here halts
//! the device: the caller logs it with `error!` and loops forever with
//! no further state transitions, requiring a physical reset.

#[derive(Debug, thiserror::Error)]
pub enum FatalError {
	#[error("I2S driver installation failed: {0}")]
	I2sInstall(#[source] anyhow::Error),
	#[error("display driver failed: {0}")]
	DisplayInit(#[source] anyhow::Error),
}
