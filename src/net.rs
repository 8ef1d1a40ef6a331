//! Link layer: Wi-Fi station association and time sync (spec §2's
//! "Link layer" row, detailed in SPEC_FULL.md §E). Out of the spec's
//! "core" but required to let C2 stamp fingerprints with wall-clock
//! time and to let C4 gate the `Connecting -> Sampling` transition.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use esp_idf_hal::cpu::Core;
use esp_idf_hal::modem::Modem;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::{EspSntp, SyncStatus};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration as WifiConfiguration, EspWifi};
use log::info;

use crate::constants::{priority, TIME_SYNC_INTERVAL_SECS, WIFI_PASSWORD, WIFI_SSID};

/// Brings up Wi-Fi in station mode and blocks until associated with an
/// IP lease. This is what the supervisor's `Connecting` state waits on.
/// `nvs` is the same default partition handle the config store uses
/// for its own namespace — the partition singleton can only be taken
/// once, so callers share one clone of it rather than each taking it.
pub fn connect_wifi(modem: Modem, nvs: EspDefaultNvsPartition) -> Result<BlockingWifi<EspWifi<'static>>> {
	let sysloop = EspSystemEventLoop::take()?;

	let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), Some(nvs))?, sysloop)?;

	wifi.set_configuration(&WifiConfiguration::Client(ClientConfiguration {
		ssid: WIFI_SSID.try_into().map_err(|_| anyhow!("SSID too long"))?,
		password: WIFI_PASSWORD.try_into().map_err(|_| anyhow!("password too long"))?,
		auth_method: AuthMethod::WPA2Personal,
		..Default::default()
	}))?;

	wifi.start()?;
	info!("connecting to {WIFI_SSID}...");
	wifi.connect()?;
	wifi.wait_netif_up()?;
	info!("Wi-Fi associated, link up");

	Ok(wifi)
}

pub fn is_connected(wifi: &BlockingWifi<EspWifi<'static>>) -> bool {
	wifi.is_connected().unwrap_or(false)
}

/// Starts SNTP and blocks (bounded) for the first sync so the first
/// acquired window gets a meaningful Unix-epoch timestamp.
pub fn sync_time() -> Result<EspSntp<'static>> {
	let sntp = EspSntp::new_default()?;
	info!("waiting for SNTP sync...");
	let mut waited = Duration::ZERO;
	let step = Duration::from_millis(200);
	let budget = Duration::from_secs(15);
	while sntp.get_sync_status() != SyncStatus::Completed && waited < budget {
		esp_idf_hal::delay::FreeRtos::delay_ms(step.as_millis() as u32);
		waited += step;
	}
	if sntp.get_sync_status() == SyncStatus::Completed {
		info!("SNTP synced");
	} else {
		info!("SNTP sync timed out, continuing with best-effort clock");
	}
	Ok(sntp)
}

/// Spawns the Time Sync task (spec §5's task table): holds the `EspSntp`
/// service alive and logs its status every hour. ESP-IDF's SNTP client
/// re-syncs on its own internal schedule; this task's job is simply to
/// observe and report that, matching the spec's dedicated task slot.
pub fn spawn_time_sync_task(sntp: EspSntp<'static>) {
	let thread_config = ThreadSpawnConfiguration {
		name: Some(b"time-sync\0"),
		priority: priority::TIME_SYNC,
		pin_to_core: Some(Core::Core0),
		..Default::default()
	};
	thread_config.set().expect("failed to set time sync thread configuration");

	thread::Builder::new()
		.stack_size(3072)
		.name("time-sync".into())
		.spawn(move || loop {
			thread::sleep(Duration::from_secs(TIME_SYNC_INTERVAL_SECS));
			info!("time sync status: {:?}", sntp.get_sync_status());
		})
		.expect("failed to spawn time sync thread");
}
