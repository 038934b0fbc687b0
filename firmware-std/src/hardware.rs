//! ESP-IDF bindings for the engine's platform traits.
//!
//! One [`EspHardware`] is owned by the session worker thread. The promiscuous
//! callback and the hop timer run elsewhere and only touch the shared
//! `CONTROL` state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

use antihunter::board;
use antihunter::defaults::{REGULATORY_CHANNEL_COUNT, REGULATORY_FIRST_CHANNEL, REGULATORY_MAX_TX_POWER};
use antihunter::platform::{AudioOut, Clock, ControlSurface, MeshLink};
use antihunter::radio::{RadioDriver, RadioError};

use esp_idf_svc::hal::uart::UartDriver;
use esp_idf_svc::sys::{
    esp, esp_coex_prefer_t_ESP_COEX_PREFER_BALANCE, esp_coex_preference_set, esp_timer_get_time,
    esp_wifi_set_channel, esp_wifi_set_country, esp_wifi_set_promiscuous,
    esp_wifi_set_promiscuous_filter, esp_wifi_set_promiscuous_rx_cb, wifi_country_policy_t_WIFI_COUNTRY_POLICY_MANUAL,
    wifi_country_t, wifi_promiscuous_filter_t, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE, EspError, ESP_FAIL,
    WIFI_PROMIS_FILTER_MASK_DATA, WIFI_PROMIS_FILTER_MASK_MGMT,
};
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, BlockingWifi, Configuration, EspWifi};

use crate::buzzer::Buzzer;

/// Set while a session wants BLE adverts; the scan thread aborts its burst
/// as soon as this drops.
pub(crate) static BLE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Milliseconds since boot.
pub(crate) fn now_ms() -> u32 {
    // esp_timer counts microseconds since boot
    (unsafe { esp_timer_get_time() } / 1000) as u32
}

fn driver_err(e: EspError) -> RadioError {
    RadioError::Driver(e.code())
}

pub(crate) struct EspHardware {
    wifi: BlockingWifi<EspWifi<'static>>,
    timers: EspTaskTimerService,
    hop_timer: Option<EspTimer<'static>>,
    buzzer: Option<Buzzer>,
    mesh: Option<UartDriver<'static>>,
    ble_bursts: SyncSender<u32>,
}

impl EspHardware {
    pub fn new(
        wifi: BlockingWifi<EspWifi<'static>>,
        timers: EspTaskTimerService,
        buzzer: Option<Buzzer>,
        mesh: Option<UartDriver<'static>>,
        ble_bursts: SyncSender<u32>,
    ) -> Self {
        Self {
            wifi,
            timers,
            hop_timer: None,
            buzzer,
            mesh,
            ble_bursts,
        }
    }
}

impl Clock for EspHardware {
    fn now_ms(&self) -> u32 {
        now_ms()
    }

    fn sleep_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

impl AudioOut for EspHardware {
    fn beep(&mut self, freq_hz: u32, duration_ms: u32) {
        if let Some(buzzer) = self.buzzer.as_mut() {
            buzzer.beep(freq_hz, duration_ms);
        }
    }

    fn beep_pattern(&mut self, count: u8, gap_ms: u32) {
        if let Some(buzzer) = self.buzzer.as_mut() {
            buzzer.beep_pattern(count, gap_ms);
        }
    }
}

impl MeshLink for EspHardware {
    fn send_line(&mut self, line: &str) -> bool {
        let Some(uart) = self.mesh.as_ref() else {
            return false;
        };
        uart.write(line.as_bytes()).and_then(|_| uart.write(b"\r\n")).is_ok()
    }
}

impl ControlSurface for EspHardware {
    fn shut_down(&mut self) {
        if let Err(e) = self.wifi.stop() {
            log::warn!("WiFi stop failed: {:?}", e);
        }
        log::info!("Access point down");
    }

    fn try_bring_up(&mut self) -> bool {
        let ap = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: board::AP_SSID.try_into().unwrap_or_default(),
            password: board::AP_PASS.try_into().unwrap_or_default(),
            channel: board::AP_CHANNEL,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        });
        let result = self.wifi.set_configuration(&ap).and_then(|_| self.wifi.start());
        match result {
            Ok(()) => {
                log::info!("Access point '{}' up on channel {}", board::AP_SSID, board::AP_CHANNEL);
                true
            }
            Err(e) => {
                log::warn!("Access point bring-up failed: {:?}", e);
                false
            }
        }
    }

    fn reset_radio(&mut self) {
        let _ = self.wifi.stop();
        thread::sleep(Duration::from_millis(100));
    }
}

impl RadioDriver for EspHardware {
    fn set_country(&mut self) -> Result<(), RadioError> {
        let mut cc = [0 as core::ffi::c_char; 3];
        for (dst, src) in cc.iter_mut().zip(board::COUNTRY.bytes().take(2)) {
            *dst = src as core::ffi::c_char;
        }
        let country = wifi_country_t {
            cc,
            schan: REGULATORY_FIRST_CHANNEL,
            nchan: REGULATORY_CHANNEL_COUNT,
            max_tx_power: REGULATORY_MAX_TX_POWER,
            policy: wifi_country_policy_t_WIFI_COUNTRY_POLICY_MANUAL,
            ..Default::default()
        };
        esp!(unsafe { esp_wifi_set_country(&country) }).map_err(driver_err)
    }

    fn start_promiscuous(&mut self) -> Result<(), RadioError> {
        self.wifi
            .set_configuration(&Configuration::Client(Default::default()))
            .map_err(driver_err)?;
        self.wifi.start().map_err(driver_err)?;

        let filter = wifi_promiscuous_filter_t {
            filter_mask: WIFI_PROMIS_FILTER_MASK_MGMT | WIFI_PROMIS_FILTER_MASK_DATA,
        };
        unsafe {
            esp!(esp_wifi_set_promiscuous_filter(&filter)).map_err(driver_err)?;
            esp!(esp_wifi_set_promiscuous_rx_cb(Some(crate::promisc_rx_cb))).map_err(driver_err)?;
            esp!(esp_wifi_set_promiscuous(true)).map_err(driver_err)?;
        }
        log::info!("WiFi sniffer in promiscuous mode");
        Ok(())
    }

    fn stop_promiscuous(&mut self) {
        unsafe {
            esp_wifi_set_promiscuous(false);
            esp_wifi_set_promiscuous_rx_cb(None);
        }
        if let Err(e) = self.wifi.stop() {
            log::warn!("WiFi stop failed: {:?}", e);
        }
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
        esp!(unsafe { esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE) })
            .map_err(driver_err)
    }

    fn start_hop_timer(&mut self, period_ms: u32) -> Result<(), RadioError> {
        let timer = self
            .timers
            .timer(|| {
                let ch = crate::CONTROL.hopper.advance();
                unsafe {
                    esp_wifi_set_channel(ch, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE);
                }
            })
            .map_err(driver_err)?;
        timer
            .every(Duration::from_millis(period_ms as u64))
            .map_err(driver_err)?;
        self.hop_timer = Some(timer);
        Ok(())
    }

    fn stop_hop_timer(&mut self) {
        if let Some(timer) = self.hop_timer.take() {
            let _ = timer.cancel();
        }
    }

    fn set_coex_balanced(&mut self) -> Result<(), RadioError> {
        esp!(unsafe { esp_coex_preference_set(esp_coex_prefer_t_ESP_COEX_PREFER_BALANCE) })
            .map_err(driver_err)
    }

    fn init_ble_scan(&mut self) -> Result<(), RadioError> {
        BLE_ACTIVE.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn ble_scan_burst(&mut self, window_ms: u32) -> Result<(), RadioError> {
        match self.ble_bursts.try_send(window_ms) {
            // A full queue means a burst is still running
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(RadioError::Driver(ESP_FAIL)),
        }
    }

    fn stop_ble_scan(&mut self) {
        BLE_ACTIVE.store(false, Ordering::Relaxed);
    }
}
