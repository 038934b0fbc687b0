//! Antihunter: ESP-IDF std firmware
//!
//! Thread-based binding of the `antihunter` engine to ESP-IDF services:
//! WiFi promiscuous capture and the soft-AP via esp-idf-svc, BLE scanning via
//! esp32-nimble, the buzzer on LEDC, the mesh radio on UART1 and settings in
//! NVS. Commands arrive as NDJSON on the serial console.

mod buzzer;
mod hardware;
mod store;

use std::io::Read;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use antihunter::comm::{self, LineReader, Response};
use antihunter::control::Control;
use antihunter::protocol::{DeviceMessage, HostCommand, VERSION};
use antihunter::session::{SessionKind, SessionRequest, SessionState};
use antihunter::board;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::task::block_on;
use esp_idf_svc::hal::uart::{self, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{wifi_promiscuous_pkt_t, wifi_promiscuous_pkt_type_t};
use esp_idf_svc::timer::EspTaskTimerService;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use esp32_nimble::{BLEDevice, BLEScan};

use antihunter::platform::ControlSurface;
use buzzer::Buzzer;
use hardware::{now_ms, EspHardware, BLE_ACTIVE};
use store::NvsStore;

// ── Shared state ─────────────────────────────────────────────────────

/// Engine state shared by the capture callbacks, the console and the worker.
pub(crate) static CONTROL: Control = Control::new();

/// Per-session logs. Too large for a task stack, so it lives in .bss and is
/// only ever locked by the session worker.
static SESSION_STATE: Mutex<SessionState> = Mutex::new(SessionState::new());

// ── WiFi promiscuous callback ────────────────────────────────────────

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task and must not block: the engine only filters
/// the frame and does a non-blocking queue push.
pub(crate) unsafe extern "C" fn promisc_rx_cb(
    buf: *mut std::ffi::c_void,
    _pkt_type: wifi_promiscuous_pkt_type_t,
) {
    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let rssi = pkt.rx_ctrl.rssi() as i8;
    let channel = pkt.rx_ctrl.channel() as u8;
    let sig_len = pkt.rx_ctrl.sig_len() as usize;

    if sig_len == 0 {
        return;
    }

    // Safety: payload is `sig_len` bytes starting at pkt.payload
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), sig_len) };
    CONTROL.capture.on_wifi_frame(payload, rssi, channel, now_ms());
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("Antihunter v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Hold power on (M5StickC Plus2)
    #[cfg(feature = "m5stickc")]
    let _power_hold = {
        use esp_idf_svc::hal::gpio::PinDriver;
        let mut p = PinDriver::output(peripherals.pins.gpio4)?;
        p.set_high()?;
        p
    };

    // ── Settings ─────────────────────────────────────────────────────

    let mut store = NvsStore::new(nvs.clone())?;
    CONTROL.load_config(&mut store);

    // ── Buzzer ───────────────────────────────────────────────────────

    #[cfg(feature = "m5stickc")]
    let buzzer_pin = peripherals.pins.gpio2;
    #[cfg(not(feature = "m5stickc"))]
    let buzzer_pin = peripherals.pins.gpio3;

    let buzzer = match Buzzer::new(peripherals.ledc.timer0, peripherals.ledc.channel0, buzzer_pin) {
        Ok(b) => Some(b),
        Err(e) => {
            log::error!("Buzzer init failed: {:?}", e);
            None
        }
    };

    // ── Mesh UART ────────────────────────────────────────────────────

    #[cfg(feature = "m5stickc")]
    let (mesh_tx, mesh_rx) = (peripherals.pins.gpio26, peripherals.pins.gpio36);
    #[cfg(not(feature = "m5stickc"))]
    let (mesh_tx, mesh_rx) = (peripherals.pins.gpio5, peripherals.pins.gpio4);

    let mesh_config = uart::config::Config::default().baudrate(Hertz(board::MESH_BAUD));
    let mesh = match UartDriver::new(
        peripherals.uart1,
        mesh_tx,
        mesh_rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &mesh_config,
    ) {
        Ok(uart) => {
            log::info!("Mesh UART on RX={} TX={}", board::MESH_RX_PIN, board::MESH_TX_PIN);
            Some(uart)
        }
        Err(e) => {
            log::error!("Mesh UART init failed: {:?}", e);
            None
        }
    };

    // ── WiFi ─────────────────────────────────────────────────────────

    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    let timers = EspTaskTimerService::new()?;

    // ── BLE scan thread ──────────────────────────────────────────────

    let (burst_tx, burst_rx) = mpsc::sync_channel::<u32>(1);
    thread::Builder::new()
        .name("blescan".into())
        .stack_size(4096)
        .spawn(move || {
            ble_scan_thread(burst_rx);
        })?;
    log::info!("BLE scan thread spawned");

    let mut hw = EspHardware::new(wifi, timers, buzzer, mesh, burst_tx);
    if !hw.try_bring_up() {
        log::error!("Access point failed to start; console control only");
    }

    // ── Session worker ───────────────────────────────────────────────

    let (session_tx, session_rx) = mpsc::sync_channel::<SessionRequest>(1);
    thread::Builder::new()
        .name("session".into())
        .stack_size(16384)
        .spawn(move || {
            session_thread(hw, session_rx);
        })?;
    log::info!("Session worker spawned");

    log::info!(
        "Build target: {}",
        if cfg!(feature = "xiao") {
            "xiao (ESP32-S3)"
        } else if cfg!(feature = "m5stickc") {
            "m5stickc (ESP32)"
        } else {
            "unknown"
        }
    );

    console_loop(store, session_tx);
}

// ── Session worker ───────────────────────────────────────────────────

fn session_thread(mut hw: EspHardware, requests: mpsc::Receiver<SessionRequest>) {
    log::info!("Session worker started");
    let mut state = SESSION_STATE.lock().unwrap_or_else(PoisonError::into_inner);

    while let Ok(req) = requests.recv() {
        if !CONTROL.run(&mut hw, &mut state, &req) {
            log::error!("Access point did not come back after the session");
        }
    }
}

// ── BLE scan thread ──────────────────────────────────────────────────

fn ble_scan_thread(bursts: mpsc::Receiver<u32>) {
    log::info!("BLE scan thread started");

    let ble_device = BLEDevice::take();
    let mut scan = BLEScan::new();
    scan.active_scan(true).interval(100).window(99);

    while let Ok(window_ms) = bursts.recv() {
        if !BLE_ACTIVE.load(Ordering::Relaxed) {
            continue;
        }
        let result = block_on(scan.start(ble_device, window_ms as i32, |device, data| {
            if !BLE_ACTIVE.load(Ordering::Relaxed) {
                return Some(()); // Session ended, cut the burst short
            }
            let addr = device.addr().as_be_bytes();
            CONTROL
                .capture
                .on_ble_advert(&addr, device.rssi(), data.payload(), now_ms());
            None::<()>
        }));
        if let Err(e) = result {
            log::warn!("BLE scan burst failed: {:?}", e);
        }
    }
}

// ── Serial console ───────────────────────────────────────────────────

fn console_loop(mut store: NvsStore, sessions: SyncSender<SessionRequest>) -> ! {
    let mut reader = LineReader::new();
    let mut stdin = std::io::stdin();
    let mut byte = [0u8; 1];

    loop {
        match stdin.read(&mut byte) {
            Ok(1) => {
                if let Some(line) = reader.feed(byte[0]) {
                    match comm::parse_command(line) {
                        Some(cmd) => dispatch(cmd, &mut store, &sessions),
                        None => comm::emit(&DeviceMessage::Ack {
                            cmd: "unknown",
                            ok: false,
                            msg: Some("Unrecognized command"),
                        }),
                    }
                }
            }
            // The console VFS is non-blocking
            _ => thread::sleep(Duration::from_millis(20)),
        }
    }
}

fn dispatch(cmd: HostCommand, store: &mut NvsStore, sessions: &SyncSender<SessionRequest>) {
    match comm::handle_command(cmd, &CONTROL, store, now_ms()) {
        Response::Start(req) => {
            let name = match req.kind {
                SessionKind::ListScan(_) => "scan",
                SessionKind::Tracker { .. } => "track",
                SessionKind::Flood(_) => "detect",
            };
            match sessions.try_send(req) {
                Ok(()) => comm::emit(&DeviceMessage::Ack {
                    cmd: name,
                    ok: true,
                    msg: None,
                }),
                Err(_) => {
                    CONTROL.slot.release();
                    comm::emit(&DeviceMessage::Ack {
                        cmd: name,
                        ok: false,
                        msg: Some("Session worker unavailable"),
                    });
                }
            }
        }
        Response::Ack { cmd, ok, msg } => comm::emit(&DeviceMessage::Ack { cmd, ok, msg }),
        Response::Diagnostics(text) => print_block(&text),
        Response::Results(text) if text.is_empty() => log::info!("No scan data yet"),
        Response::Results(text) => print_block(&text),
        Response::Targets(text) => print_block(&text),
    }
}

fn print_block(text: &str) {
    for line in text.lines() {
        log::info!("{}", line);
    }
}
