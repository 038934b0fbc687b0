/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and the access-point
/// configuration, selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BUZZER_PIN: u8 = 3; // passive piezo on D2
    pub const MESH_RX_PIN: u8 = 4;
    pub const MESH_TX_PIN: u8 = 5;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(all(feature = "board-m5stickc", not(feature = "board-xiao")))]
mod hw {
    pub const BUZZER_PIN: u8 = 2;
    pub const MESH_RX_PIN: u8 = 36; // Grove port
    pub const MESH_TX_PIN: u8 = 26;
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BUZZER_PIN: u8 = 3;
    pub const MESH_RX_PIN: u8 = 4;
    pub const MESH_TX_PIN: u8 = 5;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Soft-AP the operator joins to reach the device.
pub const AP_SSID: &str = "Antihunter";
pub const AP_PASS: &str = "ouispy123";
pub const AP_CHANNEL: u8 = 6;

/// Regulatory country code applied before capture.
pub const COUNTRY: &str = "NO";

/// Baud rate of the mesh radio UART.
pub const MESH_BAUD: u32 = 115_200;
