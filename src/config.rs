//! Application-wide constants and compile-time configuration.
//!
//! All matrix dimensions, timing windows, and protocol constants live
//! here so they can be tuned in one place.

// Key matrix

/// Number of row sense lines.
pub const MATRIX_ROWS: usize = 5;

/// Number of column drive lines.
pub const MATRIX_COLS: usize = 4;

/// Settle time after asserting a column before sampling rows (µs).
pub const COLUMN_SETTLE_US: u32 = 50;

/// A raw level must stay stable this long before a transition commits (ms).
pub const MATRIX_DEBOUNCE_MS: u32 = 30;

// Rotary encoder

/// Minimum interval between accepted clock-line transitions (ms).
pub const ENCODER_REARM_MS: u32 = 2;

/// Accumulated transitions that make up one logical detent.
pub const ENCODER_DETENT_THRESHOLD: i8 = 2;

/// Minimum interval between two accepted button presses (ms).
pub const ENCODER_BUTTON_COOLDOWN_MS: u32 = 200;

// Scheduler

/// Fixed sleep at the end of every scheduler tick (ms).
pub const TICK_MS: u64 = 5;

/// Delay before the first display push after boot (ms).
pub const INITIAL_DISPLAY_DELAY_MS: u32 = 500;

/// Periodic display refresh towards the companion MCU (ms).
pub const DISPLAY_REFRESH_MS: u32 = 2000;

// BLE

/// Advertised device name.
pub const BLE_DEVICE_NAME: &str = "Macropad";

/// Maximum simultaneous central connections.
pub const BLE_MAX_CONNECTIONS: usize = 2;

/// Settle delay between connect and the all-zero warm-up report (ms).
pub const BLE_WARMUP_DELAY_MS: u32 = 500;

/// Delay between a consumer-control report and its release (ms).
pub const BLE_CONSUMER_RELEASE_MS: u32 = 50;

/// Delay between a disconnect and restarting advertising (ms).
pub const BLE_ADVERTISE_RESTART_MS: u32 = 500;

/// Empty keyboard report period while connected (ms).
pub const BLE_KEEPALIVE_MS: u32 = 2000;

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const BLE_ADV_INTERVAL: u32 = 160;

/// Largest single serial-characteristic write we accept (ATT MTU - 3).
pub const BLE_SERIAL_MAX_WRITE: usize = 244;

/// Upper bound on a partially received serial line per connection.
pub const BLE_REASSEMBLY_LIMIT: usize = 4096;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "macropad";
pub const USB_PRODUCT: &str = "Macropad";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// USB HID polling interval (ms).
pub const USB_HID_POLL_MS: u8 = 1;

// Companion MCU link

/// UART baud rate towards the companion display MCU.
pub const UART_BAUD: u32 = 115_200;

/// Command byte that opens a display-update record.
pub const UART_DISPLAY_COMMAND: u8 = 0x04;

/// Longest telemetry line kept before the accumulator is reset.
pub const UART_LINE_LIMIT: usize = 512;

// Control channel

/// Profile name carried in the config response (matches the web UI).
pub const CONFIG_PROFILE_NAME: &str = "Profil 1";

/// Profile name pushed to the companion display.
pub const DISPLAY_PROFILE_NAME: &str = "Profile 1";

/// Ambient light reading reported to the UI. No sensor is fitted.
pub const LIGHT_LEVEL_PLACEHOLDER: u32 = 500;

/// Longest console line kept before the accumulator is reset.
pub const CONSOLE_LINE_LIMIT: usize = 4096;

// Backlight

/// PWM counter top; duty is scaled from 0-255 brightness onto 0..=top.
pub const BACKLIGHT_PWM_TOP: u16 = 1023;

/// Brightness at power-on.
pub const BACKLIGHT_DEFAULT_BRIGHTNESS: u8 = 128;

// OTA

/// Delay between the completion status and the device reset (ms).
pub const OTA_RESET_DELAY_MS: u32 = 500;

/// Flash page size for nRF52840 (4 KB).
pub const FLASH_PAGE_SIZE: u32 = 4096;

/// Start of the boot stage, where the SoftDevice hands over control.
pub const BOOT_STAGE_START: u32 = 0x0002_7000;

/// Flash reserved for the boot stage.
pub const BOOT_STAGE_SIZE: u32 = 0x0000_8000;

/// Start of the region the application executes from.
pub const APP_ACTIVE_START: u32 = BOOT_STAGE_START + BOOT_STAGE_SIZE;

/// Size of the application region; equal to one image partition.
pub const APP_ACTIVE_SIZE: u32 = FIRMWARE_PARTITION_SIZE;

/// First byte of the firmware image partitions.
pub const FIRMWARE_PARTITIONS_START: u32 = APP_ACTIVE_START + APP_ACTIVE_SIZE;

/// Size of each firmware image partition.
pub const FIRMWARE_PARTITION_SIZE: u32 = 0x0002_F000;

/// Number of image partitions (program, backup, staging).
pub const FIRMWARE_PARTITION_COUNT: usize = 3;

/// Flash page index where the partition role table starts.
pub const ROLE_TABLE_PAGE_START: u32 = 0xEB;

/// Number of flash pages reserved for the role table.
pub const ROLE_TABLE_PAGE_COUNT: u32 = 4;
