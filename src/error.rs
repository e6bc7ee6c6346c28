//! Unified error type for the macropad runtime.
//!
//! All error variants carry only fixed-size data so they stay `Copy`
//! and cheap to log with `defmt` on target.

use alloc::format;
use alloc::string::String;

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Transports
    /// A BLE or USB write failed.
    Transport(TransportError),

    /// The transport was never initialised.
    NotInitialized,

    // OTA
    /// The OTA state machine rejected a message or failed to apply it.
    Ota(OtaError),

    // Storage
    /// Flash read/write/erase failed.
    Storage(StoreError),

    // UART
    /// The companion link refused or dropped bytes.
    Uart,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Failures reported by a GATT write/notify or a USB endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The peer is gone.
    Disconnected,
    /// The connection handle is no longer known to the stack.
    InvalidHandle,
    /// The stack has no free buffers right now.
    Busy,
    /// Any other raw error code from the stack.
    Raw(u32),
}

impl TransportError {
    /// Stale-connection conditions after which the handle is dropped.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            TransportError::Disconnected | TransportError::InvalidHandle | TransportError::Busy
        )
    }
}

/// Failures of the firmware image store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The slot holds no image.
    NotFound,
    /// The image does not fit its partition.
    NoSpace,
    /// The underlying flash operation failed.
    Flash,
}

/// OTA state machine failures. Each renders the status text shown in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaError {
    AlreadyInProgress,
    NotInProgress,
    /// Chunk payload was not valid base64.
    Decode,
    ChunkCountMismatch { received: u32, expected: u32 },
    SizeMismatch { actual: u32, expected: u32 },
    Store(StoreError),
}

impl OtaError {
    pub fn status_message(&self) -> String {
        match self {
            OtaError::AlreadyInProgress => String::from("OTA already in progress"),
            OtaError::NotInProgress => String::from("OTA: No update in progress"),
            OtaError::Decode => String::from("OTA error: invalid chunk encoding"),
            OtaError::ChunkCountMismatch { received, expected } if received < expected => {
                format!("OTA: Incomplete update ({} < {})", received, expected)
            }
            OtaError::ChunkCountMismatch { received, expected } => {
                format!("OTA: Too many chunks ({} > {})", received, expected)
            }
            OtaError::SizeMismatch { actual, expected } => {
                format!("OTA: Size mismatch ({} != {})", actual, expected)
            }
            OtaError::Store(StoreError::NotFound) => String::from("OTA error: staging image missing"),
            OtaError::Store(StoreError::NoSpace) => String::from("OTA error: image too large"),
            OtaError::Store(StoreError::Flash) => String::from("OTA error: flash write failed"),
        }
    }
}

// Convenience conversions

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Error::Ota(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Storage(e)
    }
}

impl From<StoreError> for OtaError {
    fn from(e: StoreError) -> Self {
        OtaError::Store(e)
    }
}
