//! Over-the-air firmware replacement.
//!
//! An update is a three-phase transaction over logical image slots:
//! chunks are appended to [`Slot::Staging`]; `end` verifies the chunk
//! count and byte size; only then does one [`FirmwareStore::install`]
//! rotate the running [`Slot::Program`] into [`Slot::Backup`] and put
//! staging in its place. A failure at any point discards staging and
//! leaves program and backup alone.

use alloc::vec::Vec;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::clock::{is_due, Millis};
use crate::config::OTA_RESET_DELAY_MS;
use crate::error::{OtaError, StoreError};

/// Logical firmware image slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    /// The image the device boots.
    Program,
    /// The single retained previous version.
    Backup,
    /// The image being received.
    Staging,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Program, Slot::Backup, Slot::Staging];
}

/// Durable image storage. `install` is the commit primitive: it must
/// either fully happen or not at all.
pub trait FirmwareStore {
    fn exists(&mut self, slot: Slot) -> bool;

    /// Start an empty image in `slot`, discarding what was there.
    fn create(&mut self, slot: Slot) -> Result<(), StoreError>;

    fn append(&mut self, slot: Slot, data: &[u8]) -> Result<(), StoreError>;

    /// Image size in bytes.
    fn len(&mut self, slot: Slot) -> Result<u32, StoreError>;

    fn remove(&mut self, slot: Slot) -> Result<(), StoreError>;

    /// Staging becomes program; the previous program, if any, becomes
    /// backup and the previous backup is dropped. One atomic step.
    fn install(&mut self) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        expected_chunks: u32,
        received_chunks: u32,
    },
    /// Installed; waiting for the status message to flush before reset.
    Completing { reset_at: Millis },
}

/// Progress after an accepted chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub chunk: u32,
    pub total: u32,
    /// Whole percent, 0 when the total is unknown.
    pub percent: u32,
}

pub struct OtaSession {
    state: OtaState,
}

impl Default for OtaSession {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaSession {
    pub const fn new() -> Self {
        Self {
            state: OtaState::Idle,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    pub fn is_receiving(&self) -> bool {
        matches!(self.state, OtaState::Receiving { .. })
    }

    pub fn start<S: FirmwareStore>(
        &mut self,
        store: &mut S,
        size: u32,
        chunks: u32,
    ) -> Result<(), OtaError> {
        if self.state != OtaState::Idle {
            return Err(OtaError::AlreadyInProgress);
        }
        store.create(Slot::Staging)?;
        self.state = OtaState::Receiving {
            expected_size: size,
            expected_chunks: chunks,
            received_chunks: 0,
        };
        info!("ota: started, {} bytes in {} chunks", size, chunks);
        Ok(())
    }

    /// Append one chunk. Any failure aborts the whole session.
    pub fn chunk<S: FirmwareStore>(
        &mut self,
        store: &mut S,
        data: &str,
        encoded: bool,
    ) -> Result<Progress, OtaError> {
        let OtaState::Receiving {
            expected_chunks,
            received_chunks,
            ..
        } = self.state
        else {
            return Err(OtaError::NotInProgress);
        };

        let result = decode(data, encoded).and_then(|bytes| {
            store.append(Slot::Staging, &bytes).map_err(OtaError::from)
        });
        if let Err(e) = result {
            self.abort(store);
            return Err(e);
        }

        let received = received_chunks + 1;
        if let OtaState::Receiving {
            received_chunks, ..
        } = &mut self.state
        {
            *received_chunks = received;
        }

        let percent = if expected_chunks > 0 {
            (u64::from(received) * 100 / u64::from(expected_chunks)) as u32
        } else {
            0
        };
        debug!("ota: chunk {}/{} ({}%)", received, expected_chunks, percent);
        Ok(Progress {
            chunk: received,
            total: expected_chunks,
            percent,
        })
    }

    /// Verify and install. On success the device should reset once
    /// [`OtaSession::reset_due`] reports true.
    pub fn end<S: FirmwareStore>(&mut self, store: &mut S, now: Millis) -> Result<(), OtaError> {
        let OtaState::Receiving {
            expected_size,
            expected_chunks,
            received_chunks,
        } = self.state
        else {
            return Err(OtaError::NotInProgress);
        };

        if let Err(e) = verify_and_install(store, expected_size, expected_chunks, received_chunks) {
            warn!("ota: aborted: {:?}", e);
            self.abort(store);
            return Err(e);
        }

        info!("ota: installed, resetting in {} ms", OTA_RESET_DELAY_MS);
        self.state = OtaState::Completing {
            reset_at: now.wrapping_add(OTA_RESET_DELAY_MS),
        };
        Ok(())
    }

    pub fn reset_due(&self, now: Millis) -> bool {
        match self.state {
            OtaState::Completing { reset_at } => is_due(now, reset_at),
            _ => false,
        }
    }

    fn abort<S: FirmwareStore>(&mut self, store: &mut S) {
        if store.exists(Slot::Staging) {
            if let Err(e) = store.remove(Slot::Staging) {
                error!("ota: could not discard staging image: {:?}", e);
            }
        }
        self.state = OtaState::Idle;
    }
}

fn decode(data: &str, encoded: bool) -> Result<Vec<u8>, OtaError> {
    if encoded {
        STANDARD.decode(data.trim()).map_err(|_| OtaError::Decode)
    } else {
        Ok(data.as_bytes().to_vec())
    }
}

fn verify_and_install<S: FirmwareStore>(
    store: &mut S,
    expected_size: u32,
    expected_chunks: u32,
    received_chunks: u32,
) -> Result<(), OtaError> {
    if received_chunks != expected_chunks {
        return Err(OtaError::ChunkCountMismatch {
            received: received_chunks,
            expected: expected_chunks,
        });
    }

    let actual = store.len(Slot::Staging)?;
    if actual != expected_size {
        return Err(OtaError::SizeMismatch {
            actual,
            expected: expected_size,
        });
    }

    store.install()?;
    Ok(())
}
