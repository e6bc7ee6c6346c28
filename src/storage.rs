//! Flash-backed firmware slots and the boot hand-off.
//!
//! The upper internal flash holds three equal image partitions. Which
//! partition currently plays which [`Slot`] role is recorded in a small
//! role table kept by `sequential-storage` in its own pages. Writing a
//! new table is one map store, which makes `install` atomic: a reset in
//! the middle leaves either the old or the new assignment.
//!
//! The application never executes from a partition. It runs from a
//! fixed active region, and the boot stage copies the program image
//! there whenever the table's generation differs from the one it last
//! copied. The copied generation is recorded only after the copy is
//! complete, so a copy cut short by a reset is simply redone.
//!
//! Storage layout:
//!   - partitions: `FIRMWARE_PARTITION_COUNT` × `FIRMWARE_PARTITION_SIZE`
//!     starting at `FIRMWARE_PARTITIONS_START`;
//!   - role table: key `KEY_ROLES`, `[generation u32 LE]` followed by
//!     three entries of `[partition][len u32 LE]`, partition `0xFF`
//!     meaning "no image";
//!   - boot record: key `KEY_BOOTED`, the generation last copied into
//!     the active region as `u32 LE`.
//!
//! The [`FirmwareStore`] trait is synchronous, so every flash operation
//! is driven to completion with `block_on`. On target the SoftDevice
//! runs on an interrupt executor so its flash completion events are
//! still serviced while the scheduler blocks here.

use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage_async::nor_flash::NorFlash;
use heapless::Vec;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{fetch_item, store_item};

use crate::config::{
    APP_ACTIVE_SIZE, APP_ACTIVE_START, FIRMWARE_PARTITIONS_START, FIRMWARE_PARTITION_COUNT,
    FIRMWARE_PARTITION_SIZE, FLASH_PAGE_SIZE, ROLE_TABLE_PAGE_COUNT, ROLE_TABLE_PAGE_START,
};
use crate::error::StoreError;
use crate::ota::{FirmwareStore, Slot};

const KEY_ROLES: u8 = 0x01;
const KEY_BOOTED: u8 = 0x02;
const NO_PARTITION: u8 = 0xFF;
const ENTRY_SIZE: usize = 5;
const TABLE_SIZE: usize = 4 + ENTRY_SIZE * Slot::ALL.len();
/// Scratch for sequential-storage item headers plus the table.
const MAP_BUFFER_SIZE: usize = 64;
/// Bytes staged per flash write call.
const WRITE_CHUNK: usize = 256;
/// Largest flash write granularity supported.
const MAX_WRITE_SIZE: usize = 16;

/// Where partitions, the role table and the active region live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashLayout {
    pub partitions_start: u32,
    pub partition_size: u32,
    pub table: Range<u32>,
    /// Region the application executes from.
    pub active: Range<u32>,
}

impl FlashLayout {
    /// nRF52840 + S140: boot stage, active region, partitions, table.
    pub fn nrf52840() -> Self {
        Self {
            partitions_start: FIRMWARE_PARTITIONS_START,
            partition_size: FIRMWARE_PARTITION_SIZE,
            table: ROLE_TABLE_PAGE_START * FLASH_PAGE_SIZE
                ..(ROLE_TABLE_PAGE_START + ROLE_TABLE_PAGE_COUNT) * FLASH_PAGE_SIZE,
            active: APP_ACTIVE_START..APP_ACTIVE_START + APP_ACTIVE_SIZE,
        }
    }

    fn partition(&self, index: u8) -> Range<u32> {
        let start = self.partitions_start + index as u32 * self.partition_size;
        start..start + self.partition_size
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Role {
    partition: u8,
    len: u32,
}

type Roles = [Option<Role>; 3];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Table {
    /// Bumped by every install.
    generation: u32,
    roles: Roles,
}

impl Table {
    const EMPTY: Self = Self {
        generation: 0,
        roles: [None; 3],
    };

    fn role(&self, slot: Slot) -> Option<Role> {
        self.roles[slot_index(slot)]
    }
}

fn slot_index(slot: Slot) -> usize {
    match slot {
        Slot::Program => 0,
        Slot::Backup => 1,
        Slot::Staging => 2,
    }
}

fn encode_table(table: &Table) -> [u8; TABLE_SIZE] {
    let mut out = [0u8; TABLE_SIZE];
    out[..4].copy_from_slice(&table.generation.to_le_bytes());
    for (entry, role) in out[4..].chunks_exact_mut(ENTRY_SIZE).zip(&table.roles) {
        match role {
            Some(r) => {
                entry[0] = r.partition;
                entry[1..].copy_from_slice(&r.len.to_le_bytes());
            }
            None => entry[0] = NO_PARTITION,
        }
    }
    out
}

fn decode_table(data: &[u8]) -> Option<Table> {
    if data.len() != TABLE_SIZE {
        return None;
    }
    let mut table = Table {
        generation: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        roles: [None; 3],
    };
    for (role, entry) in table.roles.iter_mut().zip(data[4..].chunks_exact(ENTRY_SIZE)) {
        if entry[0] == NO_PARTITION {
            continue;
        }
        if entry[0] as usize >= FIRMWARE_PARTITION_COUNT {
            return None;
        }
        let len = u32::from_le_bytes([entry[1], entry[2], entry[3], entry[4]]);
        *role = Some(Role {
            partition: entry[0],
            len,
        });
    }
    Some(table)
}

/// What the boot stage does before starting the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootAction {
    /// The active region already holds the current program.
    Start,
    /// Copy `image` into the active region, then record `generation`.
    Copy { image: Range<u32>, generation: u32 },
}

/// [`FirmwareStore`] over a NOR flash.
pub struct FlashStore<F: NorFlash> {
    flash: F,
    layout: FlashLayout,
    table: Table,
    /// Slot currently being written, with bytes already on flash.
    open: Option<(Slot, u32)>,
    /// Bytes waiting for a full write word.
    tail: Vec<u8, MAX_WRITE_SIZE>,
}

impl<F: NorFlash> FlashStore<F> {
    /// Load the role table. A missing or unreadable table starts empty;
    /// a staging image left by an interrupted update is dropped.
    pub fn open(flash: F, layout: FlashLayout) -> Self {
        let mut store = Self {
            flash,
            layout,
            table: Table::EMPTY,
            open: None,
            tail: Vec::new(),
        };

        match store.load_table() {
            Ok(Some(table)) => {
                store.table = table;
                info!("storage: role table loaded, generation {}", table.generation);
            }
            Ok(None) => info!("storage: no role table, starting empty"),
            Err(e) => error!("storage: role table unreadable: {:?}", e),
        }

        if store.table.role(Slot::Staging).is_some() {
            warn!("storage: discarding interrupted staging image");
            if let Err(e) = store.remove(Slot::Staging) {
                error!("storage: could not clear staging: {:?}", e);
            }
        }
        store
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Flash address range of the image in `slot`.
    pub fn image_range(&self, slot: Slot) -> Option<Range<u32>> {
        let role = self.table.role(slot)?;
        let start = self.layout.partition(role.partition).start;
        Some(start..start + role.len)
    }

    /// Decide whether the active region is stale. A device that never
    /// installed an update keeps running what it was flashed with.
    pub fn boot_action(&mut self) -> BootAction {
        let Some(image) = self.image_range(Slot::Program) else {
            return BootAction::Start;
        };
        let record = self.fetch(KEY_BOOTED).unwrap_or_else(|e| {
            warn!("storage: boot record unreadable: {:?}", e);
            None
        });
        let booted = record
            .and_then(|d| <[u8; 4]>::try_from(d.as_slice()).ok())
            .map(u32::from_le_bytes);
        if booted == Some(self.table.generation) {
            return BootAction::Start;
        }
        BootAction::Copy {
            image,
            generation: self.table.generation,
        }
    }

    /// Copy `image` into the active region and record `generation` as
    /// booted. Until the record is written the copy counts as not done.
    pub fn activate(&mut self, image: Range<u32>, generation: u32) -> Result<(), StoreError> {
        let active = self.layout.active.clone();
        let size = image.end - image.start;
        if size > active.end - active.start {
            return Err(StoreError::NoSpace);
        }

        info!("storage: copying {} bytes into the active region", size);
        block_on(self.flash.erase(active.start, active.end)).map_err(|_| StoreError::Flash)?;

        // The last word of an image is padded on flash; copy it whole.
        let word = F::WRITE_SIZE as u32;
        let padded = size.div_ceil(word) * word;
        let mut chunk = [0u8; WRITE_CHUNK];
        let mut offset = 0;
        while offset < padded {
            let n = (padded - offset).min(WRITE_CHUNK as u32) as usize;
            block_on(self.flash.read(image.start + offset, &mut chunk[..n]))
                .map_err(|_| StoreError::Flash)?;
            block_on(self.flash.write(active.start + offset, &chunk[..n]))
                .map_err(|_| StoreError::Flash)?;
            offset += n as u32;
        }

        self.store(KEY_BOOTED, &generation.to_le_bytes())?;
        info!("storage: generation {} active", generation);
        Ok(())
    }

    fn fetch(&mut self, key: u8) -> Result<Option<Vec<u8, TABLE_SIZE>>, StoreError> {
        let mut buf = [0u8; MAP_BUFFER_SIZE];
        let fetched = block_on(fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            self.layout.table.clone(),
            &mut NoCache::new(),
            &mut buf,
            &key,
        ))
        .map_err(|_| StoreError::Flash)?;
        fetched
            .map(|data| Vec::from_slice(data).map_err(|_| StoreError::Flash))
            .transpose()
    }

    fn store(&mut self, key: u8, value: &[u8]) -> Result<(), StoreError> {
        let mut buf = [0u8; MAP_BUFFER_SIZE];
        block_on(store_item::<u8, &[u8], _>(
            &mut self.flash,
            self.layout.table.clone(),
            &mut NoCache::new(),
            &mut buf,
            &key,
            &value,
        ))
        .map_err(|e| match e {
            sequential_storage::Error::FullStorage => StoreError::NoSpace,
            _ => StoreError::Flash,
        })
    }

    fn load_table(&mut self) -> Result<Option<Table>, StoreError> {
        match self.fetch(KEY_ROLES)? {
            Some(data) => decode_table(&data).map(Some).ok_or(StoreError::Flash),
            None => Ok(None),
        }
    }

    /// Commit `table` to flash, then adopt it.
    fn commit(&mut self, table: Table) -> Result<(), StoreError> {
        self.store(KEY_ROLES, &encode_table(&table))?;
        self.table = table;
        Ok(())
    }

    fn free_partition(&self) -> Option<u8> {
        (0..FIRMWARE_PARTITION_COUNT as u8)
            .find(|p| !self.table.roles.iter().flatten().any(|r| r.partition == *p))
    }

    fn write_words(&mut self, slot: Slot, data: &[u8]) -> Result<(), StoreError> {
        let (open_slot, flushed) = self.open.ok_or(StoreError::Flash)?;
        if open_slot != slot {
            return Err(StoreError::Flash);
        }
        let role = self.table.role(slot).ok_or(StoreError::NotFound)?;
        let base = self.layout.partition(role.partition).start;
        block_on(self.flash.write(base + flushed, data)).map_err(|_| StoreError::Flash)?;
        self.open = Some((slot, flushed + data.len() as u32));
        Ok(())
    }

    /// Pad the pending tail to a whole word and write it.
    fn flush_tail(&mut self, slot: Slot) -> Result<(), StoreError> {
        if self.tail.is_empty() {
            return Ok(());
        }
        let mut word = [0xFFu8; MAX_WRITE_SIZE];
        word[..self.tail.len()].copy_from_slice(&self.tail);
        self.tail.clear();
        self.write_words(slot, &word[..F::WRITE_SIZE])
    }
}

impl<F: NorFlash> FirmwareStore for FlashStore<F> {
    fn exists(&mut self, slot: Slot) -> bool {
        self.table.role(slot).is_some()
    }

    fn create(&mut self, slot: Slot) -> Result<(), StoreError> {
        let partition = match self.table.role(slot) {
            Some(role) => role.partition,
            None => self.free_partition().ok_or(StoreError::NoSpace)?,
        };

        let range = self.layout.partition(partition);
        debug!("storage: erasing partition {}", partition);
        block_on(self.flash.erase(range.start, range.end)).map_err(|_| StoreError::Flash)?;

        let mut table = self.table;
        table.roles[slot_index(slot)] = Some(Role { partition, len: 0 });
        self.commit(table)?;
        self.open = Some((slot, 0));
        self.tail.clear();
        Ok(())
    }

    fn append(&mut self, slot: Slot, data: &[u8]) -> Result<(), StoreError> {
        let index = slot_index(slot);
        let Some(mut role) = self.table.roles[index] else {
            return Err(StoreError::NotFound);
        };
        if role.len as usize + data.len() > self.layout.partition_size as usize {
            return Err(StoreError::NoSpace);
        }

        let word = F::WRITE_SIZE;
        let mut chunk = [0u8; WRITE_CHUNK];
        let mut input = data;
        loop {
            let mut n = self.tail.len();
            chunk[..n].copy_from_slice(&self.tail);
            self.tail.clear();
            let take = (WRITE_CHUNK - n).min(input.len());
            chunk[n..n + take].copy_from_slice(&input[..take]);
            n += take;
            input = &input[take..];

            let whole = n - n % word;
            if whole > 0 {
                self.write_words(slot, &chunk[..whole])?;
            }
            // Less than one word; always fits.
            let _ = self.tail.extend_from_slice(&chunk[whole..n]);
            if input.is_empty() {
                break;
            }
        }

        role.len += data.len() as u32;
        self.table.roles[index] = Some(role);
        Ok(())
    }

    fn len(&mut self, slot: Slot) -> Result<u32, StoreError> {
        self.table
            .role(slot)
            .map(|r| r.len)
            .ok_or(StoreError::NotFound)
    }

    fn remove(&mut self, slot: Slot) -> Result<(), StoreError> {
        if matches!(self.open, Some((s, _)) if s == slot) {
            self.open = None;
            self.tail.clear();
        }
        if self.table.role(slot).is_none() {
            return Ok(());
        }
        let mut table = self.table;
        table.roles[slot_index(slot)] = None;
        self.commit(table)
    }

    fn install(&mut self) -> Result<(), StoreError> {
        let Some(staged) = self.table.role(Slot::Staging) else {
            return Err(StoreError::NotFound);
        };
        if matches!(self.open, Some((Slot::Staging, _))) {
            self.flush_tail(Slot::Staging)?;
            self.open = None;
        }

        // Program, backup and staging move in one table write.
        let mut table = self.table;
        table.roles[slot_index(Slot::Backup)] = table.role(Slot::Program);
        table.roles[slot_index(Slot::Program)] = Some(staged);
        table.roles[slot_index(Slot::Staging)] = None;
        table.generation = table.generation.wrapping_add(1);
        self.commit(table)?;
        info!(
            "storage: partition {} installed as generation {}",
            staged.partition, table.generation
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ota::OtaSession;
    use embedded_storage_async::nor_flash::{
        ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash,
    };
    use std::vec;
    use std::vec::Vec as StdVec;

    const PAGE: u32 = 4096;

    #[derive(Debug)]
    struct RamFlashError;

    impl NorFlashError for RamFlashError {
        fn kind(&self) -> NorFlashErrorKind {
            NorFlashErrorKind::Other
        }
    }

    /// NOR semantics: erase to 0xFF, writes can only clear bits.
    struct RamFlash {
        mem: StdVec<u8>,
        /// Contents after every erase or write, when recording.
        history: Option<StdVec<StdVec<u8>>>,
    }

    impl RamFlash {
        fn new(size: usize) -> Self {
            Self {
                mem: vec![0xFF; size],
                history: None,
            }
        }

        fn record(&mut self) {
            if let Some(history) = &mut self.history {
                history.push(self.mem.clone());
            }
        }
    }

    impl ErrorType for RamFlash {
        type Error = RamFlashError;
    }

    impl ReadNorFlash for RamFlash {
        const READ_SIZE: usize = 1;

        async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            let src = self.mem.get(start..start + bytes.len()).ok_or(RamFlashError)?;
            bytes.copy_from_slice(src);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.mem.len()
        }
    }

    impl NorFlash for RamFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = PAGE as usize;

        async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            if from % PAGE != 0 || to % PAGE != 0 || to as usize > self.mem.len() {
                return Err(RamFlashError);
            }
            self.mem[from as usize..to as usize].fill(0xFF);
            self.record();
            Ok(())
        }

        async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            if offset % 4 != 0 || bytes.len() % 4 != 0 {
                return Err(RamFlashError);
            }
            let start = offset as usize;
            let dst = self
                .mem
                .get_mut(start..start + bytes.len())
                .ok_or(RamFlashError)?;
            for (d, s) in dst.iter_mut().zip(bytes) {
                *d &= *s;
            }
            self.record();
            Ok(())
        }
    }

    fn layout() -> FlashLayout {
        FlashLayout {
            partitions_start: 0,
            partition_size: 2 * PAGE,
            table: 6 * PAGE..8 * PAGE,
            active: 8 * PAGE..10 * PAGE,
        }
    }

    fn fresh() -> FlashStore<RamFlash> {
        FlashStore::open(RamFlash::new(10 * PAGE as usize), layout())
    }

    fn install_image(store: &mut FlashStore<RamFlash>, image: &[u8]) {
        store.create(Slot::Staging).unwrap();
        store.append(Slot::Staging, image).unwrap();
        store.install().unwrap();
    }

    fn active(store: &FlashStore<RamFlash>, len: usize) -> &[u8] {
        let start = (8 * PAGE) as usize;
        &store.flash().mem[start..start + len]
    }

    fn read_image(store: &FlashStore<RamFlash>, slot: Slot) -> StdVec<u8> {
        let range = store.image_range(slot).unwrap();
        store.flash().mem[range.start as usize..range.end as usize].to_vec()
    }

    #[test]
    fn role_table_encoding() {
        let table = Table {
            generation: 3,
            roles: [
                Some(Role {
                    partition: 2,
                    len: 0x0102_0304,
                }),
                None,
                Some(Role {
                    partition: 0,
                    len: 7,
                }),
            ],
        };
        let bytes = encode_table(&table);
        assert_eq!(&bytes[..4], &[3, 0, 0, 0]);
        assert_eq!(&bytes[4..9], &[2, 4, 3, 2, 1]);
        assert_eq!(bytes[9], NO_PARTITION);
        assert_eq!(decode_table(&bytes), Some(table));
        assert_eq!(decode_table(&bytes[..15]), None);

        let mut bad = bytes;
        bad[4] = 9;
        assert_eq!(decode_table(&bad), None);
    }

    #[test]
    fn board_layout_does_not_overlap() {
        let layout = FlashLayout::nrf52840();
        let partitions_end =
            layout.partitions_start + FIRMWARE_PARTITION_COUNT as u32 * layout.partition_size;
        assert!(layout.active.end <= layout.partitions_start);
        assert!(partitions_end <= layout.table.start);
        assert!(layout.table.end <= 0x0010_0000);
        assert_eq!(layout.active.end - layout.active.start, layout.partition_size);
        assert_eq!(layout.active.start % FLASH_PAGE_SIZE, 0);
        assert_eq!(layout.partitions_start % FLASH_PAGE_SIZE, 0);
    }

    #[test]
    fn unaligned_appends_are_reassembled() {
        let mut store = fresh();
        store.create(Slot::Staging).unwrap();
        store.append(Slot::Staging, b"abc").unwrap();
        store.append(Slot::Staging, b"defgh").unwrap();
        store.append(Slot::Staging, b"i").unwrap();
        assert_eq!(store.len(Slot::Staging), Ok(9));

        store.install().unwrap();
        assert_eq!(read_image(&store, Slot::Program), b"abcdefghi");
        assert!(!store.exists(Slot::Staging));
    }

    #[test]
    fn large_append_spans_chunks() {
        let mut store = fresh();
        let image: StdVec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        store.create(Slot::Staging).unwrap();
        store.append(Slot::Staging, &image[..3]).unwrap();
        store.append(Slot::Staging, &image[3..]).unwrap();
        store.install().unwrap();
        assert_eq!(read_image(&store, Slot::Program), image);
    }

    #[test]
    fn partition_overflow_rejected() {
        let mut store = fresh();
        store.create(Slot::Staging).unwrap();
        let big = vec![0u8; 2 * PAGE as usize + 1];
        assert_eq!(store.append(Slot::Staging, &big), Err(StoreError::NoSpace));
        assert_eq!(store.len(Slot::Staging), Ok(0));
    }

    #[test]
    fn append_needs_created_slot() {
        let mut store = fresh();
        assert_eq!(store.append(Slot::Staging, b"x"), Err(StoreError::NotFound));
        assert_eq!(store.len(Slot::Backup), Err(StoreError::NotFound));
        assert_eq!(store.install(), Err(StoreError::NotFound));
    }

    #[test]
    fn roles_survive_reopen() {
        let mut store = fresh();
        install_image(&mut store, b"v1");
        let program = store.image_range(Slot::Program);

        let store = FlashStore::open(store.flash, layout());
        assert_eq!(store.image_range(Slot::Program), program);
        assert_eq!(read_image(&store, Slot::Program), b"v1");
    }

    #[test]
    fn interrupted_staging_dropped_on_open() {
        let mut store = fresh();
        store.create(Slot::Staging).unwrap();
        store.append(Slot::Staging, b"partial").unwrap();

        let mut store = FlashStore::open(store.flash, layout());
        assert!(!store.exists(Slot::Staging));
        assert!(!store.exists(Slot::Program));
    }

    #[test]
    fn partitions_rotate_through_updates() {
        let mut store = fresh();
        let mut ota = OtaSession::new();

        for (n, image) in [b"one!".as_slice(), b"two!!", b"three"].iter().enumerate() {
            ota.start(&mut store, image.len() as u32, 1).unwrap();
            let encoded = {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(image)
            };
            ota.chunk(&mut store, &encoded, true).unwrap();
            ota.end(&mut store, 0).unwrap();
            ota = OtaSession::new();

            assert_eq!(read_image(&store, Slot::Program), *image);
            assert_eq!(store.exists(Slot::Backup), n > 0);
            assert!(!store.exists(Slot::Staging));
        }
        assert_eq!(read_image(&store, Slot::Backup), b"two!!");

        let p = store.image_range(Slot::Program).unwrap().start;
        let b = store.image_range(Slot::Backup).unwrap().start;
        assert_ne!(p, b);
    }

    #[test]
    fn failed_update_keeps_program() {
        let mut store = fresh();
        let mut ota = OtaSession::new();
        ota.start(&mut store, 4, 1).unwrap();
        ota.chunk(&mut store, "good", false).unwrap();
        ota.end(&mut store, 0).unwrap();

        let mut ota = OtaSession::new();
        ota.start(&mut store, 100, 2).unwrap();
        ota.chunk(&mut store, "bad", false).unwrap();
        assert!(ota.end(&mut store, 0).is_err());

        assert_eq!(read_image(&store, Slot::Program), b"good");
        assert!(!store.exists(Slot::Staging));
        assert!(!store.exists(Slot::Backup));
    }

    /// Every state the flash passes through during `f`.
    fn cut_points(
        store: &mut FlashStore<RamFlash>,
        f: impl FnOnce(&mut FlashStore<RamFlash>),
    ) -> StdVec<StdVec<u8>> {
        store.flash.history = Some(StdVec::new());
        f(store);
        store.flash.history.take().unwrap()
    }

    fn reopen(mem: StdVec<u8>) -> FlashStore<RamFlash> {
        let mut flash = RamFlash::new(0);
        flash.mem = mem;
        FlashStore::open(flash, layout())
    }

    #[test]
    fn install_is_all_or_nothing() {
        let mut store = fresh();
        install_image(&mut store, b"older");
        install_image(&mut store, b"old!");
        store.create(Slot::Staging).unwrap();
        store.append(Slot::Staging, b"new").unwrap();

        let states = cut_points(&mut store, |s| s.install().unwrap());
        assert!(!states.is_empty());
        for mem in states {
            let store = reopen(mem);
            let program = read_image(&store, Slot::Program);
            let backup = read_image(&store, Slot::Backup);
            assert!(
                (program == b"old!" && backup == b"older") || (program == b"new" && backup == b"old!"),
                "mixed state: {:?} / {:?}",
                program,
                backup
            );
            assert!(store.image_range(Slot::Staging).is_none());
        }

        let store = reopen(store.flash.mem);
        assert_eq!(read_image(&store, Slot::Program), b"new");
        assert_eq!(read_image(&store, Slot::Backup), b"old!");
    }

    #[test]
    fn flashed_device_boots_in_place() {
        let mut store = fresh();
        assert_eq!(store.boot_action(), BootAction::Start);
    }

    #[test]
    fn installed_program_copied_once() {
        let mut store = fresh();
        install_image(&mut store, b"hello");

        let BootAction::Copy { image, generation } = store.boot_action() else {
            panic!("new program not scheduled for copy");
        };
        assert_eq!(generation, 1);
        store.activate(image, generation).unwrap();
        assert_eq!(active(&store, 5), b"hello");
        assert_eq!(store.boot_action(), BootAction::Start);

        let mut store = reopen(store.flash.mem);
        assert_eq!(store.boot_action(), BootAction::Start);

        install_image(&mut store, b"world!!");
        assert!(matches!(
            store.boot_action(),
            BootAction::Copy { generation: 2, .. }
        ));
    }

    #[test]
    fn interrupted_copy_is_redone() {
        let mut store = fresh();
        let image: StdVec<u8> = (0..700u32).map(|i| (i % 13) as u8).collect();
        install_image(&mut store, &image);
        let BootAction::Copy {
            image: range,
            generation,
        } = store.boot_action()
        else {
            panic!("new program not scheduled for copy");
        };

        let states = cut_points(&mut store, |s| s.activate(range.clone(), generation).unwrap());
        let (last, cut) = states.split_last().unwrap();
        for mem in cut {
            let mut store = reopen(mem.clone());
            assert!(matches!(store.boot_action(), BootAction::Copy { .. }));
        }
        let mut store = reopen(last.clone());
        assert_eq!(store.boot_action(), BootAction::Start);
        assert_eq!(active(&store, image.len()), image.as_slice());
    }

    #[test]
    fn oversized_image_not_activated() {
        let mut store = fresh();
        assert_eq!(store.activate(0..3 * PAGE, 1), Err(StoreError::NoSpace));
        assert_eq!(store.boot_action(), BootAction::Start);
    }
}
