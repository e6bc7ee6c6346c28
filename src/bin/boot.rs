//! Boot stage for the macropad firmware.
//!
//! The SoftDevice starts this image at the application base. It copies
//! a newly installed program into the active region when the role
//! table says the region is stale, points SoftDevice interrupt
//! forwarding at the application and jumps to it. The SoftDevice is
//! never enabled here, so the NVMC is driven directly.

#![no_std]
#![no_main]

extern crate alloc;

use core::mem::MaybeUninit;

use cortex_m_rt::entry;
use defmt::{error, info};
use defmt_rtt as _;
use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals::NVMC;
use embedded_alloc::Heap;
use panic_probe as _;

use macropad::config::APP_ACTIVE_START;
use macropad::storage::{BootAction, FlashLayout, FlashStore};

// The library links `alloc`; nothing on this path allocates.
#[global_allocator]
static HEAP: Heap = Heap::empty();
const HEAP_SIZE: usize = 256;

fn init_heap() {
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
}

#[entry]
fn main() -> ! {
    init_heap();
    info!("boot stage");

    // Nothing else owns the peripherals before the hand-off.
    let nvmc = Nvmc::new(unsafe { NVMC::steal() });
    let mut store = FlashStore::open(BlockingAsync::new(nvmc), FlashLayout::nrf52840());

    match store.boot_action() {
        BootAction::Start => {}
        BootAction::Copy { image, generation } => {
            if let Err(e) = store.activate(image, generation) {
                // Retried on the next reset; the marker is still stale.
                error!("boot: copy failed: {:?}", e);
                cortex_m::peripheral::SCB::sys_reset();
            }
        }
    }
    drop(store);

    info!("boot: starting application at {:#x}", APP_ACTIVE_START);
    unsafe {
        let err = nrf_softdevice::raw::sd_softdevice_vector_table_base_set(APP_ACTIVE_START);
        if err != 0 {
            error!("boot: interrupt forwarding not set: {}", err);
        }
        cortex_m::asm::bootload(APP_ACTIVE_START as *const u32)
    }
}
