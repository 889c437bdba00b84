//! The flash sector reserved for the saved configuration.

use embassy_stm32::{
    flash::{self, Blocking, Flash},
    peripherals::FLASH,
    Peri,
};
use nunchuk_midi_lib::persistence::{Geometry, Storage};

/// Offset of the last sector of the STM32F767ZI's 2 MB flash in single-bank mode, far past the end of the firmware.
const REGION_OFFSET: u32 = 0x1C_0000;

/// Size of the last sector, which is also the whole region.
const SECTOR_SIZE: usize = 256 * 1024;

/// The hardware writes in 32 byte units; records are laid out in larger logical pages to keep the header rewrite to a
/// single program.
const PAGE_SIZE: usize = 256;

/// Implements [`Storage`] on the reserved sector.
pub struct FlashRegion {
    flash: Flash<'static, Blocking>,
}

impl FlashRegion {
    pub fn new(flash: Peri<'static, FLASH>) -> Self {
        Self {
            flash: Flash::new_blocking(flash),
        }
    }
}

impl Storage for FlashRegion {
    type Error = flash::Error;

    fn geometry(&self) -> Geometry {
        Geometry {
            sector_size: SECTOR_SIZE,
            page_size: PAGE_SIZE,
            capacity: SECTOR_SIZE,
        }
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.flash.blocking_read(REGION_OFFSET + offset as u32, bytes)
    }

    fn erase(&mut self, offset: usize, length: usize) -> Result<(), Self::Error> {
        let from = REGION_OFFSET + offset as u32;
        self.flash.blocking_erase(from, from + length as u32)
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error> {
        self.flash.blocking_write(REGION_OFFSET + offset as u32, bytes)
    }
}
