//! Crash-safe storage of the configuration text in flash.
//!
//! A saved configuration is a 12 byte header followed by the text and a NUL terminator:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | [`MAGIC`], little endian |
//! | 4 | 4 | flags |
//! | 8 | 4 | length of the text including its terminator |
//! | 12 | length | text |
//!
//! Flash can only be erased a whole sector at a time, and programming can only clear bits. The flags word exploits
//! this: its erased state has the incomplete bit set, and the bit is only cleared by the last page program of a
//! write. A record is therefore either missing, flagged incomplete, or complete; never complete but partially
//! written.

#[cfg(test)]
pub(crate) mod mem;

use crate::{Error, Result};
use core::fmt::Debug;
use heapless::{String, Vec};

/// Identifies a saved configuration: `"NUN1"`.
pub const MAGIC: u32 = u32::from_be_bytes(*b"NUN1");

/// Size of the record header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Largest program unit a [`SaveSlot`] supports.
pub const MAX_PAGE_SIZE: usize = 256;

/// Longest configuration text which can be saved and read back.
pub const MAX_CONFIG_LEN: usize = 4096;

/// Owned configuration text, as read back from storage.
pub type ConfigText = String<MAX_CONFIG_LEN>;

/// Set while a record is being written. Erased flash reads as all ones, so an erased header is incomplete too.
const FLAG_INCOMPLETE: u32 = 1 << 0;

/// Byte used to pad the last page of a record, matching erased flash.
const ERASED: u8 = 0xFF;

/// Erase and program granularity of a [`Storage`] region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    /// Smallest erasable unit, in bytes.
    pub sector_size: usize,
    /// Smallest programmable unit, in bytes.
    pub page_size: usize,
    /// Size of the whole region, in bytes.
    pub capacity: usize,
}

/// A region of NOR flash reserved for the saved configuration. Offsets are relative to the start of the region.
///
/// Implementations may assume that `erase` is called with whole sectors and `program` with whole pages. After an
/// erase every byte reads `0xFF`; `program` can only turn ones into zeros until the next erase.
pub trait Storage {
    /// Failure reported by the medium.
    type Error: Debug;

    /// Layout of the region.
    fn geometry(&self) -> Geometry;

    /// Fills `bytes` with the contents of the region starting at `offset`.
    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> core::result::Result<(), Self::Error>;

    /// Erases `length` bytes starting at `offset`.
    fn erase(&mut self, offset: usize, length: usize) -> core::result::Result<(), Self::Error>;

    /// Programs `bytes` starting at `offset`.
    fn program(&mut self, offset: usize, bytes: &[u8]) -> core::result::Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    magic: u32,
    flags: u32,
    length: u32,
}

impl Header {
    fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let word = |index: usize| {
            let mut word = [0; 4];
            word.copy_from_slice(&bytes[index * 4..(index + 1) * 4]);
            u32::from_le_bytes(word)
        };
        Self {
            magic: word(0),
            flags: word(1),
            length: word(2),
        }
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    fn is_complete(&self) -> bool {
        self.magic == MAGIC && self.flags & FLAG_INCOMPLETE == 0
    }
}

/// The saved configuration, on top of a [`Storage`] region.
pub struct SaveSlot<S> {
    storage: S,
}

impl<S: Storage> SaveSlot<S> {
    /// Wraps a storage region, checking that its geometry can hold a record: pages must be at least as large as the
    /// header and no larger than [`MAX_PAGE_SIZE`], and the region must consist of whole sectors of whole pages.
    pub fn new(storage: S) -> Result<Self> {
        let Geometry {
            sector_size,
            page_size,
            capacity,
        } = storage.geometry();

        let supported = (HEADER_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
            && sector_size >= page_size
            && sector_size % page_size == 0
            && capacity >= sector_size
            && capacity % sector_size == 0;
        if !supported {
            error!(
                "Unsupported flash geometry: {} byte sectors, {} byte pages, {} bytes",
                sector_size, page_size, capacity
            );
            return Err(Error::UnsupportedGeometry);
        }

        Ok(Self { storage })
    }

    /// Getter.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Copies raw bytes of the region, header included, for diagnostics.
    pub fn read_raw(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()> {
        self.storage.read(offset, bytes).map_err(storage_error)
    }

    fn header(&mut self) -> Result<Header> {
        let mut bytes = [0; HEADER_SIZE];
        self.storage.read(0, &mut bytes).map_err(storage_error)?;
        Ok(Header::from_bytes(&bytes))
    }

    /// Returns `true` if the slot holds a completely written record.
    pub fn is_valid(&mut self) -> bool {
        match self.header() {
            Ok(header) if header.magic != MAGIC => {
                trace!("Flash: no magic");
                false
            }
            Ok(header) if !header.is_complete() => {
                warn!("Flash: record incomplete");
                false
            }
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Reads the saved text back. Fails with [`Error::StorageInvalid`] unless [`is_valid`](Self::is_valid), or if
    /// the record's length or contents don't make sense.
    pub fn read(&mut self) -> Result<ConfigText> {
        let header = self.header()?;
        if !header.is_complete() {
            error!("Refusing to read an invalid flash record");
            return Err(Error::StorageInvalid);
        }

        let length = header.length as usize;
        let capacity = self.storage.geometry().capacity;
        if length == 0 || length - 1 > MAX_CONFIG_LEN || HEADER_SIZE + length > capacity {
            error!("Flash record has implausible length {}", length);
            return Err(Error::StorageInvalid);
        }

        let mut terminator = [ERASED];
        self.storage
            .read(HEADER_SIZE + length - 1, &mut terminator)
            .map_err(storage_error)?;
        if terminator != [0] {
            error!("Flash record is not terminated");
            return Err(Error::StorageInvalid);
        }

        let mut bytes: Vec<u8, MAX_CONFIG_LEN> = Vec::new();
        bytes
            .resize(length - 1, 0)
            .map_err(|_| Error::StorageInvalid)?;
        self.storage.read(HEADER_SIZE, &mut bytes).map_err(storage_error)?;

        String::from_utf8(bytes).map_err(|_| {
            error!("Flash record is not UTF-8");
            Error::StorageInvalid
        })
    }

    /// Replaces the saved text.
    ///
    /// A record which fits one page is written in a single program, already flagged complete. Longer records are
    /// written flagged incomplete, and the first page is reprogrammed with the flag cleared once every other page is
    /// in place. Interrupts are held off for the duration.
    pub fn write(&mut self, text: &str) -> Result<()> {
        let Geometry {
            sector_size,
            page_size,
            capacity,
        } = self.storage.geometry();

        let length = text.len() + 1;
        let record_size = HEADER_SIZE + length;
        if record_size > capacity || text.len() > MAX_CONFIG_LEN {
            error!(
                "Configuration of {} bytes does not fit {} bytes of flash",
                record_size, capacity
            );
            return Err(Error::StorageCapacityExceeded);
        }

        let pages = record_size.div_ceil(page_size);
        let erase_size = (pages * page_size).div_ceil(sector_size) * sector_size;
        info!(
            "Writing flash: {} bytes, {} pages, {} bytes erased",
            record_size, pages, erase_size
        );

        let mut header = Header {
            magic: MAGIC,
            flags: u32::MAX,
            // bounded by MAX_CONFIG_LEN above
            length: length as u32,
        };
        let mut buffer = [ERASED; MAX_PAGE_SIZE];
        let page = &mut buffer[..page_size];

        let storage = &mut self.storage;
        critical_section::with(|_| {
            storage.erase(0, erase_size)?;

            if pages == 1 {
                header.flags &= !FLAG_INCOMPLETE;
                fill_page(page, 0, &header, text);
                return storage.program(0, page);
            }

            fill_page(page, 0, &header, text);
            storage.program(0, page)?;

            for index in 1..pages {
                fill_page(page, index, &header, text);
                storage.program(index * page_size, page)?;
            }

            header.flags &= !FLAG_INCOMPLETE;
            fill_page(page, 0, &header, text);
            storage.program(0, page)
        })
        .map_err(storage_error)
    }
}

/// Copies the `index`th page of the record described by `header` and `text` into `page`, padding past its end.
fn fill_page(page: &mut [u8], index: usize, header: &Header, text: &str) {
    let header = header.to_bytes();
    let text = text.as_bytes();
    let start = index * page.len();

    for (offset, byte) in (start..).zip(page.iter_mut()) {
        *byte = if offset < HEADER_SIZE {
            header[offset]
        } else if offset - HEADER_SIZE < text.len() {
            text[offset - HEADER_SIZE]
        } else if offset - HEADER_SIZE == text.len() {
            0
        } else {
            ERASED
        };
    }
}

impl<T: Storage + ?Sized> Storage for &mut T {
    type Error = T::Error;

    fn geometry(&self) -> Geometry {
        (**self).geometry()
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> core::result::Result<(), Self::Error> {
        (**self).read(offset, bytes)
    }

    fn erase(&mut self, offset: usize, length: usize) -> core::result::Result<(), Self::Error> {
        (**self).erase(offset, length)
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> core::result::Result<(), Self::Error> {
        (**self).program(offset, bytes)
    }
}

fn storage_error<E: Debug>(_error: E) -> Error {
    error!("Flash operation failed");
    Error::Storage
}
