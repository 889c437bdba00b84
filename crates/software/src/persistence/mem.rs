//! An in-memory [`Storage`] which behaves like NOR flash, for testing.

use super::{Geometry, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemError {
    OutOfBounds,
    Misaligned,
    /// A program tried to turn a zero back into a one.
    SetsBits,
    PowerLoss,
}

/// `N` bytes of flash, initially erased.
///
/// Erases must cover whole sectors and programs whole pages, and a program may only clear bits. A power loss can be
/// scheduled after a number of programs; from then on every program fails and leaves the contents untouched.
pub(crate) struct MemStorage<const N: usize> {
    bytes: [u8; N],
    sector_size: usize,
    page_size: usize,
    programs: usize,
    erases: usize,
    power_left: Option<usize>,
}

impl<const N: usize> MemStorage<N> {
    pub(crate) fn new(sector_size: usize, page_size: usize) -> Self {
        Self {
            bytes: [0xFF; N],
            sector_size,
            page_size,
            programs: 0,
            erases: 0,
            power_left: None,
        }
    }

    /// Lets `programs` more page programs succeed, then cuts the power.
    pub(crate) fn power_loss_after(mut self, programs: usize) -> Self {
        self.power_left = Some(programs);
        self
    }

    pub(crate) fn restore_power(mut self) -> Self {
        self.power_left = None;
        self
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of successful programs.
    pub(crate) fn programs(&self) -> usize {
        self.programs
    }

    /// Number of successful erases.
    pub(crate) fn erases(&self) -> usize {
        self.erases
    }

    fn region(&self, offset: usize, length: usize, unit: usize) -> Result<core::ops::Range<usize>, MemError> {
        let end = offset.checked_add(length).ok_or(MemError::OutOfBounds)?;
        if end > N {
            return Err(MemError::OutOfBounds);
        }
        if offset % unit != 0 || length % unit != 0 {
            return Err(MemError::Misaligned);
        }
        Ok(offset..end)
    }
}

impl<const N: usize> Storage for MemStorage<N> {
    type Error = MemError;

    fn geometry(&self) -> Geometry {
        Geometry {
            sector_size: self.sector_size,
            page_size: self.page_size,
            capacity: N,
        }
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.region(offset, bytes.len(), 1)?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn erase(&mut self, offset: usize, length: usize) -> Result<(), Self::Error> {
        let range = self.region(offset, length, self.sector_size)?;
        self.bytes[range].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.region(offset, bytes.len(), self.page_size)?;

        match self.power_left {
            Some(0) => return Err(MemError::PowerLoss),
            Some(ref mut left) => *left -= 1,
            None => {}
        }

        let current = &mut self.bytes[range];
        if current.iter().zip(bytes).any(|(&old, &new)| new & !old != 0) {
            return Err(MemError::SetsBits);
        }

        current.copy_from_slice(bytes);
        self.programs += 1;
        Ok(())
    }
}
