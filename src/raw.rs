use crate::error::Error;
use crate::page::PageStatus;
use crate::platform::{AlignedOps, Platform};
#[cfg(feature = "defmt")]
use defmt::trace;

/// The header halfword is padded with a reserved halfword so records stay word aligned.
pub(crate) const HEADER_SIZE: u32 = 4;
pub(crate) const RECORD_SIZE: u32 = 4;

/// Value of a halfword right after an erase. Never a legal virtual address.
pub(crate) const ERASED_HALFWORD: u16 = u16::MAX;
const ERASED_WORD: [u8; 4] = [0xFF; 4];

#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Copy, Clone)]
#[repr(u16)]
pub(crate) enum PageState {
    // All bits set, default state after flash erase. Page holds no records.
    Erased = 0xFFFF,

    // Page is the destination of a transfer that has not finished yet.
    ReceivingData = 0xEEEE,

    // Page holds the authoritative set of variables.
    Valid = 0x0000,
}

impl From<u16> for PageStatus {
    fn from(val: u16) -> Self {
        match PageState::from_repr(val) {
            Some(PageState::Erased) => PageStatus::Erased,
            Some(PageState::ReceivingData) => PageStatus::ReceivingData,
            Some(PageState::Valid) => PageStatus::Valid,
            None => PageStatus::Corrupt(val),
        }
    }
}

/// One 4 byte slot of the record log: `[value: u16 LE][address: u16 LE]`.
#[derive(Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Record {
    pub(crate) value: u16,
    pub(crate) address: u16,
}

impl Record {
    pub(crate) const VALUE_OFFSET: u32 = 0;
    pub(crate) const ADDRESS_OFFSET: u32 = 2;

    pub(crate) fn decode(raw: [u8; RECORD_SIZE as usize]) -> Self {
        Self {
            value: u16::from_le_bytes([raw[0], raw[1]]),
            address: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    pub(crate) fn encode(&self) -> [u8; RECORD_SIZE as usize] {
        let value = self.value.to_le_bytes();
        let address = self.address.to_le_bytes();
        [value[0], value[1], address[0], address[1]]
    }

    /// A slot is free only if both halfwords still read as erased. A value without an address
    /// (interrupted write) occupies the slot but never matches a lookup.
    pub(crate) fn is_free(&self) -> bool {
        self.encode() == ERASED_WORD
    }
}

/// Reads the word at `offset`, which has to be 4 byte aligned.
#[inline(always)]
pub(crate) fn read_word<T: Platform>(hal: &mut T, offset: u32) -> Result<[u8; 4], Error> {
    let mut buf = [0u8; 4];
    hal.read(offset, &mut buf).map_err(|_| Error::FlashError)?;
    Ok(buf)
}

/// Programs a single halfword. Flash with a coarser write granularity gets the neighbouring
/// bytes padded with 0xFF, which leaves whatever is already programmed there untouched.
#[inline(always)]
pub(crate) fn write_halfword<T: Platform>(hal: &mut T, offset: u32, value: u16) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("write_halfword @{:#08x}: {:#06x}", offset, value);

    let start = T::align_write_floor(offset as usize);
    let end = T::align_write_ceil(offset as usize + 2);
    let pivot = offset as usize - start;

    let mut buf = ERASED_WORD;
    let buf = &mut buf[..end - start];
    buf[pivot..pivot + 2].copy_from_slice(&value.to_le_bytes());

    hal.write(start as u32, buf).map_err(|_| Error::FlashError)
}
