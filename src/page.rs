use crate::error::Error;
use crate::platform::Platform;
use crate::raw::{HEADER_SIZE, PageState, RECORD_SIZE, read_word, write_halfword};
#[cfg(feature = "defmt")]
use defmt::trace;

#[derive(strum::Display, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageId {
    Page0,
    Page1,
}

/// Decoded header of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageStatus {
    /// All bits set, the page holds no records.
    Erased,
    /// The page is the destination of an unfinished transfer.
    ReceivingData,
    /// The page holds the current variables.
    Valid,
    /// The header holds none of the values above.
    Corrupt(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Page {
    pub(crate) id: PageId,
    pub(crate) address: u32,
    size: u32,
}

impl Page {
    pub(crate) fn new(id: PageId, address: u32, size: u32) -> Self {
        Self { id, address, size }
    }

    pub(crate) fn slots(&self) -> u32 {
        (self.size - HEADER_SIZE) / RECORD_SIZE
    }

    /// Flash offset of the record slot `index`, `None` past the end of the page.
    pub(crate) fn slot_offset(&self, index: u32) -> Option<u32> {
        if index < self.slots() {
            Some(self.address + HEADER_SIZE + index * RECORD_SIZE)
        } else {
            None
        }
    }

    pub(crate) fn read_status<T: Platform>(&self, hal: &mut T) -> Result<PageStatus, Error> {
        let word = read_word(hal, self.address)?;
        Ok(PageStatus::from(u16::from_le_bytes([word[0], word[1]])))
    }

    pub(crate) fn set_status<T: Platform>(&self, hal: &mut T, state: PageState) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("set_status: {} -> {}", self.id, state as u16);

        #[cfg(feature = "debug-logs")]
        println!("  page: set_status: {} -> {state}", self.id);

        write_halfword(hal, self.address, state as u16)
    }

    pub(crate) fn erase<T: Platform>(&self, hal: &mut T) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("erase: {}", self.id);

        #[cfg(feature = "debug-logs")]
        println!("  page: erase: {}", self.id);

        hal.erase(self.address, self.address + self.size)
            .map_err(|_| Error::FlashError)
    }

    /// Checks every word of the page, the header included, for the erased state.
    pub(crate) fn is_blank<T: Platform>(&self, hal: &mut T) -> Result<bool, Error> {
        for offset in (self.address..self.address + self.size).step_by(RECORD_SIZE as usize) {
            if read_word(hal, offset)? != [0xFF; 4] {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Saves an erase cycle when the page is already blank.
    pub(crate) fn erase_if_dirty<T: Platform>(&self, hal: &mut T) -> Result<(), Error> {
        if self.is_blank(hal)? {
            return Ok(());
        }
        self.erase(hal)
    }
}

pub(crate) struct Pages {
    pub(crate) page0: Page,
    pub(crate) page1: Page,
}

impl Pages {
    pub(crate) fn statuses<T: Platform>(&self, hal: &mut T) -> Result<(PageStatus, PageStatus), Error> {
        Ok((self.page0.read_status(hal)?, self.page1.read_status(hal)?))
    }

    pub(crate) fn other(&self, page: &Page) -> Page {
        match page.id {
            PageId::Page0 => self.page1,
            PageId::Page1 => self.page0,
        }
    }

    /// Two valid pages are as unusable as none, only `init()` resolves them.
    pub(crate) fn select_for_read<T: Platform>(&self, hal: &mut T) -> Result<Page, Error> {
        match self.statuses(hal)? {
            (PageStatus::Valid, PageStatus::Valid) => Err(Error::NoValidPage),
            (PageStatus::Valid, _) => Ok(self.page0),
            (_, PageStatus::Valid) => Ok(self.page1),
            _ => Err(Error::NoValidPage),
        }
    }

    /// The page receiving data takes precedence over the valid one, it is where an
    /// unfinished transfer continues.
    pub(crate) fn select_for_write<T: Platform>(&self, hal: &mut T) -> Result<Page, Error> {
        match self.statuses(hal)? {
            (PageStatus::Valid, PageStatus::Valid) => Err(Error::NoValidPage),
            (PageStatus::ReceivingData, PageStatus::Valid) => Ok(self.page0),
            (_, PageStatus::Valid) => Ok(self.page1),
            (PageStatus::Valid, PageStatus::ReceivingData) => Ok(self.page1),
            (PageStatus::Valid, _) => Ok(self.page0),
            _ => Err(Error::NoValidPage),
        }
    }
}
