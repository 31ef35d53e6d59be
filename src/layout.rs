use crate::error::Error;
use crate::page::{Page, PageId, Pages};
use crate::platform::{AlignedOps, Platform};
use crate::raw::{ERASED_HALFWORD, HEADER_SIZE, RECORD_SIZE};

/// Placement of the two pages in flash and the number of emulated variables.
///
/// The layout is not stored in flash. Firmware versions sharing the same flash region have to
/// use the same layout or previously written variables become unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    pub page0: u32,
    pub page1: u32,
    pub page_size: u32,
    /// Number of variables, addressed `0..variables`
    pub variables: u16,
    /// Variables `0..user_variables` are writable with `write_byte`, the rest only with
    /// `write_system_byte`
    pub user_variables: u16,
}

impl Layout {
    pub const fn new(page0: u32, page1: u32, page_size: u32, variables: u16) -> Self {
        Self {
            page0,
            page1,
            page_size,
            variables,
            user_variables: variables,
        }
    }

    /// Two pages directly following each other, starting at `offset`.
    pub const fn contiguous(offset: u32, page_size: u32, variables: u16) -> Self {
        Self::new(offset, offset + page_size, page_size, variables)
    }

    /// Reserves the variables `user_variables..variables` for system use.
    pub const fn with_user_variables(mut self, user_variables: u16) -> Self {
        self.user_variables = user_variables;
        self
    }

    /// Number of record slots following the header of a page.
    pub const fn slots_per_page(&self) -> u32 {
        self.page_size.saturating_sub(HEADER_SIZE) / RECORD_SIZE
    }

    pub(crate) fn validate<T: Platform>(&self) -> Result<(), Error> {
        if !T::supports_word_access() {
            return Err(Error::UnsupportedFlash);
        }

        let erase_size = T::ERASE_SIZE as u32;
        if !self.page0.is_multiple_of(erase_size) || !self.page1.is_multiple_of(erase_size) {
            return Err(Error::InvalidPageOffset);
        }

        if self.page_size == 0
            || !self.page_size.is_multiple_of(erase_size)
            || !self.page_size.is_multiple_of(RECORD_SIZE)
        {
            return Err(Error::InvalidPageSize);
        }

        let (low, high) = if self.page0 < self.page1 {
            (self.page0, self.page1)
        } else {
            (self.page1, self.page0)
        };
        if low.checked_add(self.page_size).is_none_or(|end| end > high)
            || high.checked_add(self.page_size).is_none()
        {
            return Err(Error::InvalidPageSize);
        }

        // a transfer has to fit every variable into the freshly erased page
        if self.variables == 0
            || self.variables == ERASED_HALFWORD
            || self.variables as u32 > self.slots_per_page()
            || self.user_variables > self.variables
        {
            return Err(Error::InvalidVariableCount);
        }

        Ok(())
    }

    pub(crate) fn pages(&self) -> Pages {
        Pages {
            page0: Page::new(PageId::Page0, self.page0, self.page_size),
            page1: Page::new(PageId::Page1, self.page1, self.page_size),
        }
    }
}

/// Maps logical indices to virtual addresses. Rebuilt on every start, the mapping is the
/// identity.
#[derive(Debug, Clone)]
pub(crate) struct AddressTable {
    len: u16,
}

impl AddressTable {
    pub(crate) fn new(len: u16) -> Self {
        Self { len }
    }

    pub(crate) fn virtual_address(&self, index: usize) -> Option<u16> {
        if index < self.len as usize {
            Some(index as u16)
        } else {
            None
        }
    }

    pub(crate) fn contains(&self, address: u16) -> bool {
        address < self.len
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.len as usize).filter_map(|index| self.virtual_address(index))
    }
}
