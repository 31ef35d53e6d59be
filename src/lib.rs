#![doc = include_str ! ("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

mod bytes;
pub mod error;
mod layout;
mod page;
pub mod platform;
mod raw;
mod recovery;
mod scan;
mod transfer;

pub use bytes::UNSET_BYTE;
pub use layout::Layout;
pub use page::{PageId, PageStatus};
pub use recovery::Recovery;

use crate::error::Error;
use crate::layout::AddressTable;
use crate::page::{Page, Pages};
use crate::platform::{Platform, Unlocked};
#[cfg(feature = "defmt")]
use defmt::trace;

#[derive(Debug, Clone, PartialEq)]
pub struct EepromStatistics {
    pub pages: [PageStatistics; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageStatistics {
    pub id: PageId,
    pub status: PageStatus,
    pub free: u32,
    pub written: u32,
    pub illegal: u32,
}

/// Emulates `Layout::variables` independent 16-bit variables on two flash pages.
///
/// Every write appends a record to the valid page. Once it is full, the latest value of each
/// variable is transferred to the other page and the full one is erased. All flash operations
/// are ordered such that a power loss at any point is repaired by `init()`, which also runs on
/// construction.
///
/// All methods take `&mut self`. Sharing a store between interrupt handlers or tasks requires a
/// mutex around the whole store.
pub struct Eeprom<T: Platform> {
    pub(crate) hal: T,
    pub(crate) layout: Layout,
    pub(crate) pages: Pages,
    pub(crate) table: AddressTable,
    pub(crate) recovery: Recovery,
    pub(crate) faulted: bool,
}

impl<T: Platform> Eeprom<T> {
    /// Validates the layout against the flash geometry and runs `init()` to repair whatever an
    /// interrupted write or transfer left behind.
    pub fn new(layout: Layout, hal: T) -> Result<Eeprom<T>, Error> {
        layout.validate::<T>()?;

        let mut eeprom = Self {
            hal,
            layout,
            pages: layout.pages(),
            table: AddressTable::new(layout.variables),
            recovery: Recovery::Clean,
            faulted: false,
        };

        eeprom.init()?;
        Ok(eeprom)
    }

    /// Brings the pages into a consistent state. Has to be called again after a write failed
    /// with `FlashError`, otherwise further writes are refused.
    ///
    /// Returns `Recovery::Formatted` if the page headers were corrupted and all variables had
    /// to be discarded. Calling it again on a consistent store changes nothing.
    pub fn init(&mut self) -> Result<Recovery, Error> {
        #[cfg(feature = "defmt")]
        trace!("init");

        #[cfg(feature = "debug-logs")]
        println!("eeprom: init");

        let recovery = self.unlocked(|hal, pages, table| pages.recover(hal, table))?;
        self.recovery = recovery;
        self.faulted = false;
        Ok(recovery)
    }

    /// Outcome of the most recent `init()`.
    pub fn last_recovery(&self) -> Recovery {
        self.recovery
    }

    /// Latest value of the variable at `address`.
    pub fn read_variable(&mut self, address: u16) -> Result<u16, Error> {
        #[cfg(feature = "defmt")]
        trace!("read_variable: [{}]", address);

        if !self.table.contains(address) {
            return Err(Error::AddressOutOfRange);
        }

        let result = self
            .pages
            .select_for_read(&mut self.hal)
            .and_then(|page| page.read_variable(&mut self.hal, address));

        match result {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(Error::VariableNotFound),
            Err(Error::FlashError) => {
                self.faulted = true;
                Err(Error::FlashError)
            }
            Err(e) => Err(e),
        }
    }

    /// Stores `value` for the variable at `address`, transferring all variables to the other
    /// page if the valid one is full.
    pub fn write_variable(&mut self, address: u16, value: u16) -> Result<(), Error> {
        if self.faulted {
            return Err(Error::FlashError);
        }

        if !self.table.contains(address) {
            return Err(Error::AddressOutOfRange);
        }

        self.unlocked(|hal, pages, table| pages.write_variable(hal, table, address, value))
    }

    /// Erases both pages. Every variable is lost.
    pub fn format(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("format");

        self.unlocked(|hal, pages, _| pages.format(hal))?;
        self.faulted = false;
        Ok(())
    }

    /// Header status of Page0 and Page1.
    pub fn page_status(&mut self) -> Result<(PageStatus, PageStatus), Error> {
        self.pages.statuses(&mut self.hal)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns detailed statistics about the usage of both pages
    pub fn statistics(&mut self) -> Result<EepromStatistics, Error> {
        let page0 = self.page_statistics(self.pages.page0)?;
        let page1 = self.page_statistics(self.pages.page1)?;

        Ok(EepromStatistics {
            pages: [page0, page1],
        })
    }

    fn page_statistics(&mut self, page: Page) -> Result<PageStatistics, Error> {
        let status = page.read_status(&mut self.hal)?;
        let table = &self.table;
        let (free, written, illegal) =
            page.slot_statistics(&mut self.hal, |address| table.contains(address))?;

        Ok(PageStatistics {
            id: page.id,
            status,
            free,
            written,
            illegal,
        })
    }

    /// Hands the flash back, e.g. to inspect it after a simulated power loss.
    pub fn into_inner(self) -> T {
        self.hal
    }

    /// Runs `op` with the flash unlocked. The guard relocks it on every return path, a flash
    /// failure marks the store as faulted until the next successful `init()`.
    fn unlocked<R>(
        &mut self,
        op: impl FnOnce(&mut T, &Pages, &AddressTable) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let result = Unlocked::acquire(&mut self.hal)
            .and_then(|mut hal| op(&mut *hal, &self.pages, &self.table));

        if let Err(Error::FlashError) = result {
            self.faulted = true;
        }
        result
    }
}
