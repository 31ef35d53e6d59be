use crate::error::Error;
use crate::layout::AddressTable;
use crate::page::{Page, PageStatus, Pages};
use crate::platform::Platform;
use crate::raw::PageState;
use crate::transfer::{Skip, copy_variables};
#[cfg(feature = "defmt")]
use defmt::{info, trace, warn};

/// What `init()` had to do to bring the pages into a consistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recovery {
    /// One page was valid and the other one erased. At most the erased page was cleaned up.
    Clean,
    /// A page transfer was interrupted and has been finished. No variable was lost.
    TransferCompleted,
    /// Both pages were blank, the store has been set up for the first time.
    Initialized,
    /// The page headers were inconsistent. Both pages were erased and every stored variable
    /// is lost.
    Formatted,
}

impl Pages {
    /// Maps every combination of page headers to one of the two legal states:
    /// Page0 valid with Page1 erased, or the other way around.
    pub(crate) fn recover<T: Platform>(
        &self,
        hal: &mut T,
        table: &AddressTable,
    ) -> Result<Recovery, Error> {
        #[cfg(feature = "defmt")]
        trace!("recover");

        let statuses = self.statuses(hal)?;

        #[cfg(feature = "debug-logs")]
        println!("recovery: statuses: {statuses:?}");

        use PageStatus::{Erased, ReceivingData, Valid};
        match statuses {
            (Erased, Valid) => {
                self.page0.erase_if_dirty(hal)?;
                Ok(Recovery::Clean)
            }
            (Valid, Erased) => {
                self.page1.erase_if_dirty(hal)?;
                Ok(Recovery::Clean)
            }
            (Erased, ReceivingData) => {
                self.finish_transfer(hal, table, &self.page0, &self.page1, false)
            }
            (ReceivingData, Erased) => {
                self.finish_transfer(hal, table, &self.page1, &self.page0, false)
            }
            (ReceivingData, Valid) => {
                self.finish_transfer(hal, table, &self.page1, &self.page0, true)
            }
            (Valid, ReceivingData) => {
                self.finish_transfer(hal, table, &self.page0, &self.page1, true)
            }
            (Erased, Erased) => {
                #[cfg(feature = "defmt")]
                info!("recover: blank flash, initializing");

                self.format(hal)?;
                Ok(Recovery::Initialized)
            }
            // both valid, both receiving or a corrupted header
            _statuses => {
                #[cfg(feature = "defmt")]
                warn!("recover: inconsistent page headers {}, formatting", _statuses);

                #[cfg(feature = "debug-logs")]
                println!("recovery: inconsistent page headers, all variables are lost");

                self.format(hal)?;
                Ok(Recovery::Formatted)
            }
        }
    }

    /// Completes an interrupted transfer from `source` to `target`. The source is erased before
    /// the target is marked valid, a failure in between leaves (Erased, ReceivingData) which
    /// ends up here again.
    fn finish_transfer<T: Platform>(
        &self,
        hal: &mut T,
        table: &AddressTable,
        source: &Page,
        target: &Page,
        source_is_valid: bool,
    ) -> Result<Recovery, Error> {
        #[cfg(feature = "defmt")]
        trace!("finish_transfer: {} -> {}", source.id, target.id);

        #[cfg(feature = "debug-logs")]
        println!("recovery: finish_transfer: {} -> {}", source.id, target.id);

        if source_is_valid {
            copy_variables(hal, table, source, target, Skip::AlreadyCopied)?;
            source.erase(hal)?;
        } else {
            source.erase_if_dirty(hal)?;
        }
        target.set_status(hal, PageState::Valid)?;

        #[cfg(feature = "defmt")]
        info!("recover: finished transfer to {}", target.id);

        Ok(Recovery::TransferCompleted)
    }

    /// Erases both pages and marks Page0 as valid.
    pub(crate) fn format<T: Platform>(&self, hal: &mut T) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("format");

        self.page0.erase(hal)?;
        self.page0.set_status(hal, PageState::Valid)?;
        self.page1.erase(hal)
    }
}
