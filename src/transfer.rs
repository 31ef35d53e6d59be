use crate::error::Error;
use crate::layout::AddressTable;
use crate::page::{Page, PageStatus, Pages};
use crate::platform::Platform;
use crate::raw::{PageState, Record, write_halfword};
#[cfg(feature = "defmt")]
use defmt::{info, trace};

/// Which variables a copy from one page to another leaves out.
#[derive(Clone, Copy)]
pub(crate) enum Skip {
    /// The variable that triggered the transfer, already written to the target.
    Address(u16),
    /// Every variable the target already holds, used when an interrupted transfer is resumed.
    AlreadyCopied,
}

impl Page {
    /// Programs the value before the address: a write interrupted in between leaves a slot
    /// whose address still reads as erased, which no lookup will ever match.
    pub(crate) fn write_record<T: Platform>(
        &self,
        hal: &mut T,
        offset: u32,
        record: Record,
    ) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("write_record: {} @{:#08x}: {}", self.id, offset, record);

        #[cfg(feature = "debug-logs")]
        println!(
            "  transfer: write_record: {} @0x{offset:0>8x}: {:?}",
            self.id, record
        );

        write_halfword(hal, offset + Record::VALUE_OFFSET, record.value)?;
        write_halfword(hal, offset + Record::ADDRESS_OFFSET, record.address)
    }

    /// Appends `record` behind the last used slot, `PageFull` if there is none left.
    pub(crate) fn append<T: Platform>(&self, hal: &mut T, record: Record) -> Result<(), Error> {
        let offset = self.find_free_slot(hal)?;
        self.write_record(hal, offset, record)
    }
}

impl Pages {
    pub(crate) fn write_variable<T: Platform>(
        &self,
        hal: &mut T,
        table: &AddressTable,
        address: u16,
        value: u16,
    ) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("write_variable: [{}] = {}", address, value);

        let record = Record { value, address };
        let page = self.select_for_write(hal)?;

        match page.append(hal, record) {
            Err(Error::PageFull) => self.transfer(hal, table, record),
            other => other,
        }
    }

    /// Moves the latest value of every variable to the erased page, starting with `pending`.
    ///
    /// Each prefix of the flash operations below leaves a state `recover` can complete:
    /// nothing happens to the old page before the new one holds everything, and the new page
    /// only becomes valid once the old one is gone.
    fn transfer<T: Platform>(
        &self,
        hal: &mut T,
        table: &AddressTable,
        pending: Record,
    ) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("transfer");

        let old = self.select_for_read(hal)?;
        let new = self.other(&old);

        #[cfg(feature = "debug-logs")]
        println!("transfer: {} -> {}", old.id, new.id);

        if new.read_status(hal)? != PageStatus::Erased {
            return Err(Error::NoValidPage);
        }

        new.set_status(hal, PageState::ReceivingData)?;
        new.append(hal, pending)?;
        copy_variables(hal, table, &old, &new, Skip::Address(pending.address))?;
        old.erase(hal)?;
        new.set_status(hal, PageState::Valid)?;

        #[cfg(feature = "defmt")]
        info!("transfer: {} -> {} done", old.id, new.id);

        Ok(())
    }
}

/// Appends the latest value of every variable in `source` to `target`, in table order.
///
/// Read errors abort the copy. Skipping a variable that could not be read would lose it as
/// soon as `source` gets erased.
pub(crate) fn copy_variables<T: Platform>(
    hal: &mut T,
    table: &AddressTable,
    source: &Page,
    target: &Page,
    skip: Skip,
) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("copy_variables: {} -> {}", source.id, target.id);

    for address in table.iter() {
        let skipped = match skip {
            Skip::Address(skipped) => address == skipped,
            Skip::AlreadyCopied => target.contains(hal, address)?,
        };
        if skipped {
            continue;
        }

        if let Some(value) = source.read_variable(hal, address)? {
            target.append(hal, Record { value, address })?;
        }
    }

    Ok(())
}
