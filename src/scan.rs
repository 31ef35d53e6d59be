use crate::error::Error;
use crate::page::Page;
use crate::platform::Platform;
use crate::raw::{Record, read_word};
#[cfg(feature = "defmt")]
use defmt::trace;

impl Page {
    pub(crate) fn load_record<T: Platform>(&self, hal: &mut T, index: u32) -> Result<Record, Error> {
        let offset = self.slot_offset(index).ok_or(Error::PageFull)?;
        Ok(Record::decode(read_word(hal, offset)?))
    }

    /// Latest value of `address` in this page.
    ///
    /// Records are appended in increasing order, so scanning from the end returns the most
    /// recent one first. An interrupted write leaves a value with an erased address behind,
    /// which never matches.
    pub(crate) fn read_variable<T: Platform>(
        &self,
        hal: &mut T,
        address: u16,
    ) -> Result<Option<u16>, Error> {
        #[cfg(feature = "defmt")]
        trace!("read_variable: {}[{}]", self.id, address);

        for index in (0..self.slots()).rev() {
            let record = self.load_record(hal, index)?;
            if record.address == address {
                return Ok(Some(record.value));
            }
        }

        Ok(None)
    }

    pub(crate) fn contains<T: Platform>(&self, hal: &mut T, address: u16) -> Result<bool, Error> {
        Ok(self.read_variable(hal, address)?.is_some())
    }

    /// Offset of the first free slot, scanning from the start of the page. Free slots only
    /// exist behind the last written record, so the first one found is the append position.
    pub(crate) fn find_free_slot<T: Platform>(&self, hal: &mut T) -> Result<u32, Error> {
        #[cfg(feature = "defmt")]
        trace!("find_free_slot: {}", self.id);

        for index in 0..self.slots() {
            if self.load_record(hal, index)?.is_free() {
                return self.slot_offset(index).ok_or(Error::PageFull);
            }
        }

        Err(Error::PageFull)
    }

    /// Counts `(free, written, illegal)` slots. Written slots carry an address of the table,
    /// everything else that is not free is illegal: orphaned values of interrupted writes or
    /// addresses outside of the table.
    pub(crate) fn slot_statistics<T: Platform>(
        &self,
        hal: &mut T,
        is_known: impl Fn(u16) -> bool,
    ) -> Result<(u32, u32, u32), Error> {
        let mut free = 0u32;
        let mut written = 0u32;
        let mut illegal = 0u32;

        for index in 0..self.slots() {
            let record = self.load_record(hal, index)?;
            if record.is_free() {
                free += 1;
            } else if is_known(record.address) {
                written += 1;
            } else {
                illegal += 1;
            }
        }

        Ok((free, written, illegal))
    }
}
