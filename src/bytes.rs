//! Byte oriented access on top of the 16-bit variables: each byte address is backed by the
//! variable with the same index.
use crate::error::Error;
use crate::platform::Platform;
use crate::Eeprom;
use embedded_storage::{ReadStorage, Storage};

/// Returned for addresses that are out of range or have never been written, like the erased
/// cell of a real EEPROM.
pub const UNSET_BYTE: u8 = 0xFF;

impl<T: Platform> Eeprom<T> {
    /// Never fails. Unset variables, out of range addresses and flash errors all read as
    /// `UNSET_BYTE`.
    pub fn read_byte(&mut self, address: usize) -> u8 {
        match self.load_byte(address) {
            Ok(Some(value)) => value,
            _ => UNSET_BYTE,
        }
    }

    /// Writes a byte of the user region. Addresses of the system region or beyond are ignored.
    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), Error> {
        if address >= self.layout.user_variables as usize {
            return Ok(());
        }
        self.store_byte(address, value)
    }

    /// Writes a byte anywhere in the table, including the system region reserved with
    /// `Layout::with_user_variables`. Addresses beyond the table are ignored.
    pub fn write_system_byte(&mut self, address: usize, value: u8) -> Result<(), Error> {
        if address >= self.layout.variables as usize {
            return Ok(());
        }
        self.store_byte(address, value)
    }

    fn load_byte(&mut self, address: usize) -> Result<Option<u8>, Error> {
        let address = self.table.virtual_address(address).ok_or(Error::AddressOutOfRange)?;
        match self.read_variable(address) {
            Ok(value) => Ok(Some(value as u8)),
            Err(Error::VariableNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Unchanged bytes are not written again, which spares the page and postpones the next
    /// transfer. The whole variable has to match, not just its low byte.
    fn store_byte(&mut self, address: usize, value: u8) -> Result<(), Error> {
        let virtual_address = self.table.virtual_address(address).ok_or(Error::AddressOutOfRange)?;
        let unchanged = match self.read_variable(virtual_address) {
            Ok(stored) => stored == value as u16,
            Err(Error::VariableNotFound) => false,
            Err(e) => return Err(e),
        };
        if unchanged {
            #[cfg(feature = "debug-logs")]
            println!("bytes: store_byte: [{address}] already holds {value}");

            return Ok(());
        }
        self.write_variable(virtual_address, value as u16)
    }

    fn user_range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, Error> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(Error::AddressOutOfRange)?;
        if end > self.layout.user_variables as usize {
            return Err(Error::AddressOutOfRange);
        }
        Ok(start..end)
    }
}

impl<T: Platform> ReadStorage for Eeprom<T> {
    type Error = Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.user_range(offset, bytes.len())?;
        for (address, byte) in range.zip(bytes.iter_mut()) {
            *byte = self.load_byte(address)?.unwrap_or(UNSET_BYTE);
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.layout.user_variables as usize
    }
}

impl<T: Platform> Storage for Eeprom<T> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.user_range(offset, bytes.len())?;
        for (address, &byte) in range.zip(bytes.iter()) {
            self.store_byte(address, byte)?;
        }
        Ok(())
    }
}
