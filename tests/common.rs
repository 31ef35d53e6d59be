#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, MultiwriteNorFlash, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use flash_eeprom::platform::FlashLock;
use flash_eeprom::{Eeprom, Layout};
use std::cell::RefCell;
use std::rc::Rc;

pub const FLASH_SECTOR_SIZE: usize = 512;
pub const WORD_SIZE: usize = 4;
pub const HALFWORD_SIZE: usize = 2;
pub const PAGE_HEADER_SIZE: usize = 4;
pub const RECORD_SIZE: usize = 4;
pub const SLOTS_PER_PAGE: usize = (FLASH_SECTOR_SIZE - PAGE_HEADER_SIZE) / RECORD_SIZE;

pub const PAGE0: usize = 0;
pub const PAGE1: usize = FLASH_SECTOR_SIZE;

pub const ERASED: u16 = 0xFFFF;
pub const RECEIVING_DATA: u16 = 0xEEEE;
pub const VALID: u16 = 0x0000;

pub const VARIABLES: u16 = 16;

pub fn layout() -> Layout {
    Layout::contiguous(0, FLASH_SECTOR_SIZE as u32, VARIABLES)
}

pub fn eeprom<const W: usize>(flash: &mut Flash<W>) -> Eeprom<FlashRef<'_, W>> {
    Eeprom::new(layout(), FlashRef(flash)).unwrap()
}

/// In-memory NOR flash. `W` is the write granularity, halfword programming by default.
#[derive(Clone)]
pub struct Flash<const W: usize = HALFWORD_SIZE> {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    /// Only the operation at `fail_after_operation` fails, everything after succeeds again
    pub transient_fault: bool,
    pub fail_unlock: bool,
    pub operations: Vec<Operation>,
    pub locked: bool,
    pub unlocks: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl<const W: usize> Flash<W> {
    pub fn blank(pages: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation,
            transient_fault: false,
            fail_unlock: false,
            operations: Vec::new(),
            locked: true,
            unlocks: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    /// Fails the operation `count` operations from now.
    pub fn fail_in(&mut self, count: usize) {
        self.fail_after_operation = self.operations.len() + count;
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn halfword(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.buf[offset], self.buf[offset + 1]])
    }

    pub fn header(&self, page: usize) -> u16 {
        self.halfword(page)
    }

    pub fn set_header(&mut self, page: usize, status: u16) {
        self.buf[page..page + 2].copy_from_slice(&status.to_le_bytes());
    }

    /// Places a record directly in the buffer, bypassing the flash semantics.
    pub fn put_record(&mut self, page: usize, slot: usize, address: u16, value: u16) {
        let offset = page + PAGE_HEADER_SIZE + slot * RECORD_SIZE;
        self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        self.buf[offset + 2..offset + 4].copy_from_slice(&address.to_le_bytes());
    }

    pub fn contains_record(&self, address: u16, value: u16) -> bool {
        [PAGE0, PAGE1].iter().any(|&page| {
            (0..SLOTS_PER_PAGE).any(|slot| {
                let offset = page + PAGE_HEADER_SIZE + slot * RECORD_SIZE;
                self.halfword(offset) == value && self.halfword(offset + 2) == address
            })
        })
    }

    pub fn is_blank(&self, page: usize) -> bool {
        self.buf[page..page + FLASH_SECTOR_SIZE]
            .iter()
            .all(|&byte| byte == 0xFF)
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn record(&mut self, operation: Operation) -> Result<(), FlashError> {
        if self.operations.len() >= self.fail_after_operation {
            println!("    flash: FAULT {operation:?}");
            if self.transient_fault {
                self.disable_faults();
            }
            return Err(FlashError);
        }
        self.operations.push(operation);
        Ok(())
    }
}

impl Flash<HALFWORD_SIZE> {
    pub fn new(pages: usize) -> Self {
        Self::blank(pages, usize::MAX)
    }

    pub fn new_with_fault(pages: usize, fail_after_operation: usize) -> Self {
        Self::blank(pages, fail_after_operation)
    }

    pub fn new_with_transient_fault(pages: usize, fail_at_operation: usize) -> Self {
        Self {
            transient_fault: true,
            ..Self::blank(pages, fail_at_operation)
        }
    }
}

impl Flash<WORD_SIZE> {
    /// Flash that only programs whole words, like the SPI flash of the ESP32.
    pub fn new_word_granular(pages: usize) -> Self {
        Self::blank(pages, usize::MAX)
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl<const W: usize> ErrorType for Flash<W> {
    type Error = FlashError;
}

impl<const W: usize> ReadNorFlash for Flash<W> {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::READ_SIZE));

        self.record(Operation::Read {
            offset,
            len: bytes.len(),
        })?;

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl<const W: usize> NorFlash for Flash<W> {
    const WRITE_SIZE: usize = W;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(!self.locked, "erase while the flash is locked");

        println!(
            "    flash: erase: {from:04X} - {to:04X} #{:>2}",
            self.operations.len()
        );

        self.record(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        })?;

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE));
        assert!(!bytes.is_empty());
        assert!(!self.locked, "write while the flash is locked");

        println!(
            "    flash: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );

        self.record(Operation::Write {
            offset,
            len: bytes.len(),
        })?;

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // programming can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

impl<const W: usize> MultiwriteNorFlash for Flash<W> {}

impl<const W: usize> FlashLock for Flash<W> {
    fn unlock(&mut self) -> Result<(), Self::Error> {
        if self.fail_unlock {
            return Err(FlashError);
        }
        self.locked = false;
        self.unlocks += 1;
        Ok(())
    }

    fn lock(&mut self) {
        self.locked = true;
    }
}

/// Lends the flash to a store, so a test can still inspect it after the store is gone or failed
/// to initialize.
pub struct FlashRef<'a, const W: usize = HALFWORD_SIZE>(pub &'a mut Flash<W>);

impl<const W: usize> ErrorType for FlashRef<'_, W> {
    type Error = FlashError;
}

impl<const W: usize> ReadNorFlash for FlashRef<'_, W> {
    const READ_SIZE: usize = Flash::<W>::READ_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.0.capacity()
    }
}

impl<const W: usize> NorFlash for FlashRef<'_, W> {
    const WRITE_SIZE: usize = Flash::<W>::WRITE_SIZE;

    const ERASE_SIZE: usize = Flash::<W>::ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.0.erase(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write(offset, bytes)
    }
}

impl<const W: usize> MultiwriteNorFlash for FlashRef<'_, W> {}

impl<const W: usize> FlashLock for FlashRef<'_, W> {
    fn unlock(&mut self) -> Result<(), Self::Error> {
        self.0.unlock()
    }

    fn lock(&mut self) {
        self.0.lock()
    }
}

/// Shares the flash between a store and the test, so the test can tamper with it while the
/// store is open.
#[derive(Clone)]
pub struct SharedFlash(pub Rc<RefCell<Flash>>);

impl SharedFlash {
    pub fn new(flash: Flash) -> Self {
        Self(Rc::new(RefCell::new(flash)))
    }
}

impl ErrorType for SharedFlash {
    type Error = FlashError;
}

impl ReadNorFlash for SharedFlash {
    const READ_SIZE: usize = Flash::<HALFWORD_SIZE>::READ_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.0.borrow().capacity()
    }
}

impl NorFlash for SharedFlash {
    const WRITE_SIZE: usize = Flash::<HALFWORD_SIZE>::WRITE_SIZE;

    const ERASE_SIZE: usize = Flash::<HALFWORD_SIZE>::ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.0.borrow_mut().erase(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().write(offset, bytes)
    }
}

impl MultiwriteNorFlash for SharedFlash {}

impl FlashLock for SharedFlash {
    fn unlock(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().unlock()
    }

    fn lock(&mut self) {
        self.0.borrow_mut().lock()
    }
}
