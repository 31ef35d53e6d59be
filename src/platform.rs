use crate::error::Error;
use core::ops::{Deref, DerefMut};
use embedded_storage::nor_flash::{ErrorType, MultiwriteNorFlash};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Page headers are advanced in place (Erased -> ReceivingData -> Valid) and the two halfwords
/// of a record are programmed one after the other, so the flash has to accept repeated writes
/// to the same word as long as bits are only cleared.
///
/// See README.md for an example implementation.
pub trait Platform: FlashLock + MultiwriteNorFlash {}

impl<T: FlashLock + MultiwriteNorFlash> Platform for T {}

/// Write protection of the flash controller. Flash without a lock register can implement both
/// methods as no-ops.
pub trait FlashLock: ErrorType {
    /// Allow program and erase operations.
    fn unlock(&mut self) -> Result<(), Self::Error>;

    /// Forbid program and erase operations again.
    fn lock(&mut self);
}

impl<T: FlashLock> FlashLock for &mut T {
    fn unlock(&mut self) -> Result<(), Self::Error> {
        T::unlock(self)
    }

    fn lock(&mut self) {
        T::lock(self)
    }
}

/// Keeps the flash unlocked for as long as it lives and locks it again on drop, including every
/// early return with `?`.
pub(crate) struct Unlocked<'a, T: Platform> {
    hal: &'a mut T,
}

impl<'a, T: Platform> Unlocked<'a, T> {
    pub(crate) fn acquire(hal: &'a mut T) -> Result<Self, Error> {
        #[cfg(feature = "defmt")]
        trace!("unlock");

        hal.unlock().map_err(|_| Error::FlashError)?;
        Ok(Self { hal })
    }
}

impl<T: Platform> Deref for Unlocked<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.hal
    }
}

impl<T: Platform> DerefMut for Unlocked<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.hal
    }
}

impl<T: Platform> Drop for Unlocked<'_, T> {
    fn drop(&mut self) {
        #[cfg(feature = "defmt")]
        trace!("lock");

        self.hal.lock();
    }
}

pub(crate) trait AlignedOps: Platform {
    /// All reads are single 4 byte words, all writes are halfwords padded to `WRITE_SIZE`.
    fn supports_word_access() -> bool {
        4usize.is_multiple_of(Self::READ_SIZE) && 4usize.is_multiple_of(Self::WRITE_SIZE)
    }

    fn align_write_ceil(size: usize) -> usize {
        align_ceil(size, Self::WRITE_SIZE)
    }

    fn align_write_floor(size: usize) -> usize {
        align_floor(size, Self::WRITE_SIZE)
    }
}

#[inline(always)]
const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

#[inline(always)]
const fn align_floor(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size & !(alignment - 1)
    } else {
        size / alignment * alignment
    }
}

impl<T: Platform> AlignedOps for T {}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
mod chip {
    use esp_storage::FlashStorage;

    use crate::platform::FlashLock;

    // esp-storage unlocks the SPI flash around each operation on its own
    impl FlashLock for FlashStorage<'_> {
        fn unlock(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn lock(&mut self) {}
    }
}
