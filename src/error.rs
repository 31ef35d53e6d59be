use thiserror::Error;

/// Errors that can occur during EEPROM operations. Marked as non-exhaustive to allow for future
/// additions without breaking the API. A caller would likely only need to handle
/// `VariableNotFound` and `FlashError` as the layout errors are static.
#[derive(Error, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Page offsets have to be aligned to the erase size of the flash
    #[error("invalid page offset")]
    InvalidPageOffset,

    /// The page size has to be a non-zero multiple of the erase size and the pages must not overlap
    #[error("invalid page size")]
    InvalidPageSize,

    /// The flash has to support reading and programming single halfwords
    #[error("unsupported flash geometry")]
    UnsupportedFlash,

    /// The number of variables has to fit into a single page and may not use the reserved
    /// virtual address 0xFFFF
    #[error("invalid variable count")]
    InvalidVariableCount,

    /// The internal error value is returned from the provided `&mut impl NorFlash`
    #[error("internal flash error")]
    FlashError,

    /// Neither page carries a valid header. Call `init()` to repair the pages.
    #[error("no valid page")]
    NoValidPage,

    /// The variable has never been written or was lost in a format.
    #[error("variable not found")]
    VariableNotFound,

    /// The address is outside the virtual address table
    #[error("address out of range")]
    AddressOutOfRange,

    /// Used internally to indicate that a page transfer is required.
    #[error("page full")]
    PageFull,
}
