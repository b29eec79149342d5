//! Failure cases surfaced by dictionary operations.

use core::fmt;

/// Errors returned by fallible dictionary operations. Storage failures
/// always leave the dictionary exactly as it was before the call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An entry block or table vector could not be allocated.
    AllocationFailed,
    /// A requested capacity exceeds what the bucket index can address.
    CapacityOverflow,
    /// A destructive lookup missed and no fallback value was supplied.
    MissingKey,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationFailed => f.write_str("allocation failed for strdict storage"),
            Error::CapacityOverflow => {
                f.write_str("requested strdict capacity overflows the bucket index")
            }
            Error::MissingKey => f.write_str("key not found in strdict"),
        }
    }
}

impl std::error::Error for Error {}
