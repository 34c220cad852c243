
//! Error type definitions of this crate.

use std::convert::TryFrom;
use std::fmt;

/// A result that may contain an error from this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an error from this crate.
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// An error that may happen while converting an image.
/// Distinguishes between structural problems in the source file,
/// unsupported features, and runtime io errors.
#[derive(Debug)]
pub enum Error {

    /// The input uses a feature that this crate does not handle,
    /// for example an unknown camera model.
    NotSupported(String),

    /// The contents of the source file are not what they should be,
    /// or an internal size computation did not match the written bytes.
    Invalid(String),

    /// This error can occur when the underlying reader or writer fails,
    /// and also when fewer bytes could be read than a structure requires.
    Io(IoError),
}


impl Error {

    /// Create an error stating that the file contents are invalid.
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error stating that a feature is not supported.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }
}


/// Enable using the `?` operator on `io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
            Error::Io(error) => write!(formatter, "io error: {}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}


/// Panic in debug mode, return a recoverable error in release mode,
/// if the value does not fit into the smaller integer type.
#[inline]
pub fn usize_to_u32(value: usize, name: &'static str) -> Result<u32> {
    debug_assert!(u32::try_from(value).is_ok(), "overflowing {}: {}", name, value);
    u32::try_from(value).map_err(|_| Error::invalid(name))
}

#[inline]
pub fn usize_to_u16(value: usize, name: &'static str) -> Result<u16> {
    debug_assert!(u16::try_from(value).is_ok(), "overflowing {}: {}", name, value);
    u16::try_from(value).map_err(|_| Error::invalid(name))
}
