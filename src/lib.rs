
#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

#![deny(
    unused_variables,
    unused_assignments,
    unused_must_use,
    trivial_numeric_casts,
)]

#![forbid(unsafe_code)]

// TODO #![warn(missing_docs)]


pub mod io; // public to allow for custom byte sinks

pub mod math;
pub mod error;
pub mod mrw;
pub mod meta;
pub mod compression;
pub mod dng;


/// Re-exports of all types commonly required for simple conversion of an mrw image.
pub mod prelude {
    // main exports
    pub use crate::mrw::Mrw;
    pub use crate::dng::{ self, ConvertOptions, Tiling };

    // secondary data types
    pub use crate::meta;
    pub use crate::compression::{ Compression, TableMode };
    pub use crate::error;

    // export error types
    pub use crate::error::{ Result, Error, UnitResult };
}
