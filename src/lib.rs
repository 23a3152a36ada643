//! Core library for the ilcd-epd command line application.
//!
//! Environmental Product Declarations published as ILCD+EPD XML are read
//! from a [`medium`](ilcd::epd::medium) (zip archive, directory, single
//! file or soda4LCA server), interpreted by typed
//! [`readers`](ilcd::epd::reader) whose extraction rules a provider
//! [`dialect`](ilcd::epd::dialect) may override, and mapped onto openEPD by
//! the [`mapping`](ilcd::epd::mapping) layer. Orchestration for the CLI lives
//! in [`convert`](ilcd::epd::convert) and [`batch`](ilcd::epd::batch).

pub mod ilcd;

pub use ilcd::epd::{
    IlcdError, Result, batch, config, convert, dialect, error, mapping, medium, model, reader,
};
