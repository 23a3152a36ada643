pub mod batch;
pub mod config;
pub mod convert;
pub mod dialect;
pub mod error;
pub mod mapping;
pub mod medium;
pub mod model;
pub mod reader;
pub mod xml;

pub use error::{IlcdError, Result};
