//! Freshwater coupling between an Antarctic ice-sheet model and an ocean model
//!
//! The arithmetic lives in [`fwcouple_core`]; this crate adds the manifest, dataset files,
//! the external AMR tools and the parallel pipeline that ties them into one coupling step.

pub mod config;
pub mod errors;
pub mod io;
pub mod pipeline;
pub mod tools;

pub use errors::{Error, Result};
