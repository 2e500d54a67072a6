//! Core arithmetic of the regional freshwater coupling between an Antarctic ice-sheet
//! model and an ocean model.
//!
//! The crate is free of file and process I/O. Data flows through it in two branches:
//!
//! - ocean temperature is reduced to one value per [`sectors::Sector`] and year
//!   ([`ocean`]) and turned into a basal-melt anomaly ([`melt`])
//! - pairs of ice-sheet snapshots are reduced over each sector ([`snapshot`]) and turned
//!   into calving and basal discharge ([`flux`])
//!
//! The discharge totals are then spread over the ocean grid as a forcing field ([`forcing`]).

pub mod depth;
pub mod errors;
pub mod flux;
pub mod forcing;
pub mod grid;
pub mod masks;
pub mod melt;
pub mod ocean;
pub mod parameters;
pub mod sectors;
pub mod snapshot;
pub mod timeseries;
