//! Domain functors shipped with the simulator.

pub mod conway;
pub mod link;

pub use conway::{InitializeConwayCells, SeedPattern, StepConwayCells};
pub use link::LinkSymbols;
