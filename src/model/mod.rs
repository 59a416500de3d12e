//! Model parameters and derived constants.

pub mod constants;
pub mod params;

pub use constants::{DerivedConstants, NoiseStructure};
pub use params::{StateDims, StateSpaceParams};
