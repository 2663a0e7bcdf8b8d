//! Peripheral drivers backing the board's properties.

pub mod adc;
pub mod led;
