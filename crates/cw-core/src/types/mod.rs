//! Core data types shared by every market data module.

pub mod enums;
pub mod market_data;
pub mod symbol;

pub use enums::*;
pub use market_data::*;
pub use symbol::*;
