//! Core data types for the pricebell alert bot.

pub mod alert;
pub mod catalog;
pub mod pair;

pub use alert::*;
pub use catalog::*;
pub use pair::*;
