pub mod error;
pub mod runes;
