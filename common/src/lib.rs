//! Common Utilities and Types Library
//! 
//! This crate provides shared radio types and utilities used by the MAC scheduler
//! and the slot simulation driver.

pub mod types;
pub mod utils;
pub mod fuzz;

// Re-export commonly used items
pub use types::*;
pub use utils::*;
pub use fuzz::FuzzRandom;
