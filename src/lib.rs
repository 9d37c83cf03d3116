pub mod anneal;
pub mod bnb;
pub mod branch;
pub mod config;
pub mod error;
pub mod grid;
pub mod input;
pub mod piece;
pub mod render;
pub mod solver;
pub mod types;

pub use error::{PackError, Result};
