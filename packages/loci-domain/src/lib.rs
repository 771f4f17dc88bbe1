pub mod assemble;
pub mod catalog;
pub mod compile;
pub mod condition;
pub mod geo;
pub mod plan;
pub mod scan;
pub mod score;

mod error;

pub use error::{Error, Result};
