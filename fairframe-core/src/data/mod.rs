//! Input containers: numeric per-sample columns and categorical levels.

pub mod column;
pub mod level;

pub use column::{Column, check_consistent_length};
pub use level::Level;
