//! HTTP request handlers, one module per resource.

pub mod health;
pub mod items;
pub mod search;

pub use health::{health, liveness};
pub use items::get_item;
pub use search::search;
