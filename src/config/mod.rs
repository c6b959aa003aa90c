#[allow(clippy::module_inception)]
pub mod config;
mod settings;

pub use settings::{Paging, Settings};
