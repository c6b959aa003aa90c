#![crate_type = "lib"]
#![crate_name = "rustyexec"]

pub mod collect;
pub mod common;
pub mod concurrent;
pub mod config;
pub mod jobs;
pub mod storage;
pub mod types;
