pub mod field;
mod mapping;

pub use field::Field;
pub use mapping::{Column, DataType, Mapping, MappingBuilder};
