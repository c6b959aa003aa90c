use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::String => "STRING",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Column {
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

/// The schema of the documents stored in a shard. Column positions are the
/// positions of the values in a stored document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    columns: Vec<Column>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get_column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn col_count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Default)]
pub struct MappingBuilder {
    columns: Vec<Column>,
}

impl MappingBuilder {
    pub fn column(&mut self, name: &str, data_type: DataType) -> &mut Self {
        self.columns.push(Column::new(name, data_type, true));
        self
    }

    pub fn not_null_column(&mut self, name: &str, data_type: DataType) -> &mut Self {
        self.columns.push(Column::new(name, data_type, false));
        self
    }

    pub fn build(&self) -> Mapping {
        Mapping {
            columns: self.columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup() {
        let mapping = Mapping::builder()
            .not_null_column("id", DataType::Integer)
            .column("name", DataType::String)
            .build();
        assert_eq!(mapping.col_count(), 2);
        assert_eq!(mapping.column_index("name"), Some(1));
        assert_eq!(mapping.column_index("missing"), None);
        assert!(!mapping.get_column(0).unwrap().nullable());
        assert_eq!(mapping.get_column(1).unwrap().data_type(), DataType::String);
    }
}
