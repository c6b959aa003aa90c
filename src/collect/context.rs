use crate::common::{Error, Result};
use crate::storage::Row;
use crate::types::{Field, Mapping};
use std::sync::Arc;

/// Loads the document values collectors need, and nothing else.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectorFieldsVisitor {
    columns: Vec<usize>,
}

impl CollectorFieldsVisitor {
    pub fn new(columns: Vec<usize>) -> Self {
        Self { columns }
    }

    /// Number of values loaded per document.
    pub fn size(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn load(&self, row: &Row) -> Result<Vec<Field>> {
        self.columns
            .iter()
            .map(|&column| row.field(column).cloned().ok_or(Error::OutOfBounds))
            .collect()
    }
}

/// Everything row producing code needs to know about the shard it reads from.
#[derive(Clone, Debug)]
pub struct CollectorContext {
    mapping: Arc<Mapping>,
    fields_visitor: CollectorFieldsVisitor,
    reader_id: i32,
    relation_id: String,
}

impl CollectorContext {
    pub fn new(
        mapping: Arc<Mapping>,
        fields_visitor: CollectorFieldsVisitor,
        reader_id: i32,
        relation_id: &str,
    ) -> Self {
        Self {
            mapping,
            fields_visitor,
            reader_id,
            relation_id: relation_id.to_string(),
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn fields_visitor(&self) -> &CollectorFieldsVisitor {
        &self.fields_visitor
    }

    pub fn reader_id(&self) -> i32 {
        self.reader_id
    }

    pub fn relation_id(&self) -> &str {
        &self.relation_id
    }
}
