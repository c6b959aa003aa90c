use crate::collect::{CollectorContext, CollectorFieldsVisitor, Symbol};
use crate::common::{Error, Result};
use crate::storage::Row;
use crate::types::{Field, Mapping};
use std::sync::Arc;

/// How one output column of a collector is produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// A document value, by position in the loaded fields.
    Field(usize),
    Score,
    Literal(Field),
}

/// The outputs of a collector and the document columns they need.
#[derive(Clone, Debug, PartialEq)]
pub struct InputContext {
    top_level_inputs: Vec<Input>,
    doc_level_columns: Vec<usize>,
}

impl InputContext {
    pub fn top_level_inputs(&self) -> &[Input] {
        &self.top_level_inputs
    }

    /// A fields visitor sized to the document columns the outputs need.
    pub fn fields_visitor(&self) -> CollectorFieldsVisitor {
        CollectorFieldsVisitor::new(self.doc_level_columns.clone())
    }

    pub fn requires_score(&self) -> bool {
        self.top_level_inputs.contains(&Input::Score)
    }

    /// Builds the output row of a document. `_score` outputs are NULL
    /// unless a score is given.
    pub fn project(
        &self,
        context: &CollectorContext,
        document: &Row,
        score: Option<f32>,
    ) -> Result<Row> {
        let fields = context.fields_visitor().load(document)?;
        self.top_level_inputs
            .iter()
            .map(|input| match input {
                Input::Field(position) => fields.get(*position).cloned().ok_or(Error::OutOfBounds),
                Input::Score => Ok(score.map_or(Field::Null, Field::Float)),
                Input::Literal(value) => Ok(value.clone()),
            })
            .collect::<Result<Vec<_>>>()
            .map(Row::from)
    }
}

/// Resolves collected symbols against a shard's mapping.
#[derive(Clone, Debug)]
pub struct DocInputFactory {
    mapping: Arc<Mapping>,
}

impl DocInputFactory {
    pub fn new(mapping: Arc<Mapping>) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        self.mapping
            .column_index(name)
            .ok_or_else(|| Error::Translation(format!("unknown column {name}")))
    }

    /// Splits `to_collect` into outputs and the distinct document columns
    /// that have to be loaded per document.
    pub fn extract_implementations(&self, to_collect: &[Symbol]) -> Result<InputContext> {
        let mut doc_level_columns: Vec<usize> = Vec::new();
        let mut top_level_inputs = Vec::with_capacity(to_collect.len());
        for symbol in to_collect {
            let input = match symbol {
                Symbol::Reference(name) => {
                    let column = self.column(name)?;
                    let position = match doc_level_columns.iter().position(|&c| c == column) {
                        Some(position) => position,
                        None => {
                            doc_level_columns.push(column);
                            doc_level_columns.len() - 1
                        }
                    };
                    Input::Field(position)
                }
                Symbol::Score => Input::Score,
                Symbol::Literal(value) => Input::Literal(value.clone()),
                Symbol::Function { .. } => {
                    return Err(Error::Translation(format!(
                        "can't collect {symbol}, functions are evaluated above the shard"
                    )))
                }
            };
            top_level_inputs.push(input);
        }
        Ok(InputContext {
            top_level_inputs,
            doc_level_columns,
        })
    }
}
