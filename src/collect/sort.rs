use crate::collect::{CollectorContext, DocInputFactory, OrderBy, Symbol};
use crate::common::{Error, Result};
use crate::storage::{DocId, Row};
use crate::types::Field;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortSource {
    Column(usize),
    Score,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortField {
    pub source: SortSource,
    pub reverse: bool,
    pub nulls_first: bool,
}

/// The sort key of one document: its sort values and, to break ties, its doc id.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    values: Vec<Field>,
    doc: DocId,
}

impl SortKey {
    pub fn doc(&self) -> DocId {
        self.doc
    }
}

/// A native sort over a shard's documents. Documents that compare equal are
/// ordered by doc id, so the order is total within a snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sort {
    fields: Vec<SortField>,
}

impl Sort {
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    pub fn needs_scores(&self) -> bool {
        self.fields.iter().any(|f| f.source == SortSource::Score)
    }

    pub fn key(&self, doc: DocId, row: &Row, score: f32) -> Result<SortKey> {
        let values = self
            .fields
            .iter()
            .map(|field| match field.source {
                SortSource::Column(column) => row.field(column).cloned().ok_or(Error::OutOfBounds),
                SortSource::Score => Ok(Field::Float(score)),
            })
            .collect::<Result<_>>()?;
        Ok(SortKey { values, doc })
    }

    pub fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        for (field, (x, y)) in self.fields.iter().zip(a.values.iter().zip(&b.values)) {
            let ordering = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) if field.nulls_first => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, true) if field.nulls_first => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if field.reverse => y.cmp(x),
                (false, false) => x.cmp(y),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.doc.cmp(&b.doc)
    }
}

/// Translates a requested ordering into a native sort.
pub trait SortGenerator: Send + Sync {
    fn generate(
        &self,
        context: &CollectorContext,
        order_by: &OrderBy,
        inputs: &DocInputFactory,
    ) -> Result<Sort>;
}

/// Sorts on columns and `_score`. Literals don't change the order and are
/// skipped. Without an explicit choice NULLs sort last ascending and first
/// descending.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymbolSortGenerator;

impl SortGenerator for SymbolSortGenerator {
    fn generate(
        &self,
        _: &CollectorContext,
        order_by: &OrderBy,
        inputs: &DocInputFactory,
    ) -> Result<Sort> {
        let mut fields = Vec::with_capacity(order_by.symbols().len());
        for (symbol, reverse, nulls_first) in order_by.iter() {
            let source = match symbol {
                Symbol::Reference(name) => SortSource::Column(inputs.column(name)?),
                Symbol::Score => SortSource::Score,
                Symbol::Literal(_) => continue,
                Symbol::Function { .. } => {
                    return Err(Error::Translation(format!(
                        "can't sort on {symbol} within a shard"
                    )))
                }
            };
            fields.push(SortField {
                source,
                reverse,
                nulls_first: nulls_first.unwrap_or(reverse),
            });
        }
        Ok(Sort::new(fields))
    }
}
